//! Shared fixture: in-memory SQLite database and a blog-like schema.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{DatabaseConnection, DatabaseTransaction};

use common::{AppResult, DatabaseConfig, EngineConfig};
use domain::{Association, AttrValue, ColumnKind, EntityDef, Record, Timestamp};
use engine::{Callbacks, Clock, Database, Engine, Flow, Registry, RegistryBuilder};

const SCHEMA: &str = r#"
CREATE TABLE authors (id INTEGER PRIMARY KEY, posts_count INTEGER DEFAULT 0);
CREATE TABLE avatars (id INTEGER PRIMARY KEY, author_id INTEGER, destroyed_at DATETIME);
CREATE TABLE categories (id INTEGER PRIMARY KEY);
CREATE TABLE categorizations (id INTEGER PRIMARY KEY, category_id INTEGER, post_id INTEGER);
CREATE TABLE comments (id INTEGER PRIMARY KEY, commenter_id INTEGER, post_id INTEGER, destroyed_at DATETIME);
CREATE TABLE commenters (id INTEGER PRIMARY KEY, destroyed_at DATETIME);
CREATE TABLE destructive_children (id INTEGER PRIMARY KEY, person_id INTEGER, destroyed_at DATETIME);
CREATE TABLE images (id INTEGER PRIMARY KEY, post_id INTEGER);
CREATE TABLE posts (id INTEGER PRIMARY KEY, author_id INTEGER, destroyed_at DATETIME);
CREATE TABLE people (id INTEGER PRIMARY KEY);
CREATE TABLE pets (id INTEGER PRIMARY KEY, person_id INTEGER);
CREATE TABLE likes (id INTEGER PRIMARY KEY, likeable_id INTEGER, likeable_type TEXT, destroyed_at DATETIME);
"#;

pub async fn database() -> DatabaseConnection {
    let db = Database::connect(&DatabaseConfig::in_memory())
        .await
        .expect("connect to sqlite");
    db.execute_script(SCHEMA).await.expect("create schema");
    db.get_connection()
}

pub fn blog() -> RegistryBuilder {
    Registry::builder()
        .entity(
            EntityDef::new("Author", "authors")
                .column("posts_count", ColumnKind::Integer)
                .association(Association::has_many("posts", "Post", "author_id").dependent())
                .association(Association::has_one("avatar", "Avatar", "author_id").dependent()),
        )
        .entity(
            EntityDef::new("Person", "people")
                .association(Association::has_many(
                    "destructive_children",
                    "DestructiveChild",
                    "person_id",
                ))
                .association(Association::has_one("pet", "Pet", "person_id").dependent()),
        )
        .entity(
            EntityDef::new("Pet", "pets")
                .association(Association::belongs_to("person", "Person", "person_id")),
        )
        .entity(
            EntityDef::new("Avatar", "avatars")
                .soft_delete()
                .association(Association::belongs_to("author", "Author", "author_id")),
        )
        .entity(
            EntityDef::new("Category", "categories")
                .association(Association::has_many("categorizations", "Categorization", "category_id"))
                .association(Association::has_many_through("posts", "categorizations", "post")),
        )
        .entity(
            EntityDef::new("Categorization", "categorizations")
                .association(Association::belongs_to("category", "Category", "category_id"))
                .association(Association::belongs_to("post", "Post", "post_id")),
        )
        .entity(
            EntityDef::new("Like", "likes").soft_delete().association(
                Association::belongs_to_polymorphic("likeable", "likeable_id", "likeable_type"),
            ),
        )
        .entity(
            EntityDef::new("Comment", "comments")
                .soft_delete()
                .association(Association::belongs_to("post", "Post", "post_id"))
                .association(Association::belongs_to("commenter", "Commenter", "commenter_id"))
                .association(
                    Association::has_many("likes", "Like", "likeable_id")
                        .as_polymorphic("likeable_type")
                        .dependent(),
                ),
        )
        .entity(
            EntityDef::new("Commenter", "commenters")
                .soft_delete()
                .association(Association::has_many("comments", "Comment", "commenter_id").dependent())
                .association(Association::has_many_through("posts", "comments", "post")),
        )
        .entity(
            EntityDef::new("DestructiveChild", "destructive_children")
                .association(Association::belongs_to("person", "Person", "person_id").dependent()),
        )
        .entity(
            EntityDef::new("Post", "posts")
                .soft_delete()
                .association(
                    Association::belongs_to("author", "Author", "author_id").counter_cache("posts_count"),
                )
                .association(Association::has_many_through("categories", "categorizations", "category"))
                .association(Association::has_many("categorizations", "Categorization", "post_id").dependent())
                .association(Association::has_many("comments", "Comment", "post_id").dependent())
                .association(Association::has_many_through("commenters", "comments", "commenter"))
                .association(
                    Association::has_one("like", "Like", "likeable_id")
                        .as_polymorphic("likeable_type")
                        .dependent(),
                ),
        )
}

pub fn engine(builder: RegistryBuilder) -> Engine {
    Engine::new(builder.build().expect("valid registry"), EngineConfig::default())
}

pub async fn setup() -> (DatabaseConnection, Engine) {
    (database().await, engine(blog()))
}

pub fn attrs<const N: usize>(pairs: [(&str, AttrValue); N]) -> BTreeMap<String, AttrValue> {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

pub async fn create<const N: usize>(
    engine: &Engine,
    db: &DatabaseConnection,
    entity: &str,
    pairs: [(&str, AttrValue); N],
) -> Record {
    engine
        .create(db, entity, attrs(pairs))
        .await
        .expect("create record")
}

/// Fixed point in time, `hours` after the epoch of the fixture.
pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(hours)
}

/// Clock frozen at one instant.
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

/// Records every hook invocation as `"<phase>_<event>:<id>"`.
#[derive(Default)]
pub struct Recorder {
    pub log: Mutex<Vec<String>>,
    pub halt_destroy: bool,
    pub halt_restore: bool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, phase: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(phase)).count()
    }

    fn push(&self, phase: &str, record: &Record) {
        self.log.lock().unwrap().push(format!("{}:{}", phase, record.id));
    }
}

#[async_trait]
impl Callbacks for Recorder {
    async fn before_destroy(&self, _txn: &DatabaseTransaction, record: &mut Record) -> AppResult<Flow> {
        self.push("before_destroy", record);
        Ok(if self.halt_destroy { Flow::Halt } else { Flow::Continue })
    }

    async fn after_destroy(&self, _txn: &DatabaseTransaction, record: &Record) -> AppResult<()> {
        self.push("after_destroy", record);
        Ok(())
    }

    async fn before_restore(&self, _txn: &DatabaseTransaction, record: &mut Record) -> AppResult<Flow> {
        self.push("before_restore", record);
        Ok(if self.halt_restore { Flow::Halt } else { Flow::Continue })
    }

    async fn after_restore(&self, _txn: &DatabaseTransaction, record: &Record) -> AppResult<()> {
        self.push("after_restore", record);
        Ok(())
    }
}
