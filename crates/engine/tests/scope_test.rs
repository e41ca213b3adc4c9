//! Visibility scope tests against a live database.

mod fixture;

use std::collections::BTreeMap;

use common::AppError;
use domain::{AttrValue, ColumnKind, EntityDef};
use sea_orm::ConnectionTrait;

use fixture::{at, create, engine, setup};

#[tokio::test]
async fn test_default_scope_hides_destroyed_records() {
    let (db, engine) = setup().await;
    let kept = create(&engine, &db, "Post", []).await;
    let mut gone = create(&engine, &db, "Post", []).await;
    engine.destroy_at(&db, &mut gone, at(1)).await.unwrap();

    let visible = engine.query("Post").unwrap().all(&db).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, kept.id);

    let all = engine.query("Post").unwrap().unscoped().count(&db).await.unwrap();
    assert_eq!(all, 2);

    assert!(matches!(
        engine.find(&db, "Post", gone.id).await,
        Err(AppError::NotFound)
    ));
    assert_eq!(
        engine.find_with_destroyed(&db, "Post", gone.id).await.unwrap().destroyed_at,
        Some(at(1))
    );
}

#[tokio::test]
async fn test_destroyed_scope_on_model() {
    let (db, engine) = setup().await;
    create(&engine, &db, "Post", []).await;
    let mut gone = create(&engine, &db, "Post", []).await;
    engine.destroy_at(&db, &mut gone, at(1)).await.unwrap();

    let destroyed = engine.query("Post").unwrap().destroyed(None).all(&db).await.unwrap();

    assert_eq!(destroyed.len(), 1);
    assert_eq!(destroyed[0].id, gone.id);
    assert!(destroyed[0].is_destroyed());
}

#[tokio::test]
async fn test_destroyed_scope_on_relation() {
    let (db, engine) = setup().await;
    let post = create(&engine, &db, "Post", []).await;
    let other = create(&engine, &db, "Post", []).await;
    let mut mine = create(&engine, &db, "Comment", [("post_id", post.id.into())]).await;
    create(&engine, &db, "Comment", [("post_id", post.id.into())]).await;
    let mut theirs = create(&engine, &db, "Comment", [("post_id", other.id.into())]).await;
    engine.destroy_at(&db, &mut mine, at(1)).await.unwrap();
    engine.destroy_at(&db, &mut theirs, at(1)).await.unwrap();

    let destroyed = engine
        .query("Comment")
        .unwrap()
        .filter_eq("post_id", post.id)
        .unwrap()
        .destroyed(None)
        .all(&db)
        .await
        .unwrap();

    assert_eq!(destroyed.len(), 1);
    assert_eq!(destroyed[0].id, mine.id);
}

#[tokio::test]
async fn test_destroyed_at_timestamp_selects_cascade_siblings() {
    let (db, engine) = setup().await;
    let mut post = create(&engine, &db, "Post", []).await;
    create(&engine, &db, "Comment", [("post_id", post.id.into())]).await;
    create(&engine, &db, "Comment", [("post_id", post.id.into())]).await;
    let mut earlier = create(&engine, &db, "Comment", [("post_id", post.id.into())]).await;
    engine.destroy_at(&db, &mut earlier, at(1)).await.unwrap();
    engine.destroy_at(&db, &mut post, at(2)).await.unwrap();

    let siblings = engine
        .query("Comment")
        .unwrap()
        .destroyed(post.destroyed_at)
        .count(&db)
        .await
        .unwrap();

    assert_eq!(siblings, 2);
}

#[tokio::test]
async fn test_plain_types_have_no_destroyed_set() {
    let (db, engine) = setup().await;
    create(&engine, &db, "Category", []).await;

    let categories = engine.query("Category").unwrap();

    assert_eq!(categories.clone().count(&db).await.unwrap(), 1);
    assert!(categories.destroyed(None).all(&db).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_null_filter_matches_missing_foreign_key() {
    let (db, engine) = setup().await;
    let post = create(&engine, &db, "Post", []).await;
    create(&engine, &db, "Comment", [("post_id", post.id.into())]).await;
    create(&engine, &db, "Comment", []).await;

    let orphans = engine
        .query("Comment")
        .unwrap()
        .filter_eq("post_id", AttrValue::Null)
        .unwrap()
        .count(&db)
        .await
        .unwrap();

    assert_eq!(orphans, 1);
}

#[tokio::test]
async fn test_unknown_column_and_entity_are_rejected() {
    let (_db, engine) = setup().await;

    let err = engine.query("Post").unwrap().filter_eq("title", "x").unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert!(matches!(engine.query("Ghost"), Err(AppError::UnknownEntity(_))));
}

#[tokio::test]
async fn test_text_columns_keep_uuid_and_timestamp_shaped_strings() {
    let db = fixture::database().await;
    db.execute_unprepared("CREATE TABLE notes (id INTEGER PRIMARY KEY, title TEXT, destroyed_at DATETIME)")
        .await
        .unwrap();
    let engine = engine(
        fixture::blog().entity(
            EntityDef::new("Note", "notes")
                .soft_delete()
                .column("title", ColumnKind::Text),
        ),
    );
    let titles = ["67e55044-10b1-426f-9247-bb680e5fe0c8", "2024-01-01T00:00:00Z"];
    for title in titles {
        let attributes: BTreeMap<String, AttrValue> =
            serde_json::from_str(&format!(r#"{{"title": "{}"}}"#, title)).unwrap();
        engine.create(&db, "Note", attributes).await.unwrap();
    }

    let notes = engine.query("Note").unwrap().order_by_id().all(&db).await.unwrap();

    let stored: Vec<_> = notes
        .iter()
        .map(|note| note.get("title").and_then(AttrValue::as_str).unwrap().to_string())
        .collect();
    assert_eq!(stored, titles);

    let err = engine
        .create(&db, "Note", fixture::attrs([("title", 7i64.into())]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(engine.query("Note").unwrap().count(&db).await.unwrap(), 2);
}
