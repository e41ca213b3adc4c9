//! Soft-delete engine tests.

mod fixture;

use std::sync::Arc;

use common::AppError;
use domain::{Association, AttrValue, EntityDef};
use engine::Registry;

use fixture::{at, create, engine, setup, FixedClock, Recorder};

#[tokio::test]
async fn test_destroy_soft_deletes_record() {
    let (db, engine) = setup().await;
    let mut post = create(&engine, &db, "Post", []).await;

    engine.destroy_at(&db, &mut post, at(1)).await.unwrap();

    assert_eq!(post.destroyed_at, Some(at(1)));
    assert!(!post.is_persisted());
    let posts = engine.query("Post").unwrap();
    assert!(posts.all(&db).await.unwrap().is_empty());
    assert_eq!(posts.clone().unscoped().count(&db).await.unwrap(), 1);
    assert_eq!(posts.destroyed(None).count(&db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_destroy_uses_clock_when_no_timestamp_given() {
    let (db, engine) = setup().await;
    let engine = engine.with_clock(Arc::new(FixedClock(at(5))));
    let mut post = create(&engine, &db, "Post", []).await;

    engine.destroy(&db, &mut post).await.unwrap();

    let stored = engine.reload(&db, &post).await.unwrap();
    assert_eq!(stored.destroyed_at, Some(at(5)));
    assert_eq!(post.destroyed_at, Some(at(5)));
}

#[tokio::test]
async fn test_destroy_prefers_staged_timestamp() {
    let (db, engine) = setup().await;
    let engine = engine.with_clock(Arc::new(FixedClock(at(5))));
    let mut post = create(&engine, &db, "Post", []).await;

    post.mark_for_destruction(at(2));
    engine.destroy(&db, &mut post).await.unwrap();

    assert_eq!(post.destroyed_at, Some(at(2)));
    assert!(!post.is_marked_for_destruction());
}

#[tokio::test]
async fn test_destroy_cascades_same_timestamp() {
    let (db, engine) = setup().await;
    let mut post = create(&engine, &db, "Post", []).await;
    let first = create(&engine, &db, "Comment", [("post_id", post.id.into())]).await;
    let second = create(&engine, &db, "Comment", [("post_id", post.id.into())]).await;

    engine.destroy_at(&db, &mut post, at(1)).await.unwrap();

    for comment in [first, second] {
        let stored = engine.reload(&db, &comment).await.unwrap();
        assert_eq!(stored.destroyed_at, Some(at(1)));
    }
}

#[tokio::test]
async fn test_independently_destroyed_dependent_keeps_its_timestamp() {
    let (db, engine) = setup().await;
    let mut post = create(&engine, &db, "Post", []).await;
    let mut comment = create(&engine, &db, "Comment", [("post_id", post.id.into())]).await;

    engine.destroy_at(&db, &mut comment, at(1)).await.unwrap();
    engine.destroy_at(&db, &mut post, at(2)).await.unwrap();

    let stored = engine.reload(&db, &comment).await.unwrap();
    assert_eq!(stored.destroyed_at, Some(at(1)));
}

#[tokio::test]
async fn test_destroy_twice_is_concurrent_modification() {
    let (db, engine) = setup().await;
    let mut post = create(&engine, &db, "Post", []).await;
    engine.destroy_at(&db, &mut post, at(1)).await.unwrap();

    let err = engine.destroy_at(&db, &mut post, at(2)).await.unwrap_err();

    assert!(matches!(err, AppError::ConcurrentModification { .. }));
    assert!(err.is_refusal());
    assert_eq!(post.destroyed_at, Some(at(1)));
    let stored = engine.reload(&db, &post).await.unwrap();
    assert_eq!(stored.destroyed_at, Some(at(1)));
}

#[tokio::test]
async fn test_rejecting_hook_rolls_back_whole_cascade() {
    let db = fixture::database().await;
    let veto = Arc::new(Recorder {
        halt_destroy: true,
        ..Recorder::default()
    });
    let engine = engine(fixture::blog().callbacks("Like", veto.clone()));

    let mut post = create(&engine, &db, "Post", []).await;
    let comment = create(&engine, &db, "Comment", [("post_id", post.id.into())]).await;
    create(
        &engine,
        &db,
        "Like",
        [("likeable_id", post.id.into()), ("likeable_type", "Post".into())],
    )
    .await;

    let err = engine.destroy_at(&db, &mut post, at(1)).await.unwrap_err();

    assert!(matches!(err, AppError::AbortedByCallback { ref entity, ref event } if entity == "Like" && event == "destroy"));
    assert!(post.destroyed_at.is_none());
    // comments cascade before the like and must have been rolled back
    assert!(engine.reload(&db, &comment).await.unwrap().destroyed_at.is_none());
    assert!(engine.reload(&db, &post).await.unwrap().destroyed_at.is_none());
    assert_eq!(veto.count("before_destroy"), 1);
    assert_eq!(veto.count("after_destroy"), 0);
}

#[tokio::test]
async fn test_plain_dependents_are_hard_deleted() {
    let (db, engine) = setup().await;
    let mut post = create(&engine, &db, "Post", []).await;
    let category = create(&engine, &db, "Category", []).await;
    create(
        &engine,
        &db,
        "Categorization",
        [("post_id", post.id.into()), ("category_id", category.id.into())],
    )
    .await;

    engine.destroy_at(&db, &mut post, at(1)).await.unwrap();

    let remaining = engine.query("Categorization").unwrap().unscoped().count(&db).await.unwrap();
    assert_eq!(remaining, 0);
    // categories are reached through a non-dependent edge
    assert!(engine.find(&db, "Category", category.id).await.is_ok());
}

#[tokio::test]
async fn test_destroying_plain_owner_soft_deletes_dependents() {
    let (db, engine) = setup().await;
    let mut author = create(&engine, &db, "Author", []).await;
    let avatar = create(&engine, &db, "Avatar", [("author_id", author.id.into())]).await;
    let post = create(&engine, &db, "Post", [("author_id", author.id.into())]).await;

    engine.destroy_at(&db, &mut author, at(1)).await.unwrap();

    assert!(matches!(engine.reload(&db, &author).await, Err(AppError::NotFound)));
    assert!(author.destroyed_at.is_none());
    assert_eq!(engine.reload(&db, &avatar).await.unwrap().destroyed_at, Some(at(1)));
    assert_eq!(engine.reload(&db, &post).await.unwrap().destroyed_at, Some(at(1)));
}

#[tokio::test]
async fn test_polymorphic_dependents_match_owner_type() {
    let (db, engine) = setup().await;
    let other = create(&engine, &db, "Comment", []).await;
    let mut post = create(&engine, &db, "Post", []).await;
    let comment = create(&engine, &db, "Comment", [("post_id", post.id.into())]).await;
    assert_eq!(other.id, post.id);

    let post_like = create(
        &engine,
        &db,
        "Like",
        [("likeable_id", post.id.into()), ("likeable_type", "Post".into())],
    )
    .await;
    let comment_like = create(
        &engine,
        &db,
        "Like",
        [("likeable_id", comment.id.into()), ("likeable_type", "Comment".into())],
    )
    .await;
    // same id as the post, owned by an unrelated comment
    let stray = create(
        &engine,
        &db,
        "Like",
        [("likeable_id", other.id.into()), ("likeable_type", "Comment".into())],
    )
    .await;

    engine.destroy_at(&db, &mut post, at(1)).await.unwrap();

    assert_eq!(engine.reload(&db, &post_like).await.unwrap().destroyed_at, Some(at(1)));
    assert_eq!(engine.reload(&db, &comment_like).await.unwrap().destroyed_at, Some(at(1)));
    assert!(engine.reload(&db, &stray).await.unwrap().destroyed_at.is_none());
}

#[tokio::test]
async fn test_non_dependent_edges_are_left_alone() {
    let (db, engine) = setup().await;
    let author = create(&engine, &db, "Author", []).await;
    let mut post = create(&engine, &db, "Post", [("author_id", author.id.into())]).await;
    let mut category = create(&engine, &db, "Category", []).await;
    let categorization = create(
        &engine,
        &db,
        "Categorization",
        [("category_id", category.id.into())],
    )
    .await;

    engine.destroy_at(&db, &mut post, at(1)).await.unwrap();
    engine.destroy_at(&db, &mut category, at(1)).await.unwrap();

    assert!(engine.find(&db, "Author", author.id).await.is_ok());
    assert!(engine.find(&db, "Categorization", categorization.id).await.is_ok());
}

#[tokio::test]
async fn test_belongs_to_dependent_destroys_owner() {
    let (db, engine) = setup().await;
    let person = create(&engine, &db, "Person", []).await;
    let pet = create(&engine, &db, "Pet", [("person_id", person.id.into())]).await;
    let mut child = create(&engine, &db, "DestructiveChild", [("person_id", person.id.into())]).await;

    engine.destroy_at(&db, &mut child, at(1)).await.unwrap();

    assert!(matches!(engine.reload(&db, &person).await, Err(AppError::NotFound)));
    assert!(matches!(engine.reload(&db, &pet).await, Err(AppError::NotFound)));
    assert!(matches!(engine.reload(&db, &child).await, Err(AppError::NotFound)));
}

#[tokio::test]
async fn test_cyclic_dependents_terminate() {
    let db = fixture::database().await;
    let engine = engine(
        Registry::builder()
            .entity(EntityDef::new("Person", "people").association(
                Association::has_many("destructive_children", "DestructiveChild", "person_id")
                    .dependent(),
            ))
            .entity(
                EntityDef::new("DestructiveChild", "destructive_children")
                    .soft_delete()
                    .association(Association::belongs_to("person", "Person", "person_id").dependent()),
            ),
    );
    let person = create(&engine, &db, "Person", []).await;
    let mut child = create(&engine, &db, "DestructiveChild", [("person_id", person.id.into())]).await;
    let sibling = create(&engine, &db, "DestructiveChild", [("person_id", person.id.into())]).await;

    engine.destroy_at(&db, &mut child, at(1)).await.unwrap();

    assert!(matches!(engine.reload(&db, &person).await, Err(AppError::NotFound)));
    assert_eq!(child.destroyed_at, Some(at(1)));
    assert_eq!(engine.reload(&db, &sibling).await.unwrap().destroyed_at, Some(at(1)));
}

#[tokio::test]
async fn test_through_dependent_walks_intermediate() {
    let db = fixture::database().await;
    let engine = engine(
        Registry::builder()
            .entity(
                EntityDef::new("Commenter", "commenters")
                    .soft_delete()
                    .association(Association::has_many("comments", "Comment", "commenter_id"))
                    .association(Association::has_many_through("posts", "comments", "post").dependent()),
            )
            .entity(
                EntityDef::new("Comment", "comments")
                    .soft_delete()
                    .association(Association::belongs_to("post", "Post", "post_id")),
            )
            .entity(EntityDef::new("Post", "posts").soft_delete()),
    );
    let post = create(&engine, &db, "Post", []).await;
    let mut commenter = create(&engine, &db, "Commenter", []).await;
    let comment = create(
        &engine,
        &db,
        "Comment",
        [("commenter_id", commenter.id.into()), ("post_id", post.id.into())],
    )
    .await;

    engine.destroy_at(&db, &mut commenter, at(1)).await.unwrap();

    assert_eq!(engine.reload(&db, &comment).await.unwrap().destroyed_at, Some(at(1)));
    assert!(engine.reload(&db, &post).await.unwrap().destroyed_at.is_none());
}

#[tokio::test]
async fn test_counter_cache_follows_destroy() {
    let (db, engine) = setup().await;
    let author = create(&engine, &db, "Author", []).await;
    let mut post = create(&engine, &db, "Post", [("author_id", author.id.into())]).await;
    create(&engine, &db, "Post", [("author_id", author.id.into())]).await;

    let count = |record: domain::Record| record.get("posts_count").and_then(AttrValue::as_i64);
    assert_eq!(count(engine.reload(&db, &author).await.unwrap()), Some(2));

    engine.destroy_at(&db, &mut post, at(1)).await.unwrap();

    assert_eq!(count(engine.reload(&db, &author).await.unwrap()), Some(1));
}

#[tokio::test]
async fn test_autosave_destroys_marked_records_at_their_own_time() {
    let (db, engine) = setup().await;
    let mut commenter = create(&engine, &db, "Commenter", []).await;
    create(&engine, &db, "Comment", [("commenter_id", commenter.id.into())]).await;
    create(&engine, &db, "Comment", [("commenter_id", commenter.id.into())]).await;

    let comments = engine.associated(&db, &mut commenter, "comments").await.unwrap();
    assert_eq!(comments.len(), 2);
    comments[0].mark_for_destruction(at(3));

    let destroyed = engine.autosave(&db, &mut commenter).await.unwrap();

    assert_eq!(destroyed, 1);
    let cached = commenter.cached("comments").unwrap();
    assert_eq!(cached[0].destroyed_at, Some(at(3)));
    assert!(cached[1].destroyed_at.is_none());
    assert_eq!(engine.reload(&db, &cached[0]).await.unwrap().destroyed_at, Some(at(3)));
    assert!(engine.reload(&db, &cached[1]).await.unwrap().destroyed_at.is_none());
}

#[tokio::test]
async fn test_delete_removes_row_and_clears_mark() {
    let (db, engine) = setup().await;
    let mut post = create(&engine, &db, "Post", []).await;
    post.mark_for_destruction(at(1));

    engine.delete(&db, &mut post).await.unwrap();

    assert!(!post.is_marked_for_destruction());
    assert!(matches!(engine.reload(&db, &post).await, Err(AppError::NotFound)));
    assert!(matches!(engine.delete(&db, &mut post).await, Err(AppError::NotFound)));
}

#[tokio::test]
async fn test_created_destroyed_record_is_not_persisted() {
    let (db, engine) = setup().await;

    let post = create(&engine, &db, "Post", [("destroyed_at", at(1).into())]).await;

    assert!(!post.is_persisted());
    assert_eq!(post.destroyed_at, Some(at(1)));
    assert!(engine.query("Post").unwrap().all(&db).await.unwrap().is_empty());
}
