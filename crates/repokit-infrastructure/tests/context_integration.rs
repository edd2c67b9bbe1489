use std::sync::Arc;

use repokit_domain::{DomainError, Filter, UnitOfWork};
use repokit_infrastructure::config::ContextOptions;
use repokit_infrastructure::persistence::{DbContext, EntityState, MappingContext};
use tokio_util::sync::CancellationToken;

mod test_helpers;

use test_helpers::{context_of, setup_context, setup_repository, Setting, TestContext, TestEntity};

#[tokio::test]
async fn atomic_helpers_leave_no_tracked_entities() {
    let context = setup_context().await;
    let db = context_db(&context);

    let stored = db.add_atomic(TestEntity::new("a", 1)).await.unwrap();
    assert_eq!(db.tracked_count(), 0);

    let batch = db
        .add_range_atomic(vec![TestEntity::new("b", 2), TestEntity::new("c", 3)])
        .await
        .unwrap();
    assert_eq!(db.tracked_count(), 0);

    let mut edited = stored.clone();
    edited.score = 10;
    db.update_atomic(&edited).await.unwrap();
    db.update_range_atomic(&batch).await.unwrap();
    assert_eq!(db.tracked_count(), 0);

    let touched = db
        .update_where_atomic(&Filter::all(), |e: &mut TestEntity| e.score += 1)
        .await
        .unwrap();
    assert_eq!(touched, 3);
    assert_eq!(db.tracked_count(), 0);

    db.update_single_atomic(&Filter::eq("id", stored.id), &TestEntity::new("a2", 0))
        .await
        .unwrap();
    db.remove_atomic(&batch[0]).await.unwrap();
    db.remove_range_atomic(&batch[1..]).await.unwrap();
    assert_eq!(db.remove_where_atomic::<TestEntity>(&Filter::all()).await.unwrap(), 1);

    assert_eq!(db.tracked_count(), 0);
    assert_eq!(db.query::<TestEntity>().unwrap().count().await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_key_keeps_tracked_state_until_discarded() {
    let (scope, _repo) = setup_repository().await;
    let settings = scope
        .get::<Arc<dyn repokit_domain::Repository<Setting>>>()
        .unwrap();
    let context = context_of(&scope);

    settings.add(Setting::new("theme", "dark")).await.unwrap();

    // ============================================================
    // The second insert violates the unique key
    // ============================================================
    let err = settings.add(Setting::new("theme", "light")).await.unwrap_err();
    assert!(matches!(err, DomainError::ConstraintViolation(_)));
    assert_eq!(err.code().code(), 4002);

    // the failed commit is still tracked and would fail again
    assert_eq!(context.db().tracked_count(), 1);
    assert!(context.db().has_changes());
    assert!(settings.save_changes(CancellationToken::new()).await.is_err());

    // ============================================================
    // Discard resets the context
    // ============================================================
    settings
        .discard_changes(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(context.db().tracked_count(), 0);

    let stored = settings.find(&Filter::eq("key", "theme")).await.unwrap();
    assert_eq!(stored.value, "dark");
}

#[tokio::test]
async fn batch_insert_rolls_back_together() {
    let (_scope, repo) = setup_repository().await;
    let mut existing = TestEntity::new("existing", 1);
    existing.id = 7;
    repo.add(existing.clone()).await.unwrap();

    let err = repo
        .add_range(vec![TestEntity::new("fresh", 2), existing])
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ConstraintViolation(_)), "{:?}", err);

    repo.discard_changes(CancellationToken::new()).await.unwrap();
    assert_eq!(repo.count().await.unwrap(), 1, "The fresh entity must be rolled back");
}

#[tokio::test]
async fn staging_the_same_key_twice_is_rejected() {
    let context = setup_context().await;
    let db = context_db(&context);
    let mut entity = TestEntity::new("twice", 1);
    entity.id = 3;

    let err = db
        .add_range_atomic(vec![entity.clone(), entity])
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidInput(_)));
    db.clear_changes();
}

#[tokio::test]
async fn raw_save_changes_keeps_entries_tracked() {
    let context = setup_context().await;
    let db = context_db(&context);

    let set = db.set::<TestEntity>().unwrap();
    let entry = set.add(&TestEntity::new("raw", 1)).unwrap();
    assert_eq!(entry.state(), EntityState::Added);

    let written = db.save_changes().await.unwrap();
    assert_eq!(written, 1);
    assert_eq!(entry.state(), EntityState::Unchanged);
    assert_eq!(db.tracked_count(), 1);
    assert!(!db.has_changes());

    entry.modify(|e| e.score = 99).unwrap();
    assert_eq!(entry.state(), EntityState::Modified);
    assert_eq!(UnitOfWork::save_changes(db).await.unwrap(), 1);

    UnitOfWork::discard_changes(db);
    assert_eq!(UnitOfWork::tracked_count(db), 0);

    let stored = db
        .query::<TestEntity>()
        .unwrap()
        .filter(Filter::eq("name", "raw"))
        .first()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.score, 99);
}

#[tokio::test]
async fn cancelled_save_writes_nothing() {
    let (scope, repo) = setup_repository().await;
    let context = context_of(&scope);
    context
        .db()
        .set::<TestEntity>()
        .unwrap()
        .add(&TestEntity::new("pending", 1))
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let err = repo.save_changes(token).await.unwrap_err();
    assert!(matches!(err, DomainError::Cancelled(_)));
    assert!(context.db().has_changes());
    assert_eq!(repo.count().await.unwrap(), 0);

    let token = CancellationToken::new();
    token.cancel();
    assert!(repo.discard_changes(token).await.is_err());
    assert_eq!(context.db().tracked_count(), 1);
}

#[tokio::test]
async fn cancellable_save_with_live_token_commits() {
    let context = setup_context().await;
    let db = context_db(&context);
    let entry = db
        .set::<TestEntity>()
        .unwrap()
        .add(&TestEntity::new("live", 1))
        .unwrap();

    let token = CancellationToken::new();
    assert_eq!(db.save_changes_cancellable(&token).await.unwrap(), 1);
    assert_eq!(entry.state(), EntityState::Unchanged);

    // cancelling after the commit changes nothing
    token.cancel();
    assert!(!db.has_changes());
    assert_eq!(db.query::<TestEntity>().unwrap().count().await.unwrap(), 1);
}

#[tokio::test]
async fn builder_creates_file_database_and_tables() {
    let dir = tempfile::tempdir().expect("Create temp dir");
    let path = dir.path().join("data").join("repokit.db");

    let db = DbContext::builder()
        .with_options(|options| {
            *options = ContextOptions::sqlite_file(&path).with_max_connections(2)
        })
        .build::<TestContext>()
        .await
        .expect("Build file context");

    let stored = db.add_atomic(TestEntity::new("persisted", 1)).await.unwrap();
    db.database().close().await;
    assert!(path.exists());

    // reopen and read back
    let reopened = DbContext::builder()
        .options(ContextOptions::sqlite_file(&path))
        .build::<TestContext>()
        .await
        .unwrap();
    let found = reopened
        .query::<TestEntity>()
        .unwrap()
        .filter(Filter::eq("id", stored.id))
        .first()
        .await
        .unwrap();
    assert_eq!(found, Some(stored));
}

#[tokio::test]
async fn context_without_tables_reports_persistence_failure() {
    let db = DbContext::builder()
        .with_options(|options| options.ensure_created = false)
        .build::<TestContext>()
        .await
        .unwrap();

    let err = db.add_atomic(TestEntity::new("nowhere", 1)).await.unwrap_err();
    assert!(err.is_persistence_failure());
    assert_eq!(db.tracked_count(), 1);

    db.ensure_created().await.unwrap();
    assert_eq!(db.save_changes().await.unwrap(), 1);
}

fn context_db(context: &TestContext) -> &DbContext {
    context.db()
}
