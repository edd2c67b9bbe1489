use async_trait::async_trait;
use repokit_domain::{entity_name, DomainError, Entity, Queryable, UnitOfWork};
use serde_json::Value;
use sqlx::SqliteConnection;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::change_tracker::{ChangeTracker, EntityState, EntryId, PendingChange};
use super::model::{EntitySetDescriptor, MappingContext, Model};
use super::{document, sql, Database, EntitySet, ResultExt, SetQueryProvider};
use crate::config::ContextOptions;

/// Change-tracking session over the declared entity sets of a mapping context.
///
/// A context is meant for one logical task at a time. Staging is synchronous;
/// [`DbContext::save_changes`] writes every pending change in one transaction.
pub struct DbContext {
    database: Arc<Database>,
    model: Arc<Model>,
    tracker: Mutex<ChangeTracker>,
}

impl DbContext {
    /// Context over the sets declared by `C`
    pub fn new<C: MappingContext>(database: Arc<Database>) -> Result<Self, DomainError> {
        let model = Model::build::<C>()?;
        Ok(Self::with_model(database, Arc::new(model)))
    }

    /// Context sharing an already built model
    pub fn with_model(database: Arc<Database>, model: Arc<Model>) -> Self {
        Self {
            database,
            model,
            tracker: Mutex::new(ChangeTracker::new()),
        }
    }

    pub fn builder() -> DbContextBuilder {
        DbContextBuilder::new()
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn entity_sets(&self) -> &[EntitySetDescriptor] {
        self.model.sets()
    }

    /// Staging API of one entity set
    pub fn set<T: Entity>(&self) -> Result<EntitySet<'_, T>, DomainError> {
        let descriptor = self.model.require::<T>()?;
        Ok(EntitySet::new(self, descriptor))
    }

    pub fn query_provider<T: Entity>(&self) -> Result<Arc<SetQueryProvider<T>>, DomainError> {
        let descriptor = self.model.require::<T>()?;
        Ok(Arc::new(SetQueryProvider::new(
            Arc::clone(&self.database),
            descriptor.set_name(),
        )))
    }

    /// No-tracking query over the set of `T`
    pub fn query<T: Entity>(&self) -> Result<Queryable<T>, DomainError> {
        Ok(Queryable::new(self.query_provider::<T>()?))
    }

    pub async fn ensure_created(&self) -> Result<(), DomainError> {
        self.database.ensure_created(&self.model).await
    }

    pub fn tracked_count(&self) -> usize {
        self.tracker().len()
    }

    pub fn has_changes(&self) -> bool {
        self.tracker().has_changes()
    }

    /// The tracker lock is never held across an await point.
    pub(crate) fn tracker(&self) -> MutexGuard<'_, ChangeTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write every pending change in one transaction.
    ///
    /// On success inserted and modified entries become unchanged and deleted
    /// entries stop being tracked; returns the number of written rows. On
    /// failure the transaction is rolled back and tracked state is untouched.
    pub async fn save_changes(&self) -> Result<u64, DomainError> {
        self.commit_pending(None).await
    }

    /// [`DbContext::save_changes`] that gives up when `cancel` fires.
    ///
    /// The token is observed until every statement has run. Once COMMIT is
    /// issued the save runs to completion, so a save that reports `Cancelled`
    /// has always been rolled back.
    pub async fn save_changes_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<u64, DomainError> {
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled("Save changes cancelled".to_string()));
        }
        self.commit_pending(Some(cancel)).await
    }

    async fn commit_pending(&self, cancel: Option<&CancellationToken>) -> Result<u64, DomainError> {
        let start = Instant::now();
        let pending = self.tracker().pending();
        if pending.is_empty() {
            debug!("No pending changes to save");
            return Ok(0);
        }

        let mut tx = self
            .database
            .pool()
            .begin()
            .await
            .map_repo_error("Begin transaction")?;

        let (affected, stored) = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Save changes cancelled before commit");
                    return Err(DomainError::Cancelled("Save changes cancelled".to_string()));
                }
                written = write_pending(&mut *tx, &pending) => written?,
            },
            None => write_pending(&mut *tx, &pending).await?,
        };

        tx.commit().await.map_repo_error("Commit transaction")?;
        self.tracker().accept_changes(stored);

        info!(
            "💾 Saved {} change(s) in {:.2}ms",
            affected,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(affected)
    }

    /// Decoded copy of a tracked entity
    pub(crate) fn tracked_entity<T: Entity>(
        &self,
        id: EntryId,
    ) -> Result<T, DomainError> {
        let values = self.tracker().values(id).cloned().ok_or_else(|| {
            DomainError::InvalidInput(format!(
                "{} entry {} is not tracked",
                entity_name::<T>(),
                id.value()
            ))
        })?;
        document::from_document(values)
    }
}

/// Run the statements of every pending change; returns written rows and the
/// stored values of inserted entries.
async fn write_pending(
    conn: &mut SqliteConnection,
    pending: &[PendingChange],
) -> Result<(u64, Vec<(EntryId, Value)>), DomainError> {
    let mut affected = 0u64;
    let mut stored = Vec::new();
    for change in pending {
        match change.state {
            EntityState::Added => {
                let values = insert_document(conn, change).await?;
                stored.push((change.id, values));
                affected += 1;
            }
            EntityState::Modified => {
                affected += write_existing(conn, change, true).await?;
            }
            EntityState::Deleted => {
                affected += write_existing(conn, change, false).await?;
            }
            EntityState::Unchanged | EntityState::Detached => {}
        }
    }
    Ok((affected, stored))
}

async fn insert_document(
    conn: &mut SqliteConnection,
    change: &PendingChange,
) -> Result<Value, DomainError> {
    let operation = format!("Insert into {}", change.set);
    let mut values = change.values.clone();

    match &change.key {
        Some(key) => {
            let body = values.to_string();
            let statement = match document::integer_key(&values, change.key_field) {
                Some(seq) => sql::insert_with_seq(change.set, seq, key, &body),
                None => sql::insert(change.set, key, &body),
            };
            sqlx::query_with(&statement.sql, statement.arguments()?)
                .execute(&mut *conn)
                .await
                .map_repo_error(&operation)?;
        }
        None => {
            let placeholder = format!("pending:{}", uuid::Uuid::new_v4());
            let statement = sql::insert(change.set, &placeholder, &values.to_string());
            let seq = sqlx::query_with(&statement.sql, statement.arguments()?)
                .execute(&mut *conn)
                .await
                .map_repo_error(&operation)?
                .last_insert_rowid();

            document::set_field(&mut values, change.key_field, Value::from(seq));
            let statement =
                sql::finalize_insert(change.set, seq, &seq.to_string(), &values.to_string());
            sqlx::query_with(&statement.sql, statement.arguments()?)
                .execute(&mut *conn)
                .await
                .map_repo_error(&operation)?;
        }
    }

    Ok(values)
}

/// Update or delete one stored document; a missing row is a concurrency conflict
async fn write_existing(
    conn: &mut SqliteConnection,
    change: &PendingChange,
    update: bool,
) -> Result<u64, DomainError> {
    let key = change.key.as_deref().ok_or_else(|| {
        DomainError::InvalidInput(format!(
            "Entry {} in '{}' has no key",
            change.id.value(),
            change.set
        ))
    })?;

    let (statement, verb) = if update {
        (sql::update(change.set, key, &change.values.to_string()), "Update")
    } else {
        (sql::delete(change.set, key), "Delete")
    };

    let rows = sqlx::query_with(&statement.sql, statement.arguments()?)
        .execute(&mut *conn)
        .await
        .map_repo_error(&format!("{} {}", verb, change.set))?
        .rows_affected();

    if rows == 0 {
        return Err(DomainError::Concurrency(format!(
            "{} of key {} in '{}' affected no rows; the entity no longer exists",
            verb, key, change.set
        )));
    }
    Ok(rows)
}

#[async_trait]
impl UnitOfWork for DbContext {
    async fn save_changes(&self) -> Result<u64, DomainError> {
        DbContext::save_changes(self).await
    }

    fn discard_changes(&self) {
        self.clear_changes();
    }

    fn tracked_count(&self) -> usize {
        DbContext::tracked_count(self)
    }

    fn has_changes(&self) -> bool {
        DbContext::has_changes(self)
    }
}

/// Connects a database from [`ContextOptions`] and builds a [`DbContext`]
#[derive(Debug, Clone, Default)]
pub struct DbContextBuilder {
    options: ContextOptions,
}

impl DbContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_options(mut self, configure: impl FnOnce(&mut ContextOptions)) -> Self {
        configure(&mut self.options);
        self
    }

    pub async fn build<C: MappingContext>(self) -> Result<DbContext, DomainError> {
        let model = Arc::new(Model::build::<C>()?);
        let database = Arc::new(Database::connect(&self.options).await?);
        if self.options.ensure_created {
            database.ensure_created(&model).await?;
        }
        Ok(DbContext::with_model(database, model))
    }
}
