use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::entity::Entity;
use crate::query::{Filter, QuerySpec, Queryable};
use crate::shared::DomainError;

/// Lazily polled, finite sequence of query results. Not restartable.
pub type EntityStream<T> = BoxStream<'static, Result<T, DomainError>>;

/// Mutation callback applied to loaded entities.
pub type EntityAction<'a, T> = &'a mut (dyn FnMut(&mut T) + Send);

/// Generic repository contract for one entity type.
///
/// Every mutation is atomic: it stages one change, commits it and leaves the
/// underlying context with no tracked entities. Failures are returned as-is
/// and leave tracked state untouched; call [`Repository::discard_changes`] to
/// reset the context after a failed commit.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Raw query over the entity set, outside the repository's guarantees.
    fn as_queryable(&self) -> Queryable<T>;

    /// Count all entities
    async fn count(&self) -> Result<u64, DomainError>;

    /// Count entities matching a filter
    async fn count_where(&self, filter: &Filter) -> Result<u64, DomainError>;

    async fn any(&self, filter: &Filter) -> Result<bool, DomainError>;

    /// True when every entity matches; true for an empty set.
    async fn all(&self, filter: &Filter) -> Result<bool, DomainError>;

    /// First match in insertion order.
    ///
    /// # Errors
    /// `DomainError::NotFound` when nothing matches.
    async fn find(&self, filter: &Filter) -> Result<T, DomainError>;

    /// Stream matches of a query. Cancelling the token ends the stream with a
    /// single `DomainError::Cancelled` item.
    fn get(&self, query: QuerySpec<T>, cancel: CancellationToken) -> EntityStream<T>;

    /// Unordered, unpaged, uncancellable form of [`Repository::get`].
    fn get_where(&self, filter: Filter) -> EntityStream<T> {
        self.get(QuerySpec::new(filter), CancellationToken::new())
    }

    /// Insert an entity; returns it with its store-generated key.
    async fn add(&self, entity: T) -> Result<T, DomainError>;

    /// Insert a batch in one transaction.
    async fn add_range(&self, entities: Vec<T>) -> Result<Vec<T>, DomainError>;

    async fn remove(&self, entity: &T) -> Result<(), DomainError>;

    async fn remove_range(&self, entities: &[T]) -> Result<(), DomainError>;

    /// Remove every match; returns how many were removed.
    async fn remove_where(&self, filter: &Filter) -> Result<u64, DomainError>;

    /// Replace the stored entity with the same key.
    async fn update(&self, entity: &T) -> Result<(), DomainError>;

    async fn update_range(&self, entities: &[T]) -> Result<(), DomainError>;

    /// Copy `replacement`'s values onto the single entity matching `key_filter`.
    ///
    /// # Errors
    /// `NotFound` for zero matches, `MultipleMatches` for more than one.
    async fn update_matching(&self, key_filter: &Filter, replacement: &T)
        -> Result<T, DomainError>;

    /// Apply `action` to every match and commit once; returns the match count.
    async fn update_where(
        &self,
        filter: &Filter,
        action: EntityAction<'_, T>,
    ) -> Result<u64, DomainError>;

    /// Insert `entity` when nothing matches `match_on`; otherwise copy
    /// `entity`'s values onto the first match, apply `update_action` to it and
    /// save. Returns the stored entity.
    async fn upsert(
        &self,
        entity: T,
        match_on: &Filter,
        update_action: EntityAction<'_, T>,
        cancel: CancellationToken,
    ) -> Result<T, DomainError>;

    /// Commit whatever the context is tracking.
    async fn save_changes(&self, cancel: CancellationToken) -> Result<u64, DomainError>;

    /// Drop every tracked change without touching the store.
    async fn discard_changes(&self, cancel: CancellationToken) -> Result<(), DomainError>;
}
