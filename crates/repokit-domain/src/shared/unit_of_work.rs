use async_trait::async_trait;

use super::DomainError;

/// Abstract unit of work over a change-tracking context.
/// This allows callers to commit or discard staged changes
/// without depending on a specific database implementation (sqlx).
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Commit every staged change in one transaction.
    /// Returns the number of affected rows.
    async fn save_changes(&self) -> Result<u64, DomainError>;

    /// Forget every tracked entity without touching the store
    fn discard_changes(&self);

    /// Number of entities currently tracked
    fn tracked_count(&self) -> usize;

    /// Whether any tracked entity has a pending insert, update or delete
    fn has_changes(&self) -> bool;
}
