// Domain layer - Repository contracts and query specifications
// No dependencies on infrastructure (sqlx) or the DI container

pub mod entity;
pub mod query;
pub mod repository;
pub mod shared;

// Re-exports for convenience
pub use entity::{entity_name, Entity};
pub use query::{CompareOp, Filter, OrderBy, QueryProvider, QuerySpec, Queryable, SortDirection};
pub use repository::{EntityAction, EntityStream, Repository};
pub use shared::{DomainError, ErrorCode, ErrorSeverity, UnitOfWork};
