// Infrastructure layer - SQLite mapping context and repository wiring
// Depends on domain layer, implements its interfaces

pub mod config;
pub mod logging;
pub mod persistence;
pub mod registration;

pub use config::ContextOptions;
pub use persistence::{
    ContextRepository, Database, DbContext, DbContextBuilder, MappingContext, ModelBuilder,
    RepositoryFactory,
};
pub use registration::{ServiceCollection, ServiceLifetime, ServiceProvider, ServiceScope};
