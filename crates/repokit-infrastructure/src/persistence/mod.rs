mod atomic;
mod change_tracker;
mod context;
mod database;
mod document;
mod entity_set;
mod error_mapper;
mod model;
mod query_provider;
mod repository;
mod repository_factory;
mod result_ext;
mod sql;

pub use change_tracker::{ChangeTracker, EntityState, EntryId, PendingChange};
pub use context::{DbContext, DbContextBuilder};
pub use database::Database;
pub use entity_set::{Entry, EntitySet};
pub use error_mapper::RepositoryErrorMapper;
pub use model::{EntitySetDescriptor, MappingContext, Model, ModelBuilder};
pub use query_provider::SetQueryProvider;
pub use repository::ContextRepository;
pub use repository_factory::RepositoryFactory;
pub use result_ext::ResultExt;
