//! Query specifications and the provider seam used by storage adapters.

mod filter;
mod queryable;
mod spec;

pub use filter::{validate_field_path, CompareOp, Filter};
pub use queryable::{QueryProvider, Queryable};
pub use spec::{OrderBy, QuerySpec, SortDirection};
