//! Entity-set declarations of a mapping context.
//!
//! A context lists its entity types once, in [`MappingContext::configure`].
//! The resulting [`Model`] drives table creation, entity-set lookup and
//! repository registration.

use std::any::{type_name, TypeId};
use std::fmt;
use std::marker::PhantomData;

use repokit_domain::query::validate_field_path;
use repokit_domain::{DomainError, Entity};

use super::DbContext;
use crate::registration::{register_repository, ServiceCollection};

/// A user-defined mapping context: declares its entity sets and exposes the
/// change-tracking [`DbContext`] behind them.
///
/// ```ignore
/// struct ShopContext {
///     db: DbContext,
/// }
///
/// impl MappingContext for ShopContext {
///     fn configure(model: &mut ModelBuilder<Self>) {
///         model.entity::<Customer>().entity::<Order>();
///     }
///
///     fn db(&self) -> &DbContext {
///         &self.db
///     }
/// }
/// ```
pub trait MappingContext: Sized + Send + Sync + 'static {
    fn configure(model: &mut ModelBuilder<Self>);

    fn db(&self) -> &DbContext;
}

/// One declared entity set
#[derive(Clone)]
pub struct EntitySetDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    set_name: &'static str,
    key_field: &'static str,
    register: fn(&mut ServiceCollection),
}

impl EntitySetDescriptor {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn set_name(&self) -> &'static str {
        self.set_name
    }

    pub fn key_field(&self) -> &'static str {
        self.key_field
    }

    /// Register the scoped repository binding for this entity type
    pub fn register(&self, services: &mut ServiceCollection) {
        (self.register)(services)
    }
}

impl fmt::Debug for EntitySetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySetDescriptor")
            .field("type_name", &self.type_name)
            .field("set_name", &self.set_name)
            .field("key_field", &self.key_field)
            .finish()
    }
}

pub struct ModelBuilder<C> {
    sets: Vec<EntitySetDescriptor>,
    _context: PhantomData<fn() -> C>,
}

impl<C: MappingContext> ModelBuilder<C> {
    fn new() -> Self {
        Self {
            sets: Vec::new(),
            _context: PhantomData,
        }
    }

    /// Declare an entity set. Declaring the same type twice is a no-op.
    pub fn entity<T: Entity>(&mut self) -> &mut Self {
        let type_id = TypeId::of::<T>();
        if self.sets.iter().all(|s| s.type_id != type_id) {
            self.sets.push(EntitySetDescriptor {
                type_id,
                type_name: type_name::<T>(),
                set_name: T::SET_NAME,
                key_field: T::KEY_FIELD,
                register: register_repository::<C, T>,
            });
        }
        self
    }
}

/// Validated set of entity declarations
#[derive(Debug, Clone, Default)]
pub struct Model {
    sets: Vec<EntitySetDescriptor>,
}

impl Model {
    /// Collect and validate the declarations of `C`
    pub fn build<C: MappingContext>() -> Result<Self, DomainError> {
        let mut builder = ModelBuilder::<C>::new();
        C::configure(&mut builder);

        for (index, set) in builder.sets.iter().enumerate() {
            if !is_identifier(set.set_name) {
                return Err(DomainError::InvalidInput(format!(
                    "Entity set name '{}' of {} must match [A-Za-z_][A-Za-z0-9_]*",
                    set.set_name, set.type_name
                )));
            }
            validate_field_path(set.key_field).map_err(|e| {
                DomainError::InvalidInput(format!("Key field of {}: {}", set.type_name, e))
            })?;
            if let Some(other) = builder.sets[..index]
                .iter()
                .find(|s| s.set_name.eq_ignore_ascii_case(set.set_name))
            {
                return Err(DomainError::InvalidInput(format!(
                    "Entity set '{}' is declared by both {} and {}",
                    set.set_name, other.type_name, set.type_name
                )));
            }
        }

        Ok(Self { sets: builder.sets })
    }

    pub fn sets(&self) -> &[EntitySetDescriptor] {
        &self.sets
    }

    pub fn find<T: Entity>(&self) -> Option<&EntitySetDescriptor> {
        let type_id = TypeId::of::<T>();
        self.sets.iter().find(|s| s.type_id == type_id)
    }

    /// Descriptor for `T`, or an error naming the undeclared type
    pub fn require<T: Entity>(&self) -> Result<&EntitySetDescriptor, DomainError> {
        self.find::<T>().ok_or_else(|| {
            DomainError::InvalidInput(format!(
                "{} is not declared by this mapping context",
                type_name::<T>()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    use crate::config::ContextOptions;
    use crate::persistence::Database;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Author {
        id: i64,
    }

    impl Entity for Author {
        const SET_NAME: &'static str = "authors";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Book {
        isbn: String,
    }

    impl Entity for Book {
        const SET_NAME: &'static str = "books";
        const KEY_FIELD: &'static str = "isbn";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Clash {
        id: i64,
    }

    impl Entity for Clash {
        const SET_NAME: &'static str = "Authors";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct BadName {
        id: i64,
    }

    impl Entity for BadName {
        const SET_NAME: &'static str = "bad name";
    }

    struct LibraryContext {
        db: DbContext,
    }

    impl MappingContext for LibraryContext {
        fn configure(model: &mut ModelBuilder<Self>) {
            model.entity::<Author>().entity::<Book>().entity::<Author>();
        }

        fn db(&self) -> &DbContext {
            &self.db
        }
    }

    struct ClashContext {
        db: DbContext,
    }

    impl MappingContext for ClashContext {
        fn configure(model: &mut ModelBuilder<Self>) {
            model.entity::<Author>().entity::<Clash>();
        }

        fn db(&self) -> &DbContext {
            &self.db
        }
    }

    struct BadNameContext {
        db: DbContext,
    }

    impl MappingContext for BadNameContext {
        fn configure(model: &mut ModelBuilder<Self>) {
            model.entity::<BadName>();
        }

        fn db(&self) -> &DbContext {
            &self.db
        }
    }

    #[test]
    fn test_model_collects_declared_sets_once() {
        let model = Model::build::<LibraryContext>().unwrap();
        let names: Vec<_> = model.sets().iter().map(|s| s.set_name()).collect();
        assert_eq!(names, vec!["authors", "books"]);
        assert_eq!(model.require::<Book>().unwrap().key_field(), "isbn");
        assert!(model.find::<Clash>().is_none());
    }

    #[test]
    fn test_duplicate_set_names_are_rejected() {
        let err = Model::build::<ClashContext>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn test_set_names_must_be_identifiers() {
        assert!(Model::build::<BadNameContext>().is_err());
        assert!(is_identifier("_audit_log2"));
        assert!(!is_identifier("2fast"));
    }

    #[tokio::test]
    async fn test_require_reports_undeclared_type() {
        let database = Arc::new(Database::connect(&ContextOptions::in_memory()).await.unwrap());
        let context = LibraryContext {
            db: DbContext::new::<LibraryContext>(database).unwrap(),
        };
        let err = context.db().model().require::<Clash>().unwrap_err();
        assert!(err.message().contains("Clash"));
    }
}
