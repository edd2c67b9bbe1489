use repokit_domain::{entity_name, DomainError, Entity, Repository};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use super::{ContextRepository, MappingContext};
use crate::registration::ServiceScope;

type CachedRepository = Arc<dyn Any + Send + Sync>;

/// Hands out one repository per entity type for the context `C` of a scope.
///
/// The first request for a type builds the repository; later requests get
/// the same instance back.
pub struct RepositoryFactory<C: MappingContext> {
    scope: ServiceScope,
    repositories: RwLock<HashMap<TypeId, CachedRepository>>,
    _context: PhantomData<fn() -> C>,
}

impl<C: MappingContext> RepositoryFactory<C> {
    pub fn new(scope: ServiceScope) -> Self {
        Self {
            scope,
            repositories: RwLock::new(HashMap::new()),
            _context: PhantomData,
        }
    }

    pub fn get_repository<T: Entity>(&self) -> Result<Arc<dyn Repository<T>>, DomainError> {
        let type_id = TypeId::of::<T>();

        if let Some(cached) = self
            .repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
        {
            return downcast::<T>(cached);
        }

        let context = self.scope.get::<Arc<C>>()?;
        let repository: Arc<dyn Repository<T>> = Arc::new(ContextRepository::<C, T>::new(context)?);

        // a racing request may have inserted first; hand out whichever won
        let mut repositories = self
            .repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let cached = repositories
            .entry(type_id)
            .or_insert_with(|| Arc::new(repository) as CachedRepository);
        debug!(entity = entity_name::<T>(), "Repository created");
        downcast::<T>(cached)
    }

    /// Number of entity types with a cached repository
    pub fn len(&self) -> usize {
        self.repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn downcast<T: Entity>(cached: &CachedRepository) -> Result<Arc<dyn Repository<T>>, DomainError> {
    cached
        .downcast_ref::<Arc<dyn Repository<T>>>()
        .cloned()
        .ok_or_else(|| {
            DomainError::Infrastructure(format!(
                "Cached repository for {} has an unexpected type",
                entity_name::<T>()
            ))
        })
}
