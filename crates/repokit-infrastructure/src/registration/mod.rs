//! Dependency registration: a small typed service container plus the
//! wiring of mapping contexts and their repositories.

mod container;

pub use container::{ServiceCollection, ServiceLifetime, ServiceProvider, ServiceScope};

use repokit_domain::{entity_name, DomainError, Entity, Repository};
use std::any::type_name;
use std::sync::Arc;
use tracing::info;

use crate::persistence::{ContextRepository, Database, DbContext, MappingContext, Model};

impl ServiceCollection {
    /// Register `C` as a scoped service; each scope gets its own context over
    /// the shared `database`. The model of `C` is built and validated once.
    pub fn add_mapping_context<C, F>(
        &mut self,
        database: Arc<Database>,
        create: F,
    ) -> Result<&mut Self, DomainError>
    where
        C: MappingContext,
        F: Fn(DbContext) -> C + Send + Sync + 'static,
    {
        let model = Arc::new(Model::build::<C>()?);
        self.add_scoped(move |_| {
            let db = DbContext::with_model(Arc::clone(&database), Arc::clone(&model));
            Ok(Arc::new(create(db)))
        });
        info!(context = type_name::<C>(), "Registered scoped mapping context");
        Ok(self)
    }

    /// Register a scoped `Arc<dyn Repository<T>>` for every entity set declared
    /// by `C`. Each repository resolves `Arc<C>` from the same scope.
    pub fn add_repositories<C: MappingContext>(&mut self) -> Result<&mut Self, DomainError> {
        let model = Model::build::<C>()?;
        for set in model.sets() {
            set.register(self);
        }
        info!(
            context = type_name::<C>(),
            repositories = model.len(),
            "Registered repositories"
        );
        Ok(self)
    }
}

pub(crate) fn register_repository<C: MappingContext, T: Entity>(services: &mut ServiceCollection) {
    services.add_scoped(|scope| {
        let context = scope.get::<Arc<C>>()?;
        let repository: Arc<dyn Repository<T>> = Arc::new(ContextRepository::<C, T>::new(context)?);
        Ok(repository)
    });
    info!(
        entity = entity_name::<T>(),
        set = T::SET_NAME,
        "Registered scoped repository"
    );
}
