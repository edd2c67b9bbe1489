use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use repokit_domain::{
    entity_name, DomainError, Entity, EntityAction, EntityStream, Filter, QueryProvider,
    QuerySpec, Queryable, Repository,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::MappingContext;

/// [`Repository`] over the entity set of `T` in the mapping context `C`.
///
/// Reads go straight to the store without tracking; mutations use the
/// single-commit helpers of the context's [`super::DbContext`].
pub struct ContextRepository<C: MappingContext, T: Entity> {
    context: Arc<C>,
    provider: Arc<dyn QueryProvider<T>>,
}

impl<C: MappingContext, T: Entity> ContextRepository<C, T> {
    /// Fails when `T` is not declared by `C`
    pub fn new(context: Arc<C>) -> Result<Self, DomainError> {
        let provider: Arc<dyn QueryProvider<T>> = context.db().query_provider::<T>()?;
        Ok(Self { context, provider })
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    fn cancelled(operation: &str) -> DomainError {
        DomainError::Cancelled(format!("{} of {} cancelled", operation, entity_name::<T>()))
    }
}

#[async_trait]
impl<C: MappingContext, T: Entity> Repository<T> for ContextRepository<C, T> {
    fn as_queryable(&self) -> Queryable<T> {
        Queryable::new(Arc::clone(&self.provider))
    }

    async fn count(&self) -> Result<u64, DomainError> {
        self.provider.count(&Filter::All).await
    }

    async fn count_where(&self, filter: &Filter) -> Result<u64, DomainError> {
        self.provider.count(filter).await
    }

    async fn any(&self, filter: &Filter) -> Result<bool, DomainError> {
        self.provider.exists(filter).await
    }

    async fn all(&self, filter: &Filter) -> Result<bool, DomainError> {
        let violated = self.provider.exists(&filter.clone().negate()).await?;
        Ok(!violated)
    }

    async fn find(&self, filter: &Filter) -> Result<T, DomainError> {
        let spec = QuerySpec::new(filter.clone()).take(1);
        self.provider
            .fetch(&spec)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                DomainError::NotFound(format!("No {} matches {:?}", entity_name::<T>(), filter))
            })
    }

    fn get(&self, query: QuerySpec<T>, cancel: CancellationToken) -> EntityStream<T> {
        let provider = Arc::clone(&self.provider);
        stream::once(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Self::cancelled("Query")),
                result = provider.fetch(&query) => result,
            }
        })
        .flat_map(|result| match result {
            Ok(items) => stream::iter(items.into_iter().map(Ok)).boxed(),
            Err(err) => stream::iter(std::iter::once(Err(err))).boxed(),
        })
        .boxed()
    }

    async fn add(&self, entity: T) -> Result<T, DomainError> {
        self.context.db().add_atomic(entity).await
    }

    async fn add_range(&self, entities: Vec<T>) -> Result<Vec<T>, DomainError> {
        self.context.db().add_range_atomic(entities).await
    }

    async fn remove(&self, entity: &T) -> Result<(), DomainError> {
        self.context.db().remove_atomic(entity).await
    }

    async fn remove_range(&self, entities: &[T]) -> Result<(), DomainError> {
        self.context.db().remove_range_atomic(entities).await
    }

    async fn remove_where(&self, filter: &Filter) -> Result<u64, DomainError> {
        self.context.db().remove_where_atomic::<T>(filter).await
    }

    async fn update(&self, entity: &T) -> Result<(), DomainError> {
        self.context.db().update_atomic(entity).await
    }

    async fn update_range(&self, entities: &[T]) -> Result<(), DomainError> {
        self.context.db().update_range_atomic(entities).await
    }

    async fn update_matching(
        &self,
        key_filter: &Filter,
        replacement: &T,
    ) -> Result<T, DomainError> {
        self.context
            .db()
            .update_single_atomic(key_filter, replacement)
            .await
    }

    async fn update_where(
        &self,
        filter: &Filter,
        action: EntityAction<'_, T>,
    ) -> Result<u64, DomainError> {
        self.context.db().update_where_atomic(filter, action).await
    }

    async fn upsert(
        &self,
        entity: T,
        match_on: &Filter,
        update_action: EntityAction<'_, T>,
        cancel: CancellationToken,
    ) -> Result<T, DomainError> {
        if cancel.is_cancelled() {
            return Err(Self::cancelled("Upsert"));
        }

        let spec = QuerySpec::new(match_on.clone()).take(1);
        let matches = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Self::cancelled("Upsert")),
            result = self.provider.fetch(&spec) => result?,
        };
        let existing = matches.into_iter().next();

        let db = self.context.db();
        let id = {
            let set = db.set::<T>()?;
            match existing {
                None => set.add(&entity)?.id(),
                Some(current) => {
                    let entry = set.attach(&current)?;
                    entry.set_values(&entity)?;
                    entry.modify(|stored| update_action(stored))?;
                    entry.id()
                }
            }
        };

        db.save_changes_cancellable(&cancel).await?;
        let stored = db.tracked_entity(id)?;
        db.clear_changes();
        debug!(entity = entity_name::<T>(), "Upserted entity");
        Ok(stored)
    }

    async fn save_changes(&self, cancel: CancellationToken) -> Result<u64, DomainError> {
        self.context.db().save_changes_cancellable(&cancel).await
    }

    async fn discard_changes(&self, cancel: CancellationToken) -> Result<(), DomainError> {
        if cancel.is_cancelled() {
            return Err(Self::cancelled("Discard changes"));
        }
        self.context.db().clear_changes();
        Ok(())
    }
}
