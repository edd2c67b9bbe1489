//! Single-commit mutation helpers.
//!
//! Every helper stages its changes, commits once and then clears the tracker,
//! so a context used only through these helpers never carries state from one
//! call into the next. A failed commit returns its error without clearing.

use repokit_domain::{entity_name, DomainError, Entity, Filter, QueryProvider, QuerySpec};
use tracing::debug;

use super::DbContext;

impl DbContext {
    pub async fn add_atomic<T: Entity>(&self, entity: T) -> Result<T, DomainError> {
        let id = self.set::<T>()?.add(&entity)?.id();
        self.save_changes().await?;
        let stored = self.tracked_entity(id)?;
        self.clear_changes();
        Ok(stored)
    }

    /// Insert a batch in one transaction; returns the stored entities in input order
    pub async fn add_range_atomic<T: Entity>(&self, entities: Vec<T>) -> Result<Vec<T>, DomainError> {
        let ids: Vec<_> = self
            .set::<T>()?
            .add_range(&entities)?
            .iter()
            .map(|entry| entry.id())
            .collect();
        self.save_changes().await?;
        let stored = ids
            .into_iter()
            .map(|id| self.tracked_entity(id))
            .collect::<Result<Vec<T>, _>>()?;
        self.clear_changes();
        Ok(stored)
    }

    pub async fn update_atomic<T: Entity>(&self, entity: &T) -> Result<(), DomainError> {
        self.set::<T>()?.update(entity)?;
        self.save_changes().await?;
        self.clear_changes();
        Ok(())
    }

    pub async fn update_range_atomic<T: Entity>(&self, entities: &[T]) -> Result<(), DomainError> {
        self.set::<T>()?.update_range(entities)?;
        self.save_changes().await?;
        self.clear_changes();
        Ok(())
    }

    /// Apply `action` to every match and commit once; returns the match count
    pub async fn update_where_atomic<T, F>(&self, filter: &Filter, mut action: F) -> Result<u64, DomainError>
    where
        T: Entity,
        F: FnMut(&mut T) + Send,
    {
        let matches = self
            .query_provider::<T>()?
            .fetch(&QuerySpec::new(filter.clone()))
            .await?;
        let count = matches.len() as u64;

        {
            let set = self.set::<T>()?;
            for entity in &matches {
                set.attach(entity)?.modify(&mut action)?;
            }
        }

        self.save_changes().await?;
        self.clear_changes();
        debug!(entity = entity_name::<T>(), count, "Updated matching entities");
        Ok(count)
    }

    /// Copy `replacement` onto the single entity matching `key_filter`
    pub async fn update_single_atomic<T: Entity>(
        &self,
        key_filter: &Filter,
        replacement: &T,
    ) -> Result<T, DomainError> {
        let mut matches = self
            .query_provider::<T>()?
            .fetch(&QuerySpec::new(key_filter.clone()).take(2))
            .await?;

        let existing = match matches.len() {
            0 => {
                return Err(DomainError::NotFound(format!(
                    "No {} matches {:?}",
                    entity_name::<T>(),
                    key_filter
                )))
            }
            1 => matches.remove(0),
            _ => {
                return Err(DomainError::MultipleMatches(format!(
                    "More than one {} matches {:?}",
                    entity_name::<T>(),
                    key_filter
                )))
            }
        };

        let id = {
            let entry = self.set::<T>()?.attach(&existing)?;
            entry.set_values(replacement)?;
            entry.id()
        };

        self.save_changes().await?;
        let stored = self.tracked_entity(id)?;
        self.clear_changes();
        Ok(stored)
    }

    pub async fn remove_atomic<T: Entity>(&self, entity: &T) -> Result<(), DomainError> {
        self.set::<T>()?.remove(entity)?;
        self.save_changes().await?;
        self.clear_changes();
        Ok(())
    }

    pub async fn remove_range_atomic<T: Entity>(&self, entities: &[T]) -> Result<(), DomainError> {
        self.set::<T>()?.remove_range(entities)?;
        self.save_changes().await?;
        self.clear_changes();
        Ok(())
    }

    /// Remove every match; returns how many were removed
    pub async fn remove_where_atomic<T: Entity>(&self, filter: &Filter) -> Result<u64, DomainError> {
        let matches = self
            .query_provider::<T>()?
            .fetch(&QuerySpec::new(filter.clone()))
            .await?;

        self.set::<T>()?.remove_range(&matches)?;
        self.save_changes().await?;
        self.clear_changes();
        Ok(matches.len() as u64)
    }

    /// Drop every tracked entry
    pub fn clear_changes(&self) {
        let mut tracker = self.tracker();
        if !tracker.is_empty() {
            debug!(entries = tracker.len(), "Clearing tracked changes");
        }
        tracker.clear();
    }
}
