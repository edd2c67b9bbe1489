use repokit_domain::{entity_name, DomainError, Entity, Queryable};
use serde_json::Value;
use std::marker::PhantomData;

use super::change_tracker::{EntityState, EntryId};
use super::model::EntitySetDescriptor;
use super::{document, DbContext};

/// Staging view of one entity set in a [`DbContext`]
pub struct EntitySet<'a, T: Entity> {
    context: &'a DbContext,
    descriptor: &'a EntitySetDescriptor,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, T: Entity> EntitySet<'a, T> {
    pub(crate) fn new(context: &'a DbContext, descriptor: &'a EntitySetDescriptor) -> Self {
        Self {
            context,
            descriptor,
            _entity: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.set_name()
    }

    fn track(&self, entity: &T, state: EntityState) -> Result<Entry<'a, T>, DomainError> {
        self.track_values(document::to_document(entity)?, state)
    }

    fn track_values(&self, values: Value, state: EntityState) -> Result<Entry<'a, T>, DomainError> {
        let id = self.context.tracker().track(
            self.descriptor.set_name(),
            self.descriptor.key_field(),
            values,
            state,
        )?;
        Ok(self.entry(id))
    }

    /// Stage an insert.
    ///
    /// A missing, null or zero key is generated by the store as an integer,
    /// so the key field must be able to hold one.
    pub fn add(&self, entity: &T) -> Result<Entry<'a, T>, DomainError> {
        let key_field = self.descriptor.key_field();
        let values = document::to_document(entity)?;
        if document::key_of(&values, key_field).is_none() {
            let mut generated = values.clone();
            document::set_field(&mut generated, key_field, Value::from(1));
            if serde_json::from_value::<T>(generated).is_err() {
                return Err(DomainError::InvalidInput(format!(
                    "{} has no key and its '{}' field cannot hold a generated integer key",
                    entity_name::<T>(),
                    key_field
                )));
            }
        }
        self.track_values(values, EntityState::Added)
    }

    pub fn add_range(&self, entities: &[T]) -> Result<Vec<Entry<'a, T>>, DomainError> {
        entities.iter().map(|entity| self.add(entity)).collect()
    }

    /// Stage a whole-document replace of the stored entity with the same key
    pub fn update(&self, entity: &T) -> Result<Entry<'a, T>, DomainError> {
        self.track(entity, EntityState::Modified)
    }

    pub fn update_range(&self, entities: &[T]) -> Result<Vec<Entry<'a, T>>, DomainError> {
        entities.iter().map(|entity| self.update(entity)).collect()
    }

    pub fn remove(&self, entity: &T) -> Result<Entry<'a, T>, DomainError> {
        self.track(entity, EntityState::Deleted)
    }

    pub fn remove_range(&self, entities: &[T]) -> Result<Vec<Entry<'a, T>>, DomainError> {
        entities.iter().map(|entity| self.remove(entity)).collect()
    }

    /// Track a stored entity as unchanged; an already tracked key returns
    /// the existing entry
    pub fn attach(&self, entity: &T) -> Result<Entry<'a, T>, DomainError> {
        self.track(entity, EntityState::Unchanged)
    }

    pub fn entry(&self, id: EntryId) -> Entry<'a, T> {
        Entry {
            context: self.context,
            id,
            _entity: PhantomData,
        }
    }

    /// No-tracking query over this set
    pub fn query(&self) -> Result<Queryable<T>, DomainError> {
        self.context.query::<T>()
    }

    /// Tracked entities of this set not staged for deletion
    pub fn local(&self) -> Result<Vec<T>, DomainError> {
        let values: Vec<_> = self
            .context
            .tracker()
            .local(self.descriptor.set_name())
            .into_iter()
            .map(|(_, values)| values.clone())
            .collect();
        values.into_iter().map(document::from_document).collect()
    }
}

/// Handle to one tracked entity
pub struct Entry<'a, T: Entity> {
    context: &'a DbContext,
    id: EntryId,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, T: Entity> Entry<'a, T> {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn state(&self) -> EntityState {
        self.context.tracker().state(self.id)
    }

    pub fn set_state(&self, state: EntityState) -> Result<(), DomainError> {
        self.context.tracker().set_state(self.id, state)
    }

    /// Current tracked values
    pub fn entity(&self) -> Result<T, DomainError> {
        self.context.tracked_entity(self.id)
    }

    /// Copy `source`'s values onto the tracked entity, keeping its key
    pub fn set_values(&self, source: &T) -> Result<(), DomainError> {
        let values = document::to_document(source)?;
        self.context.tracker().set_values(self.id, values)
    }

    /// Mutate the tracked entity in place
    pub fn modify(&self, action: impl FnOnce(&mut T)) -> Result<(), DomainError> {
        let mut entity = self.entity()?;
        action(&mut entity);
        self.set_values(&entity)
    }
}
