//! In-memory ledger of staged entity changes.
//!
//! Entries keep the serialized document of an entity plus its state. The
//! tracker resolves identity per (entity set, key): staging the same key
//! twice folds into one entry instead of producing two writes.

use std::collections::{BTreeMap, HashMap};

use repokit_domain::DomainError;
use serde_json::Value;

use super::document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Not tracked
    Detached,
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl EntityState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Deleted)
    }
}

#[derive(Debug, Clone)]
struct TrackedEntry {
    set: &'static str,
    key_field: &'static str,
    key: Option<String>,
    state: EntityState,
    values: Value,
}

/// Snapshot of one entry that a commit has to write
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub id: EntryId,
    pub set: &'static str,
    pub key_field: &'static str,
    pub key: Option<String>,
    pub state: EntityState,
    pub values: Value,
}

#[derive(Debug, Default)]
pub struct ChangeTracker {
    next_id: u64,
    entries: BTreeMap<EntryId, TrackedEntry>,
    identities: HashMap<(&'static str, String), EntryId>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `values` in `state`, folding into an existing entry for the same key.
    pub fn track(
        &mut self,
        set: &'static str,
        key_field: &'static str,
        values: Value,
        state: EntityState,
    ) -> Result<EntryId, DomainError> {
        if state == EntityState::Detached {
            return Err(DomainError::InvalidInput(
                "Cannot track an entity in the Detached state".to_string(),
            ));
        }

        let key = document::key_of(&values, key_field);
        let Some(key) = key else {
            if state != EntityState::Added {
                return Err(DomainError::InvalidInput(format!(
                    "Entity in '{}' has no '{}' value; only new entities may omit their key",
                    set, key_field
                )));
            }
            return Ok(self.insert(set, key_field, None, state, values));
        };

        let Some(&id) = self.identities.get(&(set, key.clone())) else {
            return Ok(self.insert(set, key_field, Some(key), state, values));
        };

        let Some(existing) = self.entries.get_mut(&id) else {
            return Ok(self.insert(set, key_field, Some(key), state, values));
        };

        match (existing.state, state) {
            // attaching an already tracked key hands back the tracked entry
            (_, EntityState::Unchanged) => {}
            (EntityState::Added, EntityState::Modified) => existing.values = values,
            (EntityState::Added, EntityState::Deleted) => {
                self.remove(id);
            }
            (EntityState::Deleted, EntityState::Added) => {
                existing.values = values;
                existing.state = EntityState::Modified;
            }
            (_, EntityState::Added) => {
                return Err(DomainError::InvalidInput(format!(
                    "An entity with key {} is already tracked in '{}'",
                    key, set
                )));
            }
            (_, new_state) => {
                existing.values = values;
                existing.state = new_state;
            }
        }

        Ok(id)
    }

    fn insert(
        &mut self,
        set: &'static str,
        key_field: &'static str,
        key: Option<String>,
        state: EntityState,
        values: Value,
    ) -> EntryId {
        self.next_id += 1;
        let id = EntryId(self.next_id);
        if let Some(key) = &key {
            self.identities.insert((set, key.clone()), id);
        }
        self.entries.insert(
            id,
            TrackedEntry {
                set,
                key_field,
                key,
                state,
                values,
            },
        );
        id
    }

    fn remove(&mut self, id: EntryId) {
        if let Some(entry) = self.entries.remove(&id) {
            if let Some(key) = entry.key {
                self.identities.remove(&(entry.set, key));
            }
        }
    }

    pub fn state(&self, id: EntryId) -> EntityState {
        self.entries
            .get(&id)
            .map(|entry| entry.state)
            .unwrap_or(EntityState::Detached)
    }

    pub fn set_state(&mut self, id: EntryId, state: EntityState) -> Result<(), DomainError> {
        let entry = self.entries.get_mut(&id).ok_or_else(|| {
            DomainError::InvalidInput(format!("Entry {} is not tracked", id.value()))
        })?;

        match state {
            EntityState::Detached => self.remove(id),
            EntityState::Added => entry.state = state,
            _ if entry.key.is_none() => {
                return Err(DomainError::InvalidInput(format!(
                    "Entry {} has no stored key yet and can only be Added or Detached",
                    id.value()
                )));
            }
            _ => entry.state = state,
        }
        Ok(())
    }

    pub fn values(&self, id: EntryId) -> Option<&Value> {
        self.entries.get(&id).map(|entry| &entry.values)
    }

    /// Replace an entry's document; the tracked key is kept and an unchanged
    /// entry becomes modified.
    pub fn set_values(&mut self, id: EntryId, mut values: Value) -> Result<(), DomainError> {
        let entry = self.entries.get_mut(&id).ok_or_else(|| {
            DomainError::InvalidInput(format!("Entry {} is not tracked", id.value()))
        })?;

        if let Some(key) = document::field(&entry.values, entry.key_field).cloned() {
            document::set_field(&mut values, entry.key_field, key);
        }

        entry.values = values;
        if entry.state == EntityState::Unchanged {
            entry.state = EntityState::Modified;
        }
        Ok(())
    }

    /// Tracked documents of one set that are not staged for deletion
    pub fn local(&self, set: &str) -> Vec<(EntryId, &Value)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.set == set && entry.state != EntityState::Deleted)
            .map(|(id, entry)| (*id, &entry.values))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        self.entries.values().any(|entry| entry.state.is_pending())
    }

    /// Pending changes in staging order
    pub fn pending(&self) -> Vec<PendingChange> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.state.is_pending())
            .map(|(id, entry)| PendingChange {
                id: *id,
                set: entry.set,
                key_field: entry.key_field,
                key: entry.key.clone(),
                state: entry.state,
                values: entry.values.clone(),
            })
            .collect()
    }

    /// Mark committed changes as persisted.
    ///
    /// `stored` carries the written documents of inserted entries, including
    /// store-generated keys. Deleted entries stop being tracked; everything
    /// else becomes unchanged.
    pub fn accept_changes(&mut self, stored: Vec<(EntryId, Value)>) {
        let mut stored: HashMap<EntryId, Value> = stored.into_iter().collect();
        let ids: Vec<EntryId> = self.entries.keys().copied().collect();

        for id in ids {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            match entry.state {
                EntityState::Deleted => self.remove(id),
                EntityState::Added | EntityState::Modified => {
                    if let Some(values) = stored.remove(&id) {
                        entry.values = values;
                    }
                    entry.state = EntityState::Unchanged;
                    if entry.key.is_none() {
                        let key = document::key_of(&entry.values, entry.key_field);
                        if let Some(key) = &key {
                            self.identities.insert((entry.set, key.clone()), id);
                        }
                        entry.key = key;
                    }
                }
                EntityState::Unchanged | EntityState::Detached => {}
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.identities.clear();
    }
}
