use crate::{
    Error,
    model::{EntityDescriptor, Registry},
    record::{Record, RecordError},
    store::{StoreError, tx::TxLog},
    value::{Key, Value},
};
use std::collections::BTreeMap;

///
/// EntityStore
///
/// Rows for one entity in primary-key order, plus the id sequence and
/// one value-to-key map per unique field.
///

#[derive(Debug, Default)]
struct EntityStore {
    rows: BTreeMap<Key, Record>,
    unique: BTreeMap<usize, BTreeMap<Value, Key>>,
    next_id: u64,
}

impl EntityStore {
    fn index_insert(&mut self, desc: &EntityDescriptor, key: &Key, record: &Record) {
        for slot in desc.unique_slots() {
            if let Some(value) = record.get(slot)
                && !value.is_null()
            {
                self.unique
                    .entry(slot)
                    .or_default()
                    .insert(value.clone(), key.clone());
            }
        }
    }

    fn index_remove(&mut self, desc: &EntityDescriptor, record: &Record) {
        for slot in desc.unique_slots() {
            if let Some(value) = record.get(slot)
                && !value.is_null()
                && let Some(map) = self.unique.get_mut(&slot)
            {
                map.remove(value);
            }
        }
    }
}

///
/// DataStore
///
/// The shared row storage behind a database handle. All mutation
/// primitives validate first, then log the prior state, then write, so
/// the undo log can restore exactly what was there.
///

#[derive(Debug, Default)]
pub struct DataStore {
    entities: BTreeMap<String, EntityStore>,
}

impl DataStore {
    #[must_use]
    pub fn new(registry: &Registry) -> Self {
        let entities = registry
            .entities()
            .map(|desc| (desc.name.clone(), EntityStore::default()))
            .collect();

        Self { entities }
    }

    #[must_use]
    pub fn get(&self, entity: &str, key: &Key) -> Option<&Record> {
        self.entities.get(entity)?.rows.get(key)
    }

    #[must_use]
    pub fn contains(&self, entity: &str, key: &Key) -> bool {
        self.get(entity, key).is_some()
    }

    /// All rows of an entity in primary-key order.
    pub fn scan(&self, entity: &str) -> impl Iterator<Item = (&Key, &Record)> {
        self.entities
            .get(entity)
            .into_iter()
            .flat_map(|store| store.rows.iter())
    }

    #[must_use]
    pub fn row_count(&self, entity: &str) -> usize {
        self.entities.get(entity).map_or(0, |store| store.rows.len())
    }

    /// Next value of the entity's id sequence. Sequences only move
    /// forward; rollback does not return consumed ids.
    pub fn next_id(&mut self, entity: &str) -> u64 {
        let store = self.entities.entry(entity.to_string()).or_default();
        store.next_id += 1;
        store.next_id
    }

    /// Insert a fully stamped record.
    pub fn insert(
        &mut self,
        desc: &EntityDescriptor,
        record: Record,
        tx: &mut TxLog,
    ) -> Result<Key, Error> {
        let key = record.key(desc)?;
        validate_row(desc, &record)?;

        if self.contains(&desc.name, &key) {
            return Err(StoreError::KeyExists {
                entity: desc.name.clone(),
                key,
            }
            .into());
        }
        self.check_unique(desc, &key, &record)?;
        self.check_foreign_keys(desc, &record)?;

        tx.log(&desc.name, key.clone(), None);
        let store = self.entities.entry(desc.name.clone()).or_default();
        store.index_insert(desc, &key, &record);
        store.rows.insert(key.clone(), record);

        Ok(key)
    }

    /// Overwrite an existing record under its key.
    pub fn update(
        &mut self,
        desc: &EntityDescriptor,
        record: Record,
        tx: &mut TxLog,
    ) -> Result<(), Error> {
        let key = record.key(desc)?;
        validate_row(desc, &record)?;

        let Some(prior) = self.get(&desc.name, &key).cloned() else {
            return Err(StoreError::NotFound {
                entity: desc.name.clone(),
                key,
            }
            .into());
        };
        self.check_unique(desc, &key, &record)?;
        self.check_foreign_keys(desc, &record)?;

        tx.log(&desc.name, key.clone(), Some(prior.clone()));
        let store = self.entities.entry(desc.name.clone()).or_default();
        store.index_remove(desc, &prior);
        store.index_insert(desc, &key, &record);
        store.rows.insert(key, record);

        Ok(())
    }

    /// Remove a record, refusing while other rows still reference it.
    pub fn delete(
        &mut self,
        registry: &Registry,
        desc: &EntityDescriptor,
        key: &Key,
        tx: &mut TxLog,
    ) -> Result<Record, Error> {
        let Some(prior) = self.get(&desc.name, key).cloned() else {
            return Err(StoreError::NotFound {
                entity: desc.name.clone(),
                key: key.clone(),
            }
            .into());
        };
        self.check_referrers(registry, desc, key)?;

        tx.log(&desc.name, key.clone(), Some(prior.clone()));
        let store = self.entities.entry(desc.name.clone()).or_default();
        store.index_remove(desc, &prior);
        store.rows.remove(key);

        Ok(prior)
    }

    /// Put a key back to a logged prior state. Undo path only; skips
    /// constraint checks since it restores a state that already held.
    pub(crate) fn restore(&mut self, desc: &EntityDescriptor, key: &Key, prior: Option<Record>) {
        let store = self.entities.entry(desc.name.clone()).or_default();
        if let Some(current) = store.rows.get(key) {
            let current = current.clone();
            store.index_remove(desc, &current);
        }

        match prior {
            Some(record) => {
                store.index_insert(desc, key, &record);
                store.rows.insert(key.clone(), record);
            }
            None => {
                store.rows.remove(key);
            }
        }
    }

    fn check_unique(
        &self,
        desc: &EntityDescriptor,
        key: &Key,
        record: &Record,
    ) -> Result<(), Error> {
        let Some(store) = self.entities.get(&desc.name) else {
            return Ok(());
        };

        for slot in desc.unique_slots() {
            let Some(value) = record.get(slot) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if let Some(holder) = store.unique.get(&slot).and_then(|map| map.get(value))
                && holder != key
            {
                return Err(StoreError::UniqueViolation {
                    entity: desc.name.clone(),
                    field: desc.fields[slot].name.clone(),
                    value: value.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    fn check_foreign_keys(&self, desc: &EntityDescriptor, record: &Record) -> Result<(), Error> {
        for rel in &desc.relations {
            let fk_slot = desc.slot(&rel.fk_field)?;
            let Some(value) = record.get(fk_slot) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let Ok(fk_key) = Key::try_from(value.clone()) else {
                continue;
            };
            if !self.contains(&rel.target, &fk_key) {
                return Err(StoreError::ForeignKeyMissing {
                    entity: desc.name.clone(),
                    field: rel.fk_field.clone(),
                    target: rel.target.clone(),
                    key: fk_key,
                }
                .into());
            }
        }

        Ok(())
    }

    fn check_referrers(
        &self,
        registry: &Registry,
        desc: &EntityDescriptor,
        key: &Key,
    ) -> Result<(), Error> {
        let id: Value = key.clone().into();

        for other in registry.entities() {
            for rel in &other.relations {
                if rel.target != desc.name {
                    continue;
                }
                let fk_slot = other.slot(&rel.fk_field)?;
                let referenced = self
                    .scan(&other.name)
                    .any(|(_, row)| row.get(fk_slot) == Some(&id));
                if referenced {
                    return Err(StoreError::ForeignKeyRestrict {
                        entity: desc.name.clone(),
                        key: key.clone(),
                        referrer: other.name.clone(),
                        field: rel.fk_field.clone(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}

/// Kind and nullability checks over every slot before a write.
fn validate_row(desc: &EntityDescriptor, record: &Record) -> Result<(), Error> {
    for (slot, spec) in desc.fields.iter().enumerate() {
        let value = record.get(slot).unwrap_or(&Value::Null);
        if spec.accepts(value) {
            continue;
        }

        let err = if value.is_null() {
            RecordError::NotNullable {
                entity: desc.name.clone(),
                field: spec.name.clone(),
            }
        } else {
            RecordError::KindMismatch {
                entity: desc.name.clone(),
                field: spec.name.clone(),
                expected: spec.kind,
                found: value.kind_name(),
            }
        };

        return Err(err.into());
    }

    Ok(())
}
