use crate::{model::Registry, record::Record, store::data::DataStore, value::Key};

///
/// TxEntry
/// Prior state of one key, captured before the write that changed it.
///

#[derive(Clone, Debug)]
pub struct TxEntry {
    entity: String,
    key: Key,
    prior: Option<Record>,
}

///
/// TxLog
///
/// Undo log for one session. Commit discards the log; rollback replays
/// it newest-first so each key lands back on its pre-session state even
/// when it was written more than once.
///

#[derive(Debug, Default)]
pub struct TxLog {
    entries: Vec<TxEntry>,
}

impl TxLog {
    pub fn log(&mut self, entity: &str, key: Key, prior: Option<Record>) {
        self.entries.push(TxEntry {
            entity: entity.to_string(),
            key,
            prior,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make the logged writes permanent.
    pub fn commit(&mut self) {
        self.entries.clear();
    }

    /// Restore every logged prior state, newest first.
    pub fn rollback(&mut self, registry: &Registry, store: &mut DataStore) {
        for entry in self.entries.drain(..).rev() {
            let Ok(desc) = registry.entity(&entry.entity) else {
                continue;
            };
            store.restore(desc, &entry.key, entry.prior);
        }
    }
}
