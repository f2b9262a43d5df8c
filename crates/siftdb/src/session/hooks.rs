use crate::{model::EntityDescriptor, record::Record, types::Timestamp, value::Value};
use std::{fmt, rc::Rc};

/// Flush-time callback over one record about to be written.
pub type HookFn = Rc<dyn Fn(&EntityDescriptor, &mut Record, Timestamp)>;

///
/// Hooks
///
/// Callbacks the flush pipeline runs before each insert and update, at
/// most once per record per flush. The standard set stamps audit
/// timestamps from the database clock; registered hooks run after it in
/// registration order.
///

#[derive(Clone, Default)]
pub struct Hooks {
    before_insert: Vec<HookFn>,
    before_update: Vec<HookFn>,
}

impl Hooks {
    /// Audit stamping: created-at is set once on first insert, updated-at
    /// refreshes on insert and update.
    #[must_use]
    pub fn standard() -> Self {
        let mut hooks = Self::default();
        hooks.on_insert(|desc, record, now| {
            if let Some(slot) = desc.created_at_slot
                && record.get(slot).is_none_or(Value::is_null)
            {
                record.set_slot(slot, Value::Timestamp(now));
            }
            if let Some(slot) = desc.updated_at_slot {
                record.set_slot(slot, Value::Timestamp(now));
            }
        });
        hooks.on_update(|desc, record, now| {
            if let Some(slot) = desc.updated_at_slot {
                record.set_slot(slot, Value::Timestamp(now));
            }
        });

        hooks
    }

    pub fn on_insert(&mut self, hook: impl Fn(&EntityDescriptor, &mut Record, Timestamp) + 'static) {
        self.before_insert.push(Rc::new(hook));
    }

    pub fn on_update(&mut self, hook: impl Fn(&EntityDescriptor, &mut Record, Timestamp) + 'static) {
        self.before_update.push(Rc::new(hook));
    }

    pub(crate) fn run_insert(&self, desc: &EntityDescriptor, record: &mut Record, now: Timestamp) {
        for hook in &self.before_insert {
            hook(desc, record, now);
        }
    }

    pub(crate) fn run_update(&self, desc: &EntityDescriptor, record: &mut Record, now: Timestamp) {
        for hook in &self.before_update {
            hook(desc, record, now);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_insert", &self.before_insert.len())
            .field("before_update", &self.before_update.len())
            .finish()
    }
}
