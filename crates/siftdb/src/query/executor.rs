use crate::{
    Error,
    model::{EntityDescriptor, Registry},
    obs::sink::Span,
    query::{
        eval::{BoundPredicate, BoundRef, RelatedLookup, bind_ref},
        page::Direction,
        plan::QueryPlan,
        predicate::Params,
    },
    record::Record,
    store::DataStore,
    value::Key,
};
use std::{cmp::Ordering, collections::BTreeSet};

///
/// StoreLookup
/// Relation reads served straight from the live store.
///

pub(crate) struct StoreLookup<'a> {
    store: &'a DataStore,
}

impl<'a> StoreLookup<'a> {
    #[must_use]
    pub(crate) const fn new(store: &'a DataStore) -> Self {
        Self { store }
    }
}

impl RelatedLookup for StoreLookup<'_> {
    fn related(&self, entity: &str, key: &Key) -> Option<Record> {
        self.store.get(entity, key).cloned()
    }
}

///
/// Selection
///
/// Rows surviving the pipeline, in final order, with scan accounting.
/// `total` is the filtered row count before the page window and is only
/// computed when the plan pages.
///

#[derive(Debug)]
pub(crate) struct Selection {
    pub rows: Vec<(Key, Record)>,
    pub scanned: u64,
    pub total: Option<u64>,
}

///
/// Executor
///
/// The one concrete execution pipeline: bind, scan in primary-key
/// order, filter, de-duplicate, sort, window. Reads only; writes go
/// through the session so tracking and constraints stay in one place.
///

pub(crate) struct Executor<'a> {
    registry: &'a Registry,
    store: &'a DataStore,
}

impl<'a> Executor<'a> {
    #[must_use]
    pub(crate) const fn new(registry: &'a Registry, store: &'a DataStore) -> Self {
        Self { registry, store }
    }

    /// Run the row-producing pipeline for `Find` and `Delete` plans.
    pub(crate) fn select(&self, plan: &QueryPlan, params: &Params) -> Result<Selection, Error> {
        plan.check_shape()?;
        let desc = self.registry.entity(&plan.entity)?;
        check_fetch(desc, &plan.hints.fetch)?;
        let bound = BoundPredicate::bind(self.registry, desc, &plan.predicate, params)?;
        let order = self.bind_sort(desc, plan)?;

        let mut span = Span::new(&plan.entity, plan.subject);
        let lookup = StoreLookup::new(self.store);

        let mut scanned = 0u64;
        let mut rows: Vec<(Key, Record)> = Vec::new();
        for (key, record) in self.store.scan(&plan.entity) {
            scanned += 1;
            if bound.eval(record, &lookup) {
                rows.push((key.clone(), record.clone()));
            }
        }

        if plan.distinct {
            let mut seen = BTreeSet::new();
            rows.retain(|(_, record)| seen.insert(record.values().to_vec()));
        }

        if !order.is_empty() {
            rows.sort_by(|a, b| compare_rows(&order, &a.1, &b.1, &lookup));
        }

        let total = plan.page.as_ref().map(|_| rows.len() as u64);
        apply_window(&mut rows, plan);

        span.set_scanned(scanned);
        span.set_returned(rows.len() as u64);

        Ok(Selection {
            rows,
            scanned,
            total,
        })
    }

    /// Count matching rows without materialising them.
    pub(crate) fn count(&self, plan: &QueryPlan, params: &Params) -> Result<u64, Error> {
        plan.check_shape()?;
        let desc = self.registry.entity(&plan.entity)?;
        let bound = BoundPredicate::bind(self.registry, desc, &plan.predicate, params)?;

        let mut span = Span::new(&plan.entity, plan.subject);
        let lookup = StoreLookup::new(self.store);

        let mut scanned = 0u64;
        let mut count = 0u64;
        let mut seen = BTreeSet::new();
        for (_, record) in self.store.scan(&plan.entity) {
            scanned += 1;
            if !bound.eval(record, &lookup) {
                continue;
            }
            if plan.distinct {
                if seen.insert(record.values().to_vec()) {
                    count += 1;
                }
            } else {
                count += 1;
            }
        }

        span.set_scanned(scanned);
        span.set_returned(count);

        Ok(count)
    }

    /// Short-circuit on the first matching row.
    pub(crate) fn exists(&self, plan: &QueryPlan, params: &Params) -> Result<bool, Error> {
        plan.check_shape()?;
        let desc = self.registry.entity(&plan.entity)?;
        let bound = BoundPredicate::bind(self.registry, desc, &plan.predicate, params)?;

        let mut span = Span::new(&plan.entity, plan.subject);
        let lookup = StoreLookup::new(self.store);

        let mut scanned = 0u64;
        for (_, record) in self.store.scan(&plan.entity) {
            scanned += 1;
            if bound.eval(record, &lookup) {
                span.set_scanned(scanned);
                span.set_returned(1);

                return Ok(true);
            }
        }

        span.set_scanned(scanned);

        Ok(false)
    }

    /// Resolve plan order plus any page-request sort into bound keys.
    fn bind_sort(
        &self,
        desc: &EntityDescriptor,
        plan: &QueryPlan,
    ) -> Result<Vec<(BoundRef, Direction)>, Error> {
        let page_keys = plan.page.iter().flat_map(|req| req.sort.keys());
        let mut bound = Vec::new();
        for (field, direction) in plan.order.keys().iter().chain(page_keys) {
            let (bound_ref, _) = bind_ref(self.registry, desc, field)?;
            bound.push((bound_ref, *direction));
        }

        Ok(bound)
    }
}

/// Every fetch hint must name a declared relation.
fn check_fetch(desc: &EntityDescriptor, fetch: &[String]) -> Result<(), Error> {
    for relation in fetch {
        desc.relation(relation)?;
    }

    Ok(())
}

fn compare_rows(
    keys: &[(BoundRef, Direction)],
    a: &Record,
    b: &Record,
    lookup: &dyn RelatedLookup,
) -> Ordering {
    for (field, direction) in keys {
        let left = field.read(a, lookup);
        let right = field.read(b, lookup);
        let ord = match direction {
            Direction::Asc => left.cmp(&right),
            Direction::Desc => right.cmp(&left),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    Ordering::Equal
}

/// Page window when paging, otherwise plain offset/limit.
fn apply_window(rows: &mut Vec<(Key, Record)>, plan: &QueryPlan) {
    if let Some(req) = &plan.page {
        let start = usize::try_from(req.offset()).unwrap_or(usize::MAX);
        if start >= rows.len() {
            rows.clear();
        } else {
            rows.drain(..start);
            rows.truncate(req.size as usize);
        }
        return;
    }

    if let Some(offset) = plan.offset {
        let start = (offset as usize).min(rows.len());
        rows.drain(..start);
    }
    if let Some(limit) = plan.limit {
        rows.truncate(limit as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{EntityDescriptor, FieldKind},
        query::{page::PageRequest, page::Sort, plan::Subject, predicate::Predicate},
        store::TxLog,
        value::Value,
    };

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                EntityDescriptor::build("member")
                    .generated_id("id")
                    .field("username", FieldKind::Text)
                    .field("age", FieldKind::Int)
                    .finish()
                    .expect("member should build"),
            )
            .expect("member should register");
        registry
    }

    fn populated(registry: &Registry) -> DataStore {
        let desc = registry.entity("member").expect("member should resolve");
        let mut store = DataStore::new(registry);
        let mut tx = TxLog::default();

        for (id, name, age) in [
            (1u64, "ann", 10),
            (2, "bob", 19),
            (3, "cat", 20),
            (4, "dan", 21),
            (5, "eve", 40),
        ] {
            let record = Record::build(desc)
                .set("id", id)
                .set("username", name)
                .set("age", age)
                .build()
                .expect("member should build");
            store
                .insert(desc, record, &mut tx)
                .expect("insert should succeed");
        }

        store
    }

    fn ages(selection: &Selection) -> Vec<i64> {
        selection
            .rows
            .iter()
            .map(|(_, record)| record.get(2).and_then(Value::as_int).unwrap_or_default())
            .collect()
    }

    #[test]
    fn filter_runs_before_order_and_window() {
        let registry = registry();
        let store = populated(&registry);
        let executor = Executor::new(&registry, &store);

        let mut plan = QueryPlan::new("member", Subject::Find);
        plan.predicate = Predicate::gte("age", 20);
        plan.order = Sort::by("age", Direction::Desc);
        plan.limit = Some(2);

        let selection = executor
            .select(&plan, &Params::none())
            .expect("select should succeed");
        assert_eq!(selection.scanned, 5, "full scan in key order");
        assert_eq!(ages(&selection), [40, 21], "filtered, sorted, limited");
    }

    #[test]
    fn page_window_reports_pre_window_total() {
        let registry = registry();
        let store = populated(&registry);
        let executor = Executor::new(&registry, &store);

        let mut plan = QueryPlan::new("member", Subject::Find);
        plan.page = Some(PageRequest::sorted(1, 2, Sort::by("age", Direction::Asc)));

        let selection = executor
            .select(&plan, &Params::none())
            .expect("select should succeed");
        assert_eq!(selection.total, Some(5));
        assert_eq!(ages(&selection), [20, 21], "second page of two");
    }

    #[test]
    fn ties_keep_primary_key_order() {
        let registry = registry();
        let desc = registry.entity("member").expect("member should resolve");
        let mut store = populated(&registry);
        let mut tx = TxLog::default();
        let record = Record::build(desc)
            .set("id", 6u64)
            .set("username", "fin")
            .set("age", 20)
            .build()
            .expect("member should build");
        store
            .insert(desc, record, &mut tx)
            .expect("insert should succeed");

        let mut plan = QueryPlan::new("member", Subject::Find);
        plan.order = Sort::by("age", Direction::Asc);

        let selection = Executor::new(&registry, &store)
            .select(&plan, &Params::none())
            .expect("select should succeed");
        let keys: Vec<&Key> = selection.rows.iter().map(|(key, _)| key).collect();
        assert_eq!(
            keys,
            [
                &Key::Uint(1),
                &Key::Uint(2),
                &Key::Uint(3),
                &Key::Uint(6),
                &Key::Uint(4),
                &Key::Uint(5)
            ],
            "age ties (20) stay in key order"
        );
    }

    #[test]
    fn count_is_post_distinct() {
        let registry = registry();
        let store = populated(&registry);
        let executor = Executor::new(&registry, &store);

        let mut plan = QueryPlan::new("member", Subject::Count);
        plan.predicate = Predicate::gte("age", 20);

        let count = executor
            .count(&plan, &Params::none())
            .expect("count should succeed");
        assert_eq!(count, 3);
    }

    #[test]
    fn exists_stops_at_the_first_match() {
        let registry = registry();
        let store = populated(&registry);
        let executor = Executor::new(&registry, &store);

        let mut plan = QueryPlan::new("member", Subject::Exists);
        plan.predicate = Predicate::eq("username", "ann");
        assert!(
            executor
                .exists(&plan, &Params::none())
                .expect("exists should succeed")
        );

        plan.predicate = Predicate::eq("username", "nobody");
        assert!(
            !executor
                .exists(&plan, &Params::none())
                .expect("exists should succeed")
        );
    }

    #[test]
    fn unknown_fetch_hint_is_rejected() {
        let registry = registry();
        let store = populated(&registry);
        let executor = Executor::new(&registry, &store);

        let mut plan = QueryPlan::new("member", Subject::Find);
        plan.hints.fetch.push("squad".to_string());

        let err = executor
            .select(&plan, &Params::none())
            .expect_err("unknown relation should fail");
        assert!(matches!(err, Error::Registry(_)));
    }
}
