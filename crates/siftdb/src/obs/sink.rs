use crate::query::{BulkOp, Subject};
use std::cell::RefCell;

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<*const dyn MetricsSink>> = const { RefCell::new(None) };
}

///
/// MetricsEvent
///
/// One observable step of the engine. Events borrow entity names from
/// the caller and must be consumed synchronously by the sink.
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    ExecStart {
        entity: &'a str,
        subject: Subject,
    },
    ExecFinish {
        entity: &'a str,
        subject: Subject,
        rows_scanned: u64,
        rows_returned: u64,
    },
    FlushStats {
        inserts: u64,
        updates: u64,
        deletes: u64,
    },
    LockWait {
        entity: &'a str,
        acquired: bool,
    },
    BulkApplied {
        entity: &'a str,
        op: BulkOp,
        affected: u64,
        invalidated: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

///
/// NullSink
/// The default sink; drops every event.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record(&self, _: MetricsEvent<'_>) {}
}

pub(crate) fn record(event: MetricsEvent<'_>) {
    let override_ptr = SINK_OVERRIDE.with(|cell| *cell.borrow());
    if let Some(ptr) = override_ptr {
        // SAFETY:
        // - `ptr` came from a live `&dyn MetricsSink` installed by
        //   `with_metrics_sink`, which restores the previous slot on every
        //   exit path, including unwind, so the pointee outlives this call.
        // - Only a shared reference is materialized and it is not stored
        //   beyond the synchronous `record` call.
        unsafe { (&*ptr).record(event) };
    } else {
        NullSink.record(event);
    }
}

/// Run a closure with a temporary metrics sink override.
pub fn with_metrics_sink<T>(sink: &dyn MetricsSink, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<*const dyn MetricsSink>);

    impl Drop for Guard {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = self.0;
            });
        }
    }

    // SAFETY:
    // - The lifetime is erased to a raw pointer, but the pointer is only
    //   dereferenced inside `record` while this frame is alive; `Guard`
    //   restores the previous slot on normal return and on unwind.
    // - Shared access only; no mutable alias is introduced.
    let sink_ptr = unsafe { std::mem::transmute::<&dyn MetricsSink, *const dyn MetricsSink>(sink) };
    let prev = SINK_OVERRIDE.with(|cell| {
        let mut slot = cell.borrow_mut();
        slot.replace(sink_ptr)
    });
    let _guard = Guard(prev);

    f()
}

///
/// Span
/// RAII guard emitting start/finish for one executor run, so finish
/// accounting happens even on unwind.
///

pub(crate) struct Span {
    entity: String,
    subject: Subject,
    scanned: u64,
    returned: u64,
}

impl Span {
    #[must_use]
    pub(crate) fn new(entity: &str, subject: Subject) -> Self {
        record(MetricsEvent::ExecStart { entity, subject });

        Self {
            entity: entity.to_string(),
            subject,
            scanned: 0,
            returned: 0,
        }
    }

    pub(crate) const fn set_scanned(&mut self, rows: u64) {
        self.scanned = rows;
    }

    pub(crate) const fn set_returned(&mut self, rows: u64) {
        self.returned = rows;
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        record(MetricsEvent::ExecFinish {
            entity: &self.entity,
            subject: self.subject,
            rows_scanned: self.scanned,
            rows_returned: self.returned,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink<'a> {
        calls: &'a AtomicUsize,
    }

    impl MetricsSink for CountingSink<'_> {
        fn record(&self, _: MetricsEvent<'_>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn override_routes_and_restores_nested_sinks() {
        let outer_calls = AtomicUsize::new(0);
        let inner_calls = AtomicUsize::new(0);
        let outer = CountingSink {
            calls: &outer_calls,
        };
        let inner = CountingSink {
            calls: &inner_calls,
        };

        record(MetricsEvent::FlushStats {
            inserts: 0,
            updates: 0,
            deletes: 0,
        });
        assert_eq!(outer_calls.load(Ordering::SeqCst), 0, "no override yet");

        with_metrics_sink(&outer, || {
            record(MetricsEvent::FlushStats {
                inserts: 1,
                updates: 0,
                deletes: 0,
            });
            with_metrics_sink(&inner, || {
                record(MetricsEvent::FlushStats {
                    inserts: 2,
                    updates: 0,
                    deletes: 0,
                });
            });
            record(MetricsEvent::FlushStats {
                inserts: 3,
                updates: 0,
                deletes: 0,
            });
        });

        assert_eq!(outer_calls.load(Ordering::SeqCst), 2);
        assert_eq!(inner_calls.load(Ordering::SeqCst), 1);
        SINK_OVERRIDE.with(|cell| assert!(cell.borrow().is_none()));
    }

    #[test]
    fn override_is_restored_on_panic() {
        let calls = AtomicUsize::new(0);
        let sink = CountingSink { calls: &calls };

        let panicked = catch_unwind(AssertUnwindSafe(|| {
            with_metrics_sink(&sink, || {
                record(MetricsEvent::LockWait {
                    entity: "member",
                    acquired: false,
                });
                panic!("intentional panic for guard test");
            });
        }))
        .is_err();
        assert!(panicked);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        SINK_OVERRIDE.with(|cell| assert!(cell.borrow().is_none()));
    }

    #[test]
    fn span_emits_start_and_finish() {
        let calls = AtomicUsize::new(0);
        let sink = CountingSink { calls: &calls };

        with_metrics_sink(&sink, || {
            let mut span = Span::new("member", Subject::Find);
            span.set_scanned(5);
            span.set_returned(2);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 2, "one start, one finish");
    }
}
