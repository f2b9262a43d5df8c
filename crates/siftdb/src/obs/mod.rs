//! Instrumentation boundary.
//!
//! Engine code never aggregates metrics itself; everything flows
//! through [`MetricsEvent`] into whichever [`MetricsSink`] is active.

pub mod sink;

pub use sink::{MetricsEvent, MetricsSink, NullSink, with_metrics_sink};

pub(crate) use sink::record;
