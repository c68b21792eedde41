use parking_lot::Mutex;

use crate::aggregate::{Aggregate, ScrapeAggregate};

/// The one shared, synchronized sink for all samples produced during a run.
///
/// Every virtual user holds a handle to the same collector and funnels its
/// metrics through [`record`](Collector::record); nothing else may touch the
/// underlying aggregate. Each record call is a single
/// [`consume`](Aggregate::consume) under the lock, so the critical section is
/// bounded by one counter-and-push update. [`snapshot`](Collector::snapshot)
/// clones the current state under that same bounded section, so concurrent
/// writers are never blocked for longer than one update.
///
/// Correctness property: with N concurrent writers each recording one metric,
/// the snapshot total is exactly N. No sample is lost, none is
/// double-counted.
#[derive(Debug, Default)]
pub struct Collector<A: Aggregate> {
    inner: Mutex<A>,
}

impl<A: Aggregate> Collector<A> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(A::new()),
        }
    }

    /// Fold one metric into the shared state.
    pub fn record(&self, metric: &A::Metric) {
        self.inner.lock().consume(metric);
    }

    /// Fold a whole partial aggregate in, e.g. from a worker that batched
    /// locally.
    pub fn merge(&self, other: A) {
        self.inner.lock().merge(other);
    }

    /// An immutable copy of the current state. Safe to call while writers are
    /// active; the copy is internally consistent because it is taken under
    /// the write lock.
    pub fn snapshot(&self) -> A {
        self.inner.lock().clone()
    }
}

impl Collector<ScrapeAggregate> {
    /// Bump a named custom counter.
    pub fn record_counter(&self, name: &str) {
        self.inner.lock().bump_counter(name);
    }

    /// Append a value to a named custom gauge series.
    pub fn record_gauge(&self, name: &str, value: f64) {
        self.inner.lock().push_gauge(name, value);
    }
}
