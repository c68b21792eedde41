use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::metric::{Metric, ScrapeMetric};
use crate::workload::WorkloadClass;

/// The `Aggregate` trait defines how raw [`Metric`] values are folded into a
/// compact, mergeable representation that preserves the information needed
/// for later analysis.
///
/// **Important:** aggregates should **not** compute final statistics such as
/// averages or percentiles. Those derived values belong in a
/// [`crate::Report`], which is converted from an aggregate and performs the
/// final processing. Aggregates store raw mergeable data (counts, sample
/// vectors, named counters) so the report stage can compute accurate
/// summaries without losing information.
///
/// # Implementor notes
/// - `merge` must be **associative** and **commutative**: partial aggregates
///   may be combined in arbitrary order.
/// - `consume` runs inside the collector's critical section, so it must stay
///   cheap: counter bumps and sample pushes, nothing derived.
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
    /// The metric type this aggregate summarizes.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Fold multiple metrics into the current instance.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Per-class request bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ClassCounts {
    pub total: u64,
    pub failures: u64,
}

/// The accumulated state of one capacity run.
///
/// Append-only while the run is live; every mutation goes through
/// [`consume`](Aggregate::consume) under the collector's lock. Duration and
/// memory samples are kept raw so the report layer can compute reproducible
/// percentiles from a sorted copy.
#[derive(Debug, Clone, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ScrapeAggregate {
    pub total: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub heavy: ClassCounts,
    pub light: ClassCounts,
    /// One entry per attempt, unordered across VUs.
    pub durations: Vec<Duration>,
    /// Memory-usage gauge values reported by the service, MB.
    pub memory_mb: Vec<f64>,
    /// Requests attributed to each phase tag.
    pub per_phase: BTreeMap<String, u64>,
    /// Named custom counters (e.g. `successful_scrapes`).
    pub counters: BTreeMap<String, u64>,
    /// Named custom gauge series.
    pub gauges: BTreeMap<String, Vec<f64>>,
}

impl ScrapeAggregate {
    /// Failed fraction of all attempts; `0.0` for an empty run rather than a
    /// division fault.
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failure_count as f64 / self.total as f64
        }
    }

    pub fn bump_counter(&mut self, name: &str) {
        *self.counters.entry(name.to_owned()).or_insert(0) += 1;
    }

    pub fn push_gauge(&mut self, name: &str, value: f64) {
        self.gauges.entry(name.to_owned()).or_default().push(value);
    }
}

impl Aggregate for ScrapeAggregate {
    type Metric = ScrapeMetric;

    fn new() -> Self {
        Self::default()
    }

    fn consume(&mut self, metric: &Self::Metric) {
        self.total += 1;
        if metric.success {
            self.success_count += 1;
            self.bump_counter("successful_scrapes");
        } else {
            self.failure_count += 1;
        }

        let class = match metric.class {
            WorkloadClass::Heavy => &mut self.heavy,
            WorkloadClass::Light => &mut self.light,
        };
        class.total += 1;
        if !metric.success {
            class.failures += 1;
        }

        self.durations.push(metric.latency);
        if let Some(mb) = metric.memory_mb {
            self.memory_mb.push(mb);
            self.push_gauge("app_memory_mb", mb);
        }
        *self.per_phase.entry(metric.phase.clone()).or_insert(0) += 1;
    }

    fn merge(&mut self, other: Self) {
        self.total += other.total;
        self.success_count += other.success_count;
        self.failure_count += other.failure_count;
        self.heavy.total += other.heavy.total;
        self.heavy.failures += other.heavy.failures;
        self.light.total += other.light.total;
        self.light.failures += other.light.failures;
        self.durations.extend(other.durations);
        self.memory_mb.extend(other.memory_mb);
        for (phase, n) in other.per_phase {
            *self.per_phase.entry(phase).or_insert(0) += n;
        }
        for (name, n) in other.counters {
            *self.counters.entry(name).or_insert(0) += n;
        }
        for (name, values) in other.gauges {
            self.gauges.entry(name).or_default().extend(values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(success: bool, class: WorkloadClass, memory_mb: Option<f64>) -> ScrapeMetric {
        ScrapeMetric {
            timestamp: Utc::now(),
            latency: Duration::from_millis(1000),
            success,
            class,
            memory_mb,
            phase: "current".into(),
        }
    }

    #[test]
    fn consume_tracks_outcomes_and_classes() {
        let mut agg = ScrapeAggregate::new();
        agg.consume(&sample(true, WorkloadClass::Heavy, Some(180.0)));
        agg.consume(&sample(false, WorkloadClass::Heavy, None));
        agg.consume(&sample(true, WorkloadClass::Light, None));

        assert_eq!(agg.total, 3);
        assert_eq!(agg.success_count, 2);
        assert_eq!(agg.failure_count, 1);
        assert_eq!(agg.heavy.total, 2);
        assert_eq!(agg.heavy.failures, 1);
        assert_eq!(agg.light.total, 1);
        assert_eq!(agg.light.failures, 0);
        assert_eq!(agg.durations.len(), 3);
        assert_eq!(agg.memory_mb, vec![180.0]);
        assert_eq!(agg.counters["successful_scrapes"], 2);
        assert_eq!(agg.gauges["app_memory_mb"], vec![180.0]);
        assert_eq!(agg.per_phase["current"], 3);
    }

    #[test]
    fn error_rate_is_zero_on_empty() {
        assert_eq!(ScrapeAggregate::new().error_rate(), 0.0);
    }

    #[test]
    fn merge_is_lossless() {
        let mut a = ScrapeAggregate::new();
        a.consume(&sample(true, WorkloadClass::Heavy, Some(150.0)));
        let mut b = ScrapeAggregate::new();
        b.consume(&sample(false, WorkloadClass::Light, None));
        b.consume(&sample(true, WorkloadClass::Light, Some(20.0)));

        let mut merged_ab = a.clone();
        merged_ab.merge(b.clone());
        let mut merged_ba = b;
        merged_ba.merge(a);

        assert_eq!(merged_ab.total, 3);
        assert_eq!(merged_ab.failure_count, 1);
        assert_eq!(merged_ab.durations.len(), 3);
        assert_eq!(merged_ab.memory_mb.len(), 2);
        // commutative on everything order-insensitive
        assert_eq!(merged_ab.total, merged_ba.total);
        assert_eq!(merged_ab.counters, merged_ba.counters);
        assert_eq!(merged_ab.per_phase, merged_ba.per_phase);
    }
}
