use std::fmt::Debug;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::workload::WorkloadClass;

/// A `Metric` is a single observed measurement produced by one unit of work.
///
/// Metrics are the most granular level of data in the pipeline: one request
/// attempt produces one metric, an [`crate::Aggregate`] folds them into
/// mergeable state, and a [`crate::Report`] derives the final statistics.
///
/// ## Design principles
/// - **Immutable:** a metric is emitted once and never changed afterwards.
/// - **Comparable:** [`PartialEq`] and [`PartialOrd`] enable sorting and
///   equality checks during analysis.
/// - **Serializable and thread-safe:** metrics cross task boundaries and may
///   be persisted or shipped elsewhere, so `Serialize`, `DeserializeOwned`,
///   `Send`, `Sync` and `Clone` are required.
pub trait Metric
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
}

/// The sample emitted for every scrape attempt.
///
/// `success` reflects the full validation chain (status, body, latency
/// ceiling), not just the transport outcome. `memory_mb` is the optional
/// memory-usage gauge reported by the service in successful response bodies;
/// absence means the body carried no parseable telemetry, which is not an
/// error.
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ScrapeMetric {
    pub timestamp: DateTime<Utc>,
    pub latency: Duration,
    pub success: bool,
    pub class: WorkloadClass,
    pub memory_mb: Option<f64>,
    /// Tag of the phase that was active when the attempt started.
    pub phase: String,
}

impl Metric for ScrapeMetric {}
