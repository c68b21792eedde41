use std::fmt::Debug;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use crate::aggregate::{Aggregate, ScrapeAggregate};

/// A `Report` is the processed form of an [`Aggregate`].
///
/// Reports turn raw aggregated data into the derived figures people act on:
/// rates, percentiles, verdicts. They are pure data structures, free of I/O;
/// construction happens through a `From<A>` implementation and must be
/// deterministic for a given aggregate. Emission is a [`Reporter`]'s job.
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// A `Reporter` consumes a [`Report`] and performs the side effects:
/// printing, writing files, shipping elsewhere. This is the I/O boundary of
/// the pipeline; everything before it stays pure.
pub trait Reporter<A: Aggregate, R: Report<A>> {
    fn report(&self, report: &R) -> impl Future<Output = Result<(), Box<dyn std::error::Error>>>;
}

/// Latency value below which `p`% of recorded samples fall.
///
/// Nearest-rank method on a sorted copy: `rank = ceil(p/100 * n)`, answer is
/// the sample at that rank. Deterministic for a given sample set; an empty
/// set yields zero rather than faulting.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Excellent,
    Acceptable,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

/// The verdict on how many sites the target host can sustain, derived from
/// the observed error rate and tail latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub status: RecommendationStatus,
    pub message: String,
    pub max_sites: u32,
    pub confidence: Confidence,
}

impl Recommendation {
    /// Fixed bands, evaluated in order, first match wins. All comparisons are
    /// strict: an error rate of exactly 0.10 is not "< 0.10" and falls
    /// through to the next band.
    pub fn derive(error_rate: f64, p95: Duration) -> Self {
        if error_rate < 0.10 && p95 < Duration::from_millis(15_000) {
            Self {
                status: RecommendationStatus::Excellent,
                message: "System can handle 100+ sites with headroom".into(),
                max_sites: 100,
                confidence: Confidence::High,
            }
        } else if error_rate < 0.20 && p95 < Duration::from_millis(20_000) {
            Self {
                status: RecommendationStatus::Acceptable,
                message: "System stable but near its limits".into(),
                max_sites: 80,
                confidence: Confidence::Medium,
            }
        } else {
            Self {
                status: RecommendationStatus::Critical,
                message: "Memory or CPU limits reached".into(),
                max_sites: 60,
                confidence: Confidence::High,
            }
        }
    }
}

/// The reduced result of one capacity run. Computed exactly once, from the
/// final aggregate snapshot, after every VU has stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityReport {
    pub timestamp: DateTime<Utc>,
    pub total_requests: u64,
    /// Failed fraction, `0.0..=1.0`.
    pub error_rate: f64,
    pub percentiles: Percentiles,
    /// Mean of the memory gauge values the service reported, if any.
    pub mean_memory_mb: Option<f64>,
    pub recommendation: Recommendation,
}

impl From<ScrapeAggregate> for CapacityReport {
    fn from(agg: ScrapeAggregate) -> Self {
        let mut sorted = agg.durations.clone();
        sorted.sort_unstable();
        let percentiles = Percentiles {
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        };
        let error_rate = agg.error_rate();
        let mean_memory_mb = if agg.memory_mb.is_empty() {
            None
        } else {
            Some(agg.memory_mb.iter().sum::<f64>() / agg.memory_mb.len() as f64)
        };
        Self {
            timestamp: Utc::now(),
            total_requests: agg.total,
            error_rate,
            percentiles,
            mean_memory_mb,
            recommendation: Recommendation::derive(error_rate, percentiles.p95),
        }
    }
}

impl Report<ScrapeAggregate> for CapacityReport {}

fn fmt_percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

fn fmt_seconds(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

impl CapacityReport {
    /// The machine-readable summary, with rates and latencies pre-formatted
    /// as strings the way downstream tooling expects them.
    pub fn summary(&self) -> serde_json::Value {
        json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "results": {
                "total_requests": self.total_requests,
                "error_rate": fmt_percent(self.error_rate),
                "response_times": {
                    "p50": fmt_seconds(self.percentiles.p50),
                    "p95": fmt_seconds(self.percentiles.p95),
                    "p99": fmt_seconds(self.percentiles.p99),
                },
            },
            "recommendation": self.recommendation,
        })
    }

    /// The human-readable box report.
    pub fn render(&self) -> String {
        let line = |text: &str| format!("║  {text:<56}║\n");
        let mut out = String::new();
        out.push_str("╔══════════════════════════════════════════════════════════╗\n");
        out.push_str(&line("Scrape Capacity Test Results"));
        out.push_str("╠══════════════════════════════════════════════════════════╣\n");
        out.push_str(&line(""));
        out.push_str(&line("Overall Performance:"));
        out.push_str(&line(&format!(
            "  Total Requests: {}",
            self.total_requests
        )));
        out.push_str(&line(&format!(
            "  Error Rate:     {}",
            fmt_percent(self.error_rate)
        )));
        out.push_str(&line(&format!(
            "  P50 Latency:    {}",
            fmt_seconds(self.percentiles.p50)
        )));
        out.push_str(&line(&format!(
            "  P95 Latency:    {}",
            fmt_seconds(self.percentiles.p95)
        )));
        out.push_str(&line(&format!(
            "  P99 Latency:    {}",
            fmt_seconds(self.percentiles.p99)
        )));
        if let Some(mb) = self.mean_memory_mb {
            out.push_str(&line(&format!("  Mean App Memory: {mb:.1} MB")));
        }
        out.push_str(&line(""));
        out.push_str(&line("Recommendation:"));
        out.push_str(&line(&format!(
            "  Status:     {:?}",
            self.recommendation.status
        )));
        out.push_str(&line(&format!("  {}", self.recommendation.message)));
        out.push_str(&line(&format!(
            "  Max Sites:  {}",
            self.recommendation.max_sites
        )));
        out.push_str(&line(&format!(
            "  Confidence: {:?}",
            self.recommendation.confidence
        )));
        out.push_str(&line(""));
        out.push_str("╚══════════════════════════════════════════════════════════╝\n");
        out
    }
}

/// Prints the box report to stdout.
pub struct StdoutReporter;

impl Reporter<ScrapeAggregate, CapacityReport> for StdoutReporter {
    async fn report(&self, report: &CapacityReport) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", report.render());
        Ok(())
    }
}

/// Writes the pretty-printed summary JSON to a file, creating parent
/// directories as needed.
pub struct JsonFileReporter {
    path: PathBuf,
}

impl JsonFileReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Reporter<ScrapeAggregate, CapacityReport> for JsonFileReporter {
    async fn report(&self, report: &CapacityReport) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_string_pretty(&report.summary())?;
        tokio::fs::write(&self.path, body).await?;
        tracing::info!("Summary written to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn aggregate_with(total: u64, failures: u64, latency: Duration) -> ScrapeAggregate {
        let mut agg = ScrapeAggregate::new();
        agg.total = total;
        agg.failure_count = failures;
        agg.success_count = total - failures;
        agg.durations = vec![latency; total as usize];
        agg
    }

    mod percentiles {
        use super::*;

        #[test]
        fn nearest_rank_on_known_set() {
            let sorted: Vec<Duration> = (1..=100).map(ms).collect();
            assert_eq!(percentile(&sorted, 50.0), ms(50));
            assert_eq!(percentile(&sorted, 95.0), ms(95));
            assert_eq!(percentile(&sorted, 99.0), ms(99));
        }

        #[test]
        fn single_sample_is_every_percentile() {
            let sorted = vec![ms(1000)];
            assert_eq!(percentile(&sorted, 50.0), ms(1000));
            assert_eq!(percentile(&sorted, 99.0), ms(1000));
        }

        #[test]
        fn empty_set_is_zero() {
            assert_eq!(percentile(&[], 95.0), Duration::ZERO);
        }
    }

    mod recommendation {
        use super::*;

        #[test]
        fn clean_fast_run_is_excellent() {
            let rec = Recommendation::derive(0.0999, ms(14_999));
            assert_eq!(rec.status, RecommendationStatus::Excellent);
            assert_eq!(rec.max_sites, 100);
            assert_eq!(rec.confidence, Confidence::High);
        }

        #[test]
        fn boundary_error_rate_is_not_excellent() {
            // exactly 0.10 fails the strict comparison
            let rec = Recommendation::derive(0.10, ms(14_999));
            assert_eq!(rec.status, RecommendationStatus::Acceptable);
        }

        #[test]
        fn boundary_latency_is_not_excellent() {
            let rec = Recommendation::derive(0.05, ms(15_000));
            assert_eq!(rec.status, RecommendationStatus::Acceptable);
            assert_eq!(rec.max_sites, 80);
        }

        #[test]
        fn either_limit_blown_is_critical() {
            assert_eq!(
                Recommendation::derive(0.20, ms(1_000)).status,
                RecommendationStatus::Critical
            );
            assert_eq!(
                Recommendation::derive(0.0, ms(20_000)).status,
                RecommendationStatus::Critical
            );
        }
    }

    #[test]
    fn reducing_an_empty_run_does_not_fault() {
        let report = CapacityReport::from(ScrapeAggregate::new());
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.error_rate, 0.0);
        assert_eq!(report.percentiles.p95, Duration::ZERO);
        assert_eq!(report.mean_memory_mb, None);
    }

    #[test]
    fn reduction_is_reproducible() {
        let agg = aggregate_with(200, 10, ms(1000));
        let a = CapacityReport::from(agg.clone());
        let b = CapacityReport::from(agg);
        assert_eq!(a.error_rate, b.error_rate);
        assert_eq!(a.percentiles, b.percentiles);
        assert_eq!(a.recommendation, b.recommendation);
    }

    #[test]
    fn summary_formats_strings() {
        let report = CapacityReport::from(aggregate_with(100, 5, ms(1230)));
        let summary = report.summary();
        assert_eq!(summary["results"]["total_requests"], 100);
        assert_eq!(summary["results"]["error_rate"], "5.00%");
        assert_eq!(summary["results"]["response_times"]["p95"], "1.23s");
        assert_eq!(summary["recommendation"]["status"], "excellent");
    }

    #[test]
    fn render_carries_the_headline_figures() {
        let report = CapacityReport::from(aggregate_with(100, 5, ms(1230)));
        let text = report.render();
        assert!(text.contains("Total Requests: 100"));
        assert!(text.contains("Error Rate:     5.00%"));
        assert!(text.contains("P95 Latency:    1.23s"));
        assert!(text.contains("Max Sites:  100"));
    }
}
