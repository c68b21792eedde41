use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::executor::phase::{validate_phases, Phase};
use crate::report::CapacityReport;
use crate::workload::WorkloadClass;

/// Everything the engine needs for one run. Loading this from a file or the
/// environment is the caller's business; the engine only validates and
/// consumes it.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct RunConfig {
    /// Base URL of the scraping service, e.g. `http://host.docker.internal:8002`.
    #[builder(setter(into))]
    pub base_url: String,
    /// Number of distinct sites in the simulated population.
    pub population: usize,
    /// Fraction of the population that is browser-automation backed, `0.0..=1.0`.
    pub heavy_ratio: f64,
    /// Time-ordered concurrency phases.
    pub phases: Vec<Phase>,
    /// Hard timeout on each scrape request.
    #[builder(default = Duration::from_secs(30))]
    pub request_timeout: Duration,
    /// Latency above which a response counts as failed even when the status
    /// is fine.
    #[builder(default = Duration::from_secs(20))]
    pub latency_ceiling: Duration,
    #[builder(default)]
    pub pacing: PacingConfig,
    #[builder(default)]
    pub thresholds: Thresholds,
}

impl RunConfig {
    /// Reject a misconfigured run before any VU spawns. This is the only
    /// error class that aborts a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        if !(0.0..=1.0).contains(&self.heavy_ratio) {
            return Err(ConfigError::RatioOutOfRange(self.heavy_ratio));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.pacing.validate()?;
        validate_phases(&self.phases)
    }
}

/// Bounds of the uniform think-time draw between iterations, per workload
/// class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SleepInterval {
    pub min: Duration,
    pub max: Duration,
}

impl SleepInterval {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }
}

/// Re-poll cadence per workload class. Heavy scrapes get a wider, longer band
/// since they are far more expensive for the target to serve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PacingConfig {
    pub heavy: SleepInterval,
    pub light: SleepInterval,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            heavy: SleepInterval::new(Duration::from_secs(60), Duration::from_secs(90)),
            light: SleepInterval::new(Duration::from_secs(40), Duration::from_secs(60)),
        }
    }
}

impl PacingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (class, interval) in [
            (WorkloadClass::Heavy, self.heavy),
            (WorkloadClass::Light, self.light),
        ] {
            if interval.min > interval.max {
                return Err(ConfigError::InvalidSleepInterval(class));
            }
        }
        Ok(())
    }

    /// Draw a think time uniformly from the class band, `[min, max)`.
    ///
    /// The random source is injected so tests can pin it; production callers
    /// typically pass a fresh `SmallRng`.
    pub fn think_time<R: Rng>(&self, class: WorkloadClass, rng: &mut R) -> Duration {
        let interval = match class {
            WorkloadClass::Heavy => self.heavy,
            WorkloadClass::Light => self.light,
        };
        if interval.max <= interval.min {
            return interval.min;
        }
        let span = (interval.max - interval.min).as_secs_f64();
        interval.min + Duration::from_secs_f64(rng.gen_range(0.0..span))
    }
}

/// Pass/fail gates evaluated against the reduced result, k6-threshold style.
/// Strict `<`: hitting a bound exactly fails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub max_error_rate: f64,
    pub max_p95: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.20,
            max_p95: Duration::from_secs(20),
        }
    }
}

impl Thresholds {
    pub fn passed(&self, report: &CapacityReport) -> bool {
        report.error_rate < self.max_error_rate && report.percentiles.p95 < self.max_p95
    }
}

/// Fatal configuration problems, surfaced before the run starts.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("site population must be greater than zero")]
    EmptyPopulation,
    #[error("heavy ratio must be within 0.0..=1.0, got {0}")]
    RatioOutOfRange(f64),
    #[error("request timeout must be non-zero")]
    ZeroTimeout,
    #[error("sleep interval for the {0} class has min greater than max")]
    InvalidSleepInterval(WorkloadClass),
    #[error("at least one phase is required")]
    NoPhases,
    #[error("phase `{0}` starts before the preceding phase")]
    UnorderedPhases(String),
    #[error("phase `{0}` has zero total duration")]
    EmptyPhase(String),
    #[error("phase `{0}` declares a ramp with no steps")]
    EmptyRamp(String),
}
