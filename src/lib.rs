//! Sitecap: a capacity load-testing harness for scraping services.
//!
//! Sitecap answers one question: how many concurrently-served sites can a
//! memory-constrained scraping host sustain? It drives synthetic traffic
//! from a pool of virtual users (VUs) split into two workload classes, Heavy
//! (browser-automation scrapes, expensive) and Light (plain HTTP scrapes,
//! cheap), ramps concurrency through configured phases, and reduces the
//! collected samples into percentile-based verdicts and a max-site
//! recommendation.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`Scenario`]: glue that ties everything together; defines the action
//!   executed by each VU iteration.
//! - [`Executor`]: responsible for actually running the scenario. The
//!   built-in [`PhaseExecutor`] governs a VU pool through a phased
//!   concurrency timeline; executors are replaceable.
//! - [`Metric`]: the smallest unit produced by an action. One scrape attempt
//!   returns one [`ScrapeMetric`].
//! - [`Collector`]: the single shared, synchronized sink all VUs record
//!   into.
//! - [`Aggregate`]: mergeable raw state ([`ScrapeAggregate`]) accumulated by
//!   the collector; no derived statistics live here.
//! - [`Report`]: transforms an aggregate into final figures; a
//!   [`CapacityReport`] carries error rate, p50/p95/p99 and the
//!   [`Recommendation`].
//! - [`Reporter`]: consumes reports and sends them somewhere (stdout box
//!   rendering, JSON summary file).
//!
//! Supporting pieces: [`workload::site_target`] deterministically pins each
//! VU to a site and class, [`ScrapeClient`] performs the one outbound
//! request shape, and [`RunConfig`] carries everything a run needs,
//! validated before a single VU spawns.
//!
//! # Design goals
//!
//! - Request failures are data, not errors: a timeout or bad status becomes
//!   a failed sample and the run keeps going. Only configuration problems
//!   abort.
//! - Deterministic where it matters: workload mapping is a pure function,
//!   think-time randomness is injectable, percentiles use a documented
//!   nearest-rank method.
//! - The shared aggregate is touched only through the collector's bounded
//!   critical sections, so no sample is lost or double-counted under
//!   concurrent load.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use rand::rngs::SmallRng;
//! use rand::SeedableRng;
//! use sitecap::{
//!     executor::{Phase, PhaseExecutor},
//!     report::{CapacityReport, Reporter, StdoutReporter},
//!     scrape::ScrapeClient,
//!     Iteration, RunConfig, Scenario, ScrapeAggregate, Vu,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::builder()
//!         .base_url("http://localhost:8002")
//!         .population(100)
//!         .heavy_ratio(0.4)
//!         .phases(vec![Phase::constant(
//!             "current",
//!             Duration::ZERO,
//!             43,
//!             Duration::from_secs(180),
//!         )])
//!         .build();
//!     config.validate()?;
//!
//!     // Build the client once; cloning it into the action is cheap.
//!     let client = ScrapeClient::new(
//!         &config.base_url,
//!         config.request_timeout,
//!         config.latency_ceiling,
//!     )?;
//!     let population = config.population;
//!     let heavy_ratio = config.heavy_ratio;
//!     let pacing = config.pacing;
//!
//!     let aggregate: ScrapeAggregate = Scenario::builder()
//!         .name("capacity")
//!         .action(move |vu: Vu| {
//!             let client = client.clone();
//!             async move {
//!                 let target = sitecap::site_target(vu.index, population, heavy_ratio);
//!                 let metric = client.scrape(&target, &vu.phase).await;
//!                 let mut rng = SmallRng::from_entropy();
//!                 let think_time = pacing.think_time(target.class, &mut rng);
//!                 Iteration { metric, think_time }
//!             }
//!         })
//!         .executor(PhaseExecutor::builder().phases(config.phases.clone()).build())
//!         .build()
//!         .run()
//!         .await?;
//!
//!     let report = CapacityReport::from(aggregate);
//!     StdoutReporter.report(&report).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Feature flags
//!
//! - `internals`: expose the executor's internal machinery (governor task,
//!   execution context) for experimentation. Unstable surface.

/// Metric aggregators
pub mod aggregate;
/// The shared, synchronized sample sink
pub mod collector;
/// Run configuration and validation
pub mod config;
/// Orchestrators that define how things will actually run
pub mod executor;
/// Single metrics
pub mod metric;
/// Reports and Reporters
pub mod report;
/// Main module of the framework that glues everything together
pub mod scenario;
/// The outbound scrape request and its validation rules
pub mod scrape;
/// Deterministic VU-to-site workload mapping
pub mod workload;

pub use aggregate::{Aggregate, ScrapeAggregate};
pub use collector::Collector;
pub use config::{ConfigError, PacingConfig, RunConfig, SleepInterval, Thresholds};
pub use executor::{Executor, Iteration, Phase, PhaseExecutor, RampStep, Trajectory, Vu};
pub use metric::{Metric, ScrapeMetric};
pub use report::{CapacityReport, Recommendation, Report, Reporter};
pub use scenario::Scenario;
pub use scrape::ScrapeClient;
pub use workload::{site_target, SiteTarget, WorkloadClass};
