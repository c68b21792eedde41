//! The `PhaseExecutor` and its components: a phased, concurrency-controlled
//! execution model for virtual users.
//!
//! Where a rate-driven executor asks "how many requests per second", a
//! capacity test asks "how many concurrent users". The `PhaseExecutor`
//! therefore governs a *VU count* over time, driven by a list of [`Phase`]s.
//! Each phase has a start offset on the run timeline and a concurrency
//! trajectory: either a constant VU count held for a duration, or a ramp of
//! `(duration, target)` steps interpolated linearly from the previous target.
//! Overlapping phases are legal and their contributions sum, which is useful
//! for probing transition smoothness.
//!
//! # High-level flow
//! 1. A shared execution context is created, holding the start/shutdown
//!    signals and the desired-concurrency channel.
//! 2. A governor task is spawned. Every `tick` it evaluates the timeline and
//!    publishes the desired VU count plus the active phase tag.
//! 3. A pool of VU tasks sized to the timeline's peak concurrency is spawned.
//!    VU `i` runs its iteration loop while the desired count exceeds `i` and
//!    parks otherwise, keeping its index (and therefore its site) stable for
//!    the whole run. A parked VU is never interrupted mid-iteration; it
//!    simply is not resumed until the desired count rises past it again.
//! 4. Each live VU iteration: call the scenario action (resolve + request +
//!    validate), record the returned metric into the shared collector, then
//!    sleep the action-chosen think time. Request and sleep are the only
//!    suspension points; shutdown is raced against both, and a cancelled
//!    iteration records nothing.
//! 5. When the governor exhausts the timeline the run is over: shutdown is
//!    broadcast, every VU handle is drained, and the collector snapshot
//!    becomes the final aggregate.
//!
//! # Tuning knobs
//! - `tick`: granularity of governor updates. Smaller ticks track ramps more
//!   closely but cause more wakeups. Typical: 10–200ms.
//!
//! The timeline evaluation is pure (`Phase::vus_at`, [`concurrency_at`],
//! [`peak_concurrency`]), so ramp arithmetic is unit-testable without a
//! runtime.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use super::{Executor, Iteration, Vu};
use crate::aggregate::Aggregate;
use crate::collector::Collector;
use crate::config::ConfigError;
use crate::scenario::Scenario;
use internals::*;

/// One segment of a ramp: move linearly from the previous target to `target`
/// over `duration`.
///
/// A zero-duration step jumps to its target instantly; it only re-bases the
/// ramp for subsequent steps and holds nothing itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RampStep {
    pub duration: Duration,
    /// Virtual users to be running when the step completes.
    pub target: usize,
}

impl RampStep {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// How a phase's concurrency evolves over its window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Trajectory {
    /// Hold `vus` for the whole `duration`.
    Constant { vus: usize, duration: Duration },
    /// Start at `start_vus` and walk the steps.
    Ramp {
        start_vus: usize,
        steps: Vec<RampStep>,
    },
}

impl Trajectory {
    /// Total length of the trajectory.
    pub fn duration(&self) -> Duration {
        match self {
            Trajectory::Constant { duration, .. } => *duration,
            Trajectory::Ramp { steps, .. } => steps.iter().map(|s| s.duration).sum(),
        }
    }

    /// Desired VU count at `t` past the trajectory start; zero once the
    /// trajectory is over.
    fn vus_at(&self, t: Duration) -> usize {
        match self {
            Trajectory::Constant { vus, duration } => {
                if t < *duration {
                    *vus
                } else {
                    0
                }
            }
            Trajectory::Ramp { start_vus, steps } => {
                let mut from = *start_vus as f64;
                let mut offset = Duration::ZERO;
                for step in steps {
                    let end = offset + step.duration;
                    if t < end {
                        let frac = (t - offset).as_secs_f64() / step.duration.as_secs_f64();
                        let target = step.target as f64;
                        return (from + (target - from) * frac).round() as usize;
                    }
                    from = step.target as f64;
                    offset = end;
                }
                0
            }
        }
    }
}

/// A time window on the run timeline with its own concurrency trajectory.
/// The name doubles as the phase tag attached to every sample recorded while
/// the phase is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    /// Offset from the start of the run.
    pub start_offset: Duration,
    pub trajectory: Trajectory,
}

impl Phase {
    pub fn constant(
        name: impl Into<String>,
        start_offset: Duration,
        vus: usize,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            start_offset,
            trajectory: Trajectory::Constant { vus, duration },
        }
    }

    pub fn ramp(
        name: impl Into<String>,
        start_offset: Duration,
        start_vus: usize,
        steps: Vec<RampStep>,
    ) -> Self {
        Self {
            name: name.into(),
            start_offset,
            trajectory: Trajectory::Ramp { start_vus, steps },
        }
    }

    pub fn duration(&self) -> Duration {
        self.trajectory.duration()
    }

    /// Offset at which this phase's window closes.
    pub fn end_offset(&self) -> Duration {
        self.start_offset + self.duration()
    }

    /// Desired VU count this phase contributes at `at` (offset from run
    /// start). Zero outside the phase window.
    pub fn vus_at(&self, at: Duration) -> usize {
        if at < self.start_offset {
            return 0;
        }
        self.trajectory.vus_at(at - self.start_offset)
    }
}

/// Total desired concurrency at `at`: overlapping phases sum.
pub fn concurrency_at(phases: &[Phase], at: Duration) -> usize {
    phases.iter().map(|p| p.vus_at(at)).sum()
}

/// Tag of the phase owning the instant `at`. With overlap, the
/// latest-starting active phase wins.
pub fn active_phase(phases: &[Phase], at: Duration) -> Option<&str> {
    phases
        .iter()
        .filter(|p| at >= p.start_offset && at < p.end_offset())
        .max_by_key(|p| p.start_offset)
        .map(|p| p.name.as_str())
}

/// Length of the whole timeline: the latest phase end.
pub fn run_duration(phases: &[Phase]) -> Duration {
    phases
        .iter()
        .map(Phase::end_offset)
        .max()
        .unwrap_or(Duration::ZERO)
}

/// Highest summed concurrency anywhere on the timeline, which sizes the VU
/// pool. Concurrency is piecewise linear, so the maximum sits on a segment
/// boundary; each boundary is probed on both sides.
pub fn peak_concurrency(phases: &[Phase]) -> usize {
    let mut points: Vec<Duration> = Vec::new();
    for phase in phases {
        let mut offset = phase.start_offset;
        points.push(offset);
        match &phase.trajectory {
            Trajectory::Constant { duration, .. } => points.push(offset + *duration),
            Trajectory::Ramp { steps, .. } => {
                for step in steps {
                    offset += step.duration;
                    points.push(offset);
                }
            }
        }
    }
    let epsilon = Duration::from_millis(1);
    points
        .iter()
        .flat_map(|p| [*p, p.saturating_sub(epsilon)])
        .map(|at| concurrency_at(phases, at))
        .max()
        .unwrap_or(0)
}

/// Reject a broken timeline before anything spawns.
pub fn validate_phases(phases: &[Phase]) -> Result<(), ConfigError> {
    if phases.is_empty() {
        return Err(ConfigError::NoPhases);
    }
    let mut prev_offset = Duration::ZERO;
    for phase in phases {
        if phase.start_offset < prev_offset {
            return Err(ConfigError::UnorderedPhases(phase.name.clone()));
        }
        prev_offset = phase.start_offset;
        if let Trajectory::Ramp { steps, .. } = &phase.trajectory {
            if steps.is_empty() {
                return Err(ConfigError::EmptyRamp(phase.name.clone()));
            }
        }
        if phase.duration().is_zero() {
            return Err(ConfigError::EmptyPhase(phase.name.clone()));
        }
    }
    Ok(())
}

/// Errors a run can die of. Everything here happens before or around the VU
/// pool; per-request failures never surface this way.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("governor task failed: {0}")]
    Governor(String),
    #[error("{0} channel closed before the run finished")]
    ChannelClosed(&'static str),
}

/// Executor that drives a VU pool through a phased concurrency timeline.
///
/// - A governor task re-evaluates the timeline every `tick` and publishes the
///   desired VU count and active phase tag on a watch channel.
/// - The VU pool is sized once, to the timeline's peak concurrency. VU `i`
///   iterates while `desired > i`, so ramping down parks the highest-indexed
///   VUs first and ramping back up revives exactly those, preserving the
///   VU-to-site pinning.
/// - All samples funnel into one shared [`Collector`]; the final aggregate is
///   the collector snapshot taken after every VU has been drained.
#[derive(TypedBuilder)]
pub struct PhaseExecutor {
    /// The timeline, ordered by start offset.
    pub phases: Vec<Phase>,
    /// Granularity of governor updates.
    #[builder(default = Duration::from_millis(100))]
    pub tick: Duration,
}

impl<A, F, Fut> Executor<A, F, Fut> for PhaseExecutor
where
    Self: Send + Sync + Sized,
    A: Aggregate + 'static,
    F: Fn(Vu) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Iteration<A::Metric>> + Send + 'static,
{
    type Error = PhaseError;

    async fn exec(&self, scenario: &Scenario<A, Self, F, Fut>) -> Result<A, PhaseError> {
        validate_phases(&self.phases)?;

        let (ctx, controls) = ExecutionContext::new();
        let collector = Arc::new(Collector::<A>::new());
        let pool = peak_concurrency(&self.phases);

        tracing::info!("Spawning VU governor task...");
        let governor = tokio::spawn(vu_governor_task(
            ctx.clone(),
            controls.signal,
            self.phases.clone(),
            self.tick,
        ));

        tracing::info!("Spawning a pool of {pool} virtual users...");
        // exec keeps its own ctx alive so the start/shutdown sends below
        // always have a receiver, even with an empty pool.
        let handles = spawn_vus(ctx.clone(), collector.clone(), pool, scenario.action.clone());

        tracing::info!("Running scenario: {}!", scenario.name);
        controls
            .start
            .send(true)
            .map_err(|_| PhaseError::ChannelClosed("start"))?;

        // The governor finishing the timeline means the run is over.
        governor
            .await
            .map_err(|e| PhaseError::Governor(e.to_string()))?;
        tracing::info!("Timeline finished, signaling shutdown...");
        controls
            .shutdown
            .send(true)
            .map_err(|_| PhaseError::ChannelClosed("shutdown"))?;

        tracing::info!("Draining virtual users...");
        for res in join_all(handles).await {
            if let Err(e) = res {
                // One VU panicking should not void the rest of the run's data.
                tracing::error!("VU task panicked: {e}");
            }
        }

        tracing::info!("Done running scenario: {}!", scenario.name);
        Ok(collector.snapshot())
    }
}

#[cfg(feature = "internals")]
pub use internals::*;

/// Internal machinery of the `PhaseExecutor`, exposed under the `internals`
/// feature for experimentation.
mod internals {
    use super::*;
    use tokio::sync::watch;
    use tokio::task::JoinHandle;

    /// Desired state the governor broadcasts each tick.
    #[derive(Debug, Clone)]
    pub struct Signal {
        pub vus: usize,
        pub phase: Arc<str>,
    }

    /// Shared state handed to the governor and every VU task.
    #[derive(Clone)]
    pub struct ExecutionContext {
        /// Flips to true once when the run begins.
        pub start: watch::Receiver<bool>,
        /// Flips to true once when the run must stop.
        pub shutdown: watch::Receiver<bool>,
        /// Desired concurrency and active phase tag.
        pub signal: watch::Receiver<Signal>,
    }

    /// Sender halves retained by the executor.
    pub struct ExecutionControls {
        pub start: watch::Sender<bool>,
        pub shutdown: watch::Sender<bool>,
        pub signal: watch::Sender<Signal>,
    }

    impl ExecutionContext {
        pub fn new() -> (Self, ExecutionControls) {
            let (start_tx, start_rx) = watch::channel(false);
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let (signal_tx, signal_rx) = watch::channel(Signal {
                vus: 0,
                phase: Arc::from(""),
            });
            (
                Self {
                    start: start_rx,
                    shutdown: shutdown_rx,
                    signal: signal_rx,
                },
                ExecutionControls {
                    start: start_tx,
                    shutdown: shutdown_tx,
                    signal: signal_tx,
                },
            )
        }
    }

    /// Governor task: walks the timeline and publishes the desired VU count
    /// until the last phase ends.
    pub async fn vu_governor_task(
        ctx: ExecutionContext,
        signal_tx: watch::Sender<Signal>,
        phases: Vec<Phase>,
        tick: Duration,
    ) {
        let mut start = ctx.start.clone();
        let mut shutdown = ctx.shutdown.clone();

        let main = async {
            if start.wait_for(|b| *b).await.is_err() {
                return;
            }
            tracing::debug!("Governor task started.");

            let started = Instant::now();
            let total = run_duration(&phases);
            let mut next_tick = Instant::now();
            let mut last_vus = 0usize;
            let mut last_phase: Arc<str> = Arc::from("");

            loop {
                let at = started.elapsed();
                if at >= total {
                    break;
                }

                let vus = concurrency_at(&phases, at);
                let phase = active_phase(&phases, at).unwrap_or("");
                if vus != last_vus || phase != last_phase.as_ref() {
                    if phase != last_phase.as_ref() {
                        if !phase.is_empty() {
                            tracing::info!("Entering phase `{phase}` ({vus} VUs desired)");
                        }
                        last_phase = Arc::from(phase);
                    }
                    last_vus = vus;
                    if signal_tx
                        .send(Signal {
                            vus,
                            phase: last_phase.clone(),
                        })
                        .is_err()
                    {
                        // Nobody is listening anymore; the run is gone.
                        break;
                    }
                }

                next_tick += tick;
                tokio::time::sleep_until(next_tick).await;
            }

            let _ = signal_tx.send(Signal {
                vus: 0,
                phase: Arc::from(""),
            });
        };

        tokio::select! {
            _ = main => {
                tracing::debug!("Governor finished the timeline.");
            }
            _ = shutdown.wait_for(|b| *b) => {
                tracing::debug!("Governor received shutdown signal.");
            }
        }
    }

    /// Spawn the VU pool. Each task owns a stable 1-based index and loops:
    /// park until the slot is desired, run one action, record its metric,
    /// sleep the think time. Shutdown is raced against the whole loop, so
    /// cancellation lands on the request or the sleep and an interrupted
    /// iteration records nothing.
    pub fn spawn_vus<A, F, Fut>(
        ctx: ExecutionContext,
        collector: Arc<Collector<A>>,
        pool_size: usize,
        action: F,
    ) -> Vec<JoinHandle<()>>
    where
        A: Aggregate + 'static,
        F: Fn(Vu) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Iteration<A::Metric>> + Send + 'static,
    {
        (0..pool_size)
            .map(|slot| {
                let ctx = ctx.clone();
                let collector = collector.clone();
                let action = action.clone();
                tokio::spawn(async move {
                    let mut start = ctx.start.clone();
                    let mut shutdown = ctx.shutdown.clone();
                    let mut signal = ctx.signal.clone();
                    let index = slot as u64 + 1;
                    tracing::debug!("VU {index} spawned.");

                    let main = async {
                        if start.wait_for(|b| *b).await.is_err() {
                            return;
                        }
                        loop {
                            // Park until this slot is inside the desired count.
                            let phase = match signal.wait_for(|s| s.vus > slot).await {
                                Ok(s) => s.phase.clone(),
                                Err(_) => break,
                            };

                            let iteration = action(Vu { index, phase }).await;
                            collector.record(&iteration.metric);
                            tokio::time::sleep(iteration.think_time).await;
                        }
                    };

                    tokio::select! {
                        _ = main => {}
                        _ = shutdown.wait_for(|b| *b) => {}
                    }

                    tracing::debug!("VU {index} shutting down.");
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ScrapeAggregate;
    use crate::metric::ScrapeMetric;
    use crate::workload::site_target;
    use chrono::Utc;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    mod vus_at {
        use super::*;

        #[test]
        fn constant_holds_inside_window() {
            let p = Phase::constant("hold", secs(10), 43, secs(60));
            assert_eq!(p.vus_at(secs(10)), 43);
            assert_eq!(p.vus_at(secs(69)), 43);
        }

        #[test]
        fn zero_before_offset_and_after_end() {
            let p = Phase::constant("hold", secs(10), 43, secs(60));
            assert_eq!(p.vus_at(secs(0)), 0);
            assert_eq!(p.vus_at(secs(9)), 0);
            assert_eq!(p.vus_at(secs(70)), 0);
            assert_eq!(p.vus_at(secs(1000)), 0);
        }

        #[test]
        fn ramp_up_is_linear() {
            let p = Phase::ramp("up", Duration::ZERO, 0, vec![RampStep::new(secs(10), 100)]);
            assert_eq!(p.vus_at(secs(0)), 0);
            assert_eq!(p.vus_at(secs(5)), 50);
            assert_eq!(p.vus_at(Duration::from_millis(9_000)), 90);
        }

        #[test]
        fn ramp_down_is_linear() {
            let p = Phase::ramp("down", Duration::ZERO, 100, vec![RampStep::new(secs(10), 0)]);
            assert_eq!(p.vus_at(secs(0)), 100);
            assert_eq!(p.vus_at(secs(5)), 50);
            assert_eq!(p.vus_at(Duration::from_millis(9_999)), 0);
        }

        #[test]
        fn hold_step_keeps_target() {
            let p = Phase::ramp(
                "hold",
                Duration::ZERO,
                60,
                vec![RampStep::new(secs(10), 60)],
            );
            for s in 0..10 {
                assert_eq!(p.vus_at(secs(s)), 60);
            }
        }

        #[test]
        fn multi_step_rebases_on_each_target() {
            // 43 -> 60 over 60s, hold 60 for 60s, -> 80 over 60s
            let p = Phase::ramp(
                "scaling",
                Duration::ZERO,
                43,
                vec![
                    RampStep::new(secs(60), 60),
                    RampStep::new(secs(60), 60),
                    RampStep::new(secs(60), 80),
                ],
            );
            assert_eq!(p.vus_at(secs(0)), 43);
            assert_eq!(p.vus_at(secs(60)), 60);
            assert_eq!(p.vus_at(secs(90)), 60);
            assert_eq!(p.vus_at(secs(150)), 70);
        }

        #[test]
        fn zero_duration_step_jumps() {
            let p = Phase::ramp(
                "spike",
                Duration::ZERO,
                10,
                vec![
                    RampStep::new(Duration::ZERO, 50),
                    RampStep::new(secs(10), 50),
                ],
            );
            assert_eq!(p.vus_at(Duration::ZERO), 50);
            assert_eq!(p.vus_at(secs(9)), 50);
        }
    }

    mod timeline {
        use super::*;

        fn overlapping() -> Vec<Phase> {
            vec![
                Phase::constant("base", Duration::ZERO, 10, secs(60)),
                Phase::constant("burst", secs(30), 5, secs(60)),
            ]
        }

        #[test]
        fn overlapping_phases_sum() {
            let phases = overlapping();
            assert_eq!(concurrency_at(&phases, secs(10)), 10);
            assert_eq!(concurrency_at(&phases, secs(45)), 15);
            assert_eq!(concurrency_at(&phases, secs(70)), 5);
            assert_eq!(concurrency_at(&phases, secs(100)), 0);
        }

        #[test]
        fn latest_starting_phase_owns_the_tag() {
            let phases = overlapping();
            assert_eq!(active_phase(&phases, secs(10)), Some("base"));
            assert_eq!(active_phase(&phases, secs(45)), Some("burst"));
            assert_eq!(active_phase(&phases, secs(100)), None);
        }

        #[test]
        fn run_duration_is_latest_end() {
            assert_eq!(run_duration(&overlapping()), secs(90));
            assert_eq!(run_duration(&[]), Duration::ZERO);
        }

        #[test]
        fn peak_covers_overlap() {
            assert_eq!(peak_concurrency(&overlapping()), 15);
        }

        #[test]
        fn peak_catches_ramp_top() {
            let phases = vec![Phase::ramp(
                "limit",
                Duration::ZERO,
                80,
                vec![RampStep::new(secs(60), 100), RampStep::new(secs(120), 100)],
            )];
            assert_eq!(peak_concurrency(&phases), 100);
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn ordered_phases_pass() {
            let phases = vec![
                Phase::constant("a", Duration::ZERO, 10, secs(60)),
                Phase::constant("b", secs(60), 10, secs(60)),
            ];
            assert_eq!(validate_phases(&phases), Ok(()));
        }

        #[test]
        fn empty_timeline_is_rejected() {
            assert_eq!(validate_phases(&[]), Err(ConfigError::NoPhases));
        }

        #[test]
        fn unordered_offsets_are_rejected() {
            let phases = vec![
                Phase::constant("late", secs(60), 10, secs(60)),
                Phase::constant("early", Duration::ZERO, 10, secs(60)),
            ];
            assert_eq!(
                validate_phases(&phases),
                Err(ConfigError::UnorderedPhases("early".into()))
            );
        }

        #[test]
        fn zero_duration_phase_is_rejected() {
            let phases = vec![Phase::constant("empty", Duration::ZERO, 10, Duration::ZERO)];
            assert_eq!(
                validate_phases(&phases),
                Err(ConfigError::EmptyPhase("empty".into()))
            );
        }

        #[test]
        fn ramp_without_steps_is_rejected() {
            let phases = vec![Phase::ramp("bare", Duration::ZERO, 10, vec![])];
            assert_eq!(
                validate_phases(&phases),
                Err(ConfigError::EmptyRamp("bare".into()))
            );
        }
    }

    fn mock_metric(success: bool, vu: &Vu, population: usize, heavy_ratio: f64) -> ScrapeMetric {
        let target = site_target(vu.index, population, heavy_ratio);
        ScrapeMetric {
            timestamp: Utc::now(),
            latency: Duration::from_millis(1000),
            success,
            class: target.class,
            memory_mb: None,
            phase: vu.phase.to_string(),
        }
    }

    async fn run_phases<F, Fut>(phases: Vec<Phase>, action: F) -> ScrapeAggregate
    where
        F: Fn(Vu) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Iteration<ScrapeMetric>> + Send + 'static,
    {
        Scenario::<ScrapeAggregate, _, _, _>::builder()
            .name("test")
            .action(action)
            .executor(PhaseExecutor::builder().phases(phases).build())
            .build()
            .run()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn spawns_expected_number_of_vus() {
        let (ctx, _controls) = ExecutionContext::new();
        let collector = Arc::new(Collector::<ScrapeAggregate>::new());
        let action = |vu: Vu| async move {
            Iteration {
                metric: mock_metric(true, &vu, 100, 0.4),
                think_time: Duration::ZERO,
            }
        };
        let handles = spawn_vus(ctx, collector, 10, action);
        assert_eq!(handles.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn constant_phase_collects_clean_samples() {
        let phases = vec![Phase::constant("current", Duration::ZERO, 43, secs(180))];
        let agg = run_phases(phases, |vu: Vu| async move {
            let metric = mock_metric(true, &vu, 100, 0.4);
            let think_time = if metric.class.is_heavy() {
                secs(60)
            } else {
                secs(40)
            };
            Iteration { metric, think_time }
        })
        .await;

        // 40 heavy VUs at >= 3 iterations, 3 light VUs at >= 4.
        assert!(agg.total >= 130, "total was {}", agg.total);
        assert_eq!(agg.failure_count, 0);
        assert_eq!(agg.error_rate(), 0.0);
        assert_eq!(agg.heavy.total + agg.light.total, agg.total);
        assert!(agg.durations.iter().all(|d| *d == secs(1)));
        assert_eq!(agg.per_phase["current"], agg.total);
        // Light VUs poll faster than heavy ones.
        let heavy_rate = agg.heavy.total as f64 / 40.0;
        let light_rate = agg.light.total as f64 / 3.0;
        assert!(light_rate > heavy_rate);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_attributed_to_heavy_class_only() {
        let phases = vec![Phase::constant("split", Duration::ZERO, 100, secs(120))];
        let agg = run_phases(phases, |vu: Vu| async move {
            let target = site_target(vu.index, 100, 0.4);
            let metric = mock_metric(!target.class.is_heavy(), &vu, 100, 0.4);
            let think_time = if target.class.is_heavy() {
                secs(60)
            } else {
                secs(40)
            };
            Iteration { metric, think_time }
        })
        .await;

        assert_eq!(agg.heavy.failures, agg.heavy.total);
        assert_eq!(agg.light.failures, 0);
        assert_eq!(agg.failure_count, agg.heavy.total);
        let rate = agg.error_rate();
        assert!(rate > 0.2 && rate < 0.5, "error rate was {rate}");
    }

    #[tokio::test(start_paused = true)]
    async fn phase_end_cancels_sleeping_vus() {
        // Think time far exceeds the phase, so every VU gets exactly one
        // iteration and is then cancelled mid-sleep.
        let phases = vec![Phase::constant("short", Duration::ZERO, 5, secs(10))];
        let agg = run_phases(phases, |vu: Vu| async move {
            Iteration {
                metric: mock_metric(true, &vu, 100, 0.4),
                think_time: secs(60),
            }
        })
        .await;

        assert_eq!(agg.total, 5);
    }

    #[tokio::test]
    async fn invalid_timeline_aborts_before_spawning() {
        let err = Scenario::<ScrapeAggregate, _, _, _>::builder()
            .name("broken")
            .action(|vu: Vu| async move {
                Iteration {
                    metric: mock_metric(true, &vu, 100, 0.4),
                    think_time: Duration::ZERO,
                }
            })
            .executor(PhaseExecutor::builder().phases(vec![]).build())
            .build()
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, PhaseError::Config(ConfigError::NoPhases)));
    }
}
