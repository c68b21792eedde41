//! Executor: orchestration of runtime execution and concurrency control.
//!
//! The `Executor` trait is the runtime that executes a `Scenario`. Different
//! executors provide different execution strategies; the built-in
//! [`PhaseExecutor`] drives a pool of virtual users whose active count
//! follows a list of time-ordered [`Phase`]s, which is the strategy a
//! capacity test needs.

pub mod phase;
pub use phase::{Phase, PhaseError, PhaseExecutor, RampStep, Trajectory};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{aggregate::Aggregate, scenario::Scenario};

/// Identity handed to the scenario action for each iteration.
///
/// `index` is 1-based and stable for the lifetime of the run: the same VU
/// keeps the same index across iterations and across phase boundaries, which
/// is what pins each VU to a single site.
#[derive(Debug, Clone)]
pub struct Vu {
    pub index: u64,
    /// Tag of the phase that was active when the iteration started.
    pub phase: Arc<str>,
}

/// What one VU iteration hands back to the executor: the sample to record and
/// how long this VU should idle before its next pass.
///
/// The think time is chosen by the scenario (it knows the workload class and
/// owns the random source); the executor owns the actual suspension so it can
/// cancel it when the run ends.
#[derive(Debug, Clone)]
pub struct Iteration<M> {
    pub metric: M,
    pub think_time: Duration,
}

/// The runtime hook that executes a `Scenario`.
///
/// `Executor` defines the execution strategy for a given scenario: how many
/// VUs are live at any instant, how their iterations are paced, and how the
/// shared collector state is drained into the final aggregate.
pub trait Executor<A, F, Fut>
where
    Self: Send + Sync + Sized,
    A: Aggregate,
    F: Fn(Vu) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Iteration<A::Metric>> + Send,
{
    type Error;

    /// Execute the scenario and return the final aggregate.
    ///
    /// Implementations must take the result snapshot only after every VU has
    /// stopped contributing samples.
    fn exec(
        &self,
        scenario: &Scenario<A, Self, F, Fut>,
    ) -> impl Future<Output = Result<A, Self::Error>> + Send;
}
