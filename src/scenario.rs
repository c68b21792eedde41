use std::future::Future;
use std::marker::PhantomData;

use typed_builder::TypedBuilder;

use crate::aggregate::Aggregate;
use crate::executor::{Executor, Iteration, Vu};

/// Glue that ties a run together: a name, the per-iteration action, and the
/// executor that schedules it.
///
/// The action receives the [`Vu`] identity for the iteration (stable index
/// plus active phase tag) and returns an [`Iteration`]: the metric to record
/// and the think time before the VU's next pass. Keep heavy objects (HTTP
/// clients, buffers) outside the action and clone cheap handles into it;
/// building them per iteration would distort the measurements.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Scenario<A, E, F, Fut>
where
    A: Aggregate,
    E: Executor<A, F, Fut> + Send + Sync,
    F: Fn(Vu) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Iteration<A::Metric>> + Send,
{
    #[builder(setter(into))]
    pub name: String,
    pub action: F,
    pub executor: E,
    #[builder(default, setter(skip))]
    aggregate: PhantomData<A>,
}

impl<A, E, F, Fut> Scenario<A, E, F, Fut>
where
    A: Aggregate,
    E: Executor<A, F, Fut> + Send + Sync,
    F: Fn(Vu) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Iteration<A::Metric>> + Send,
{
    /// Hand the scenario to its executor and wait for the final aggregate.
    pub async fn run(&self) -> Result<A, E::Error> {
        self.executor.exec(self).await
    }
}
