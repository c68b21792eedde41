//! The full capacity test: three phases probing current load, gradual
//! scaling, and the limit, against a 100-site population with a 40% heavy
//! mix. Point `SCRAPE_BASE_URL` at the service under test.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use sitecap::{
    executor::{Phase, PhaseExecutor, RampStep},
    report::{CapacityReport, JsonFileReporter, Reporter, StdoutReporter},
    scrape::ScrapeClient,
    Iteration, RunConfig, Scenario, ScrapeAggregate, Vu,
};

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let base_url = std::env::var("SCRAPE_BASE_URL")
        .unwrap_or_else(|_| "http://host.docker.internal:8002".into());

    let config = RunConfig::builder()
        .base_url(base_url)
        .population(100)
        .heavy_ratio(0.4)
        .phases(vec![
            // Today's fleet: 43 sites, held steady.
            Phase::constant("current", Duration::ZERO, 43, minutes(3)),
            // Step up to 60, settle, then to 80.
            Phase::ramp(
                "scaling",
                minutes(3),
                43,
                vec![
                    RampStep::new(minutes(1), 60),
                    RampStep::new(minutes(1), 60),
                    RampStep::new(minutes(1), 80),
                    RampStep::new(minutes(1), 80),
                ],
            ),
            // Push to the full population and hold.
            Phase::ramp(
                "limit",
                minutes(7),
                80,
                vec![
                    RampStep::new(minutes(1), 100),
                    RampStep::new(minutes(2), 100),
                ],
            ),
        ])
        .build();
    config.validate()?;

    // One client for the whole run; building it inside the action would
    // distort the measurements.
    let client = ScrapeClient::new(
        &config.base_url,
        config.request_timeout,
        config.latency_ceiling,
    )?;
    let population = config.population;
    let heavy_ratio = config.heavy_ratio;
    let pacing = config.pacing;

    let aggregate: ScrapeAggregate = Scenario::builder()
        .name("scrape capacity")
        .action(move |vu: Vu| {
            let client = client.clone();
            async move {
                let target = sitecap::site_target(vu.index, population, heavy_ratio);
                let metric = client.scrape(&target, &vu.phase).await;
                let mut rng = SmallRng::from_entropy();
                let think_time = pacing.think_time(target.class, &mut rng);
                Iteration { metric, think_time }
            }
        })
        .executor(
            PhaseExecutor::builder()
                .phases(config.phases.clone())
                .build(),
        )
        .build()
        .run()
        .await?;

    let report = CapacityReport::from(aggregate);
    StdoutReporter.report(&report).await?;
    JsonFileReporter::new("results/capacity-report.json")
        .report(&report)
        .await?;

    if !config.thresholds.passed(&report) {
        tracing::warn!(
            "thresholds failed: error rate {:.2}%, p95 {:?}",
            report.error_rate * 100.0,
            report.percentiles.p95
        );
        std::process::exit(1);
    }
    Ok(())
}
