use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;

use crate::metric::ScrapeMetric;
use crate::workload::SiteTarget;

/// Client for the one outbound request shape this engine knows:
/// `POST {base}/api/scrape/{site}?use_playwright={bool}` with an empty body.
///
/// One call is one attempt. Timeouts and transport errors become failed
/// samples, never retries: the point of the run is to measure the failure
/// rate under load, not to mask it.
#[derive(Debug, Clone)]
pub struct ScrapeClient {
    http: reqwest::Client,
    base_url: String,
    latency_ceiling: Duration,
}

/// The slice of the response body we care about. Anything else in the
/// payload is ignored.
#[derive(Debug, Deserialize)]
struct ScrapeTelemetry {
    memory_used_mb: Option<f64>,
}

impl ScrapeClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        latency_ceiling: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            latency_ceiling,
        })
    }

    /// Perform one scrape attempt and fold the outcome into a sample.
    ///
    /// Success requires all three: a 2xx status, a non-empty body, and a
    /// latency below the configured ceiling. Memory telemetry is read only
    /// from successful bodies, and a body that does not parse as telemetry
    /// is silently ignored; scraping success is defined by status and
    /// latency, not by the optional gauge.
    pub async fn scrape(&self, target: &SiteTarget, phase: &str) -> ScrapeMetric {
        let url = format!("{}/api/scrape/{}", self.base_url, target.id);
        let timestamp = Utc::now();
        let started = Instant::now();

        let outcome = async {
            let response = self
                .http
                .post(&url)
                .query(&[("use_playwright", target.class.is_heavy())])
                .send()
                .await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        }
        .await;
        let latency = started.elapsed();

        let (success, memory_mb) = match outcome {
            Ok((status, body)) => {
                let ok = status.is_success() && !body.is_empty() && latency < self.latency_ceiling;
                let memory = if ok { parse_memory(&body) } else { None };
                (ok, memory)
            }
            Err(e) => {
                tracing::debug!("scrape of {} failed: {e}", target.id);
                (false, None)
            }
        };

        ScrapeMetric {
            timestamp,
            latency,
            success,
            class: target.class,
            memory_mb,
            phase: phase.to_owned(),
        }
    }
}

/// Best-effort extraction of the service's memory gauge. Malformed bodies
/// yield `None`; the gauge is optional telemetry, not part of validation.
fn parse_memory(body: &[u8]) -> Option<f64> {
    serde_json::from_slice::<ScrapeTelemetry>(body)
        .ok()
        .and_then(|t| t.memory_used_mb)
}
