use serde::{Deserialize, Serialize};
use std::fmt;

/// The two classes of scrape traffic, with very different resource costs on
/// the target host.
///
/// `Heavy` scrapes go through a full browser-automation pipeline on the
/// service side (hundreds of MB per instance); `Light` scrapes are plain HTTP
/// fetches (tens of MB). The class decides the `use_playwright` flag on the
/// outbound request and the think-time band between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadClass {
    Heavy,
    Light,
}

impl WorkloadClass {
    pub fn is_heavy(self) -> bool {
        matches!(self, WorkloadClass::Heavy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadClass::Heavy => "heavy",
            WorkloadClass::Light => "light",
        }
    }
}

impl fmt::Display for WorkloadClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One site in the simulated population. Generated once per iteration from
/// the VU index, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
pub struct SiteTarget {
    /// Stable identifier, `site_NNN`.
    pub id: String,
    pub class: WorkloadClass,
}

/// Map a virtual user to its site.
///
/// `vu_index` is 1-based (VU numbering starts at 1) and wraps around the
/// finite site population, so a run may drive more VUs than there are sites.
/// The first `floor(population * heavy_ratio)` slots are [`WorkloadClass::Heavy`],
/// the rest [`WorkloadClass::Light`]. Deterministic: the same VU always crawls
/// the same site.
///
/// Callers guarantee `population > 0` ([`crate::config::RunConfig::validate`]
/// rejects anything else before a VU ever spawns).
pub fn site_target(vu_index: u64, population: usize, heavy_ratio: f64) -> SiteTarget {
    let slot = (vu_index.saturating_sub(1) as usize) % population;
    let heavy_slots = (population as f64 * heavy_ratio).floor() as usize;
    let class = if slot < heavy_slots {
        WorkloadClass::Heavy
    } else {
        WorkloadClass::Light
    };
    SiteTarget {
        id: format!("site_{slot:03}"),
        class,
    }
}
