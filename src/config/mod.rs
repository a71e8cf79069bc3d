//! Configuration for harvest runs.
//!
//! `HarvestConfig` is assembled through a builder that validates required
//! fields at `build()` time. Missing required configuration is the only error
//! class allowed to abort before a run produces output.

mod builder;

pub use builder::HarvestConfigBuilder;

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{HarvestError, HarvestResult};

/// Default minimum number of scroll cycles before the stall heuristic may stop.
pub const DEFAULT_SCROLL_MIN: u32 = 5;

/// Default requested scroll cycles. The absolute cycle cap is derived from
/// this (`scroll_max + 6`) so bursty feeds get headroom past the request.
pub const DEFAULT_SCROLL_MAX: u32 = 10;

/// Default navigation timeout for the initial content-loaded wait.
pub const DEFAULT_NAV_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for a single harvest run (or each run of a batch).
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub(crate) target_url: String,
    pub(crate) headless: bool,
    pub(crate) scroll_min: u32,
    pub(crate) scroll_max: u32,
    pub(crate) session_state: Option<PathBuf>,
    pub(crate) nav_timeout: Duration,
}

impl HarvestConfig {
    /// Start building a config for the given target URL.
    pub fn builder(target_url: impl Into<String>) -> HarvestConfigBuilder {
        HarvestConfigBuilder::new(target_url)
    }

    /// Assemble a config from the process environment.
    ///
    /// Reads `TARGET_URL` (required), `HEADLESS`, `SCROLL_MIN`, `SCROLL_MAX`
    /// and `SESSION_STATE`. Fails fast with a descriptive error when the
    /// target URL is missing.
    pub fn from_env() -> HarvestResult<Self> {
        let target_url = std::env::var("TARGET_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| HarvestError::Config("TARGET_URL is not set".into()))?;

        let mut builder = Self::builder(target_url);

        if let Ok(headless) = std::env::var("HEADLESS") {
            builder = builder.headless(headless.trim().eq_ignore_ascii_case("true"));
        }
        if let Some(min) = read_env_u32("SCROLL_MIN") {
            builder = builder.scroll_min(min);
        }
        if let Some(max) = read_env_u32("SCROLL_MAX") {
            builder = builder.scroll_max(max);
        }
        if let Ok(path) = std::env::var("SESSION_STATE")
            && !path.trim().is_empty()
        {
            builder = builder.session_state(PathBuf::from(path));
        }

        builder.build()
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn headless(&self) -> bool {
        self.headless
    }

    pub fn scroll_min(&self) -> u32 {
        self.scroll_min
    }

    pub fn scroll_max(&self) -> u32 {
        self.scroll_max
    }

    pub fn session_state(&self) -> Option<&PathBuf> {
        self.session_state.as_ref()
    }

    pub fn nav_timeout(&self) -> Duration {
        self.nav_timeout
    }

    /// Minimum cycles the loop must run before the stall heuristic may stop it.
    pub fn min_cycles(&self) -> u32 {
        self.scroll_min.max(1)
    }

    /// Absolute cycle cap, derived from the requested scroll bounds.
    pub fn max_cycles(&self) -> u32 {
        self.min_cycles().max(self.scroll_max + 6)
    }
}

fn read_env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok()?.trim().parse().ok()
}
