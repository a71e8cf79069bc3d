//! Fluent builder for `HarvestConfig` with build-time validation.

use std::path::PathBuf;
use std::time::Duration;

use super::{DEFAULT_NAV_TIMEOUT, DEFAULT_SCROLL_MAX, DEFAULT_SCROLL_MIN, HarvestConfig};
use crate::error::{HarvestError, HarvestResult};

pub struct HarvestConfigBuilder {
    target_url: String,
    headless: bool,
    scroll_min: u32,
    scroll_max: u32,
    session_state: Option<PathBuf>,
    nav_timeout: Duration,
}

impl HarvestConfigBuilder {
    pub(crate) fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            headless: true,
            scroll_min: DEFAULT_SCROLL_MIN,
            scroll_max: DEFAULT_SCROLL_MAX,
            session_state: None,
            nav_timeout: DEFAULT_NAV_TIMEOUT,
        }
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn scroll_min(mut self, scroll_min: u32) -> Self {
        self.scroll_min = scroll_min;
        self
    }

    #[must_use]
    pub fn scroll_max(mut self, scroll_max: u32) -> Self {
        self.scroll_max = scroll_max;
        self
    }

    /// Path to a captured session-state blob (cookies) applied to the browser
    /// context before navigation.
    #[must_use]
    pub fn session_state(mut self, path: PathBuf) -> Self {
        self.session_state = Some(path);
        self
    }

    #[must_use]
    pub fn nav_timeout(mut self, timeout: Duration) -> Self {
        self.nav_timeout = timeout;
        self
    }

    /// Validate and build the config.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Config` when the target URL is empty or not an
    /// http(s) URL.
    pub fn build(self) -> HarvestResult<HarvestConfig> {
        let target_url = self.target_url.trim().to_string();
        if target_url.is_empty() {
            return Err(HarvestError::Config("target URL must not be empty".into()));
        }
        match url::Url::parse(&target_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return Err(HarvestError::Config(format!(
                    "target URL must be http(s), got scheme '{}'",
                    parsed.scheme()
                )));
            }
            Err(e) => {
                return Err(HarvestError::Config(format!(
                    "invalid target URL '{target_url}': {e}"
                )));
            }
        }

        Ok(HarvestConfig {
            target_url,
            headless: self.headless,
            scroll_min: self.scroll_min,
            scroll_max: self.scroll_max.max(self.scroll_min),
            session_state: self.session_state,
            nav_timeout: self.nav_timeout,
        })
    }
}
