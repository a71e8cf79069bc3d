//! Abstraction over the rendering surface the harvester drives.
//!
//! The harvesting core never talks to a browser directly. It goes through the
//! narrow [`FeedSurface`] trait (locate, read, click, scroll, probe), which
//! keeps the loop and the extraction cascade testable against a scripted fake
//! with no Chromium process anywhere near the test suite.

mod browser;
mod chromium;

pub use browser::{BrowserSession, launch_browser};
pub use chromium::ChromiumSurface;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Document readiness, as reported by the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    pub fn from_document(value: &str) -> Self {
        match value {
            "complete" => Self::Complete,
            "interactive" => Self::Interactive,
            _ => Self::Loading,
        }
    }

    /// Whether initial content is available for harvesting.
    pub fn content_loaded(self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// A controllable rendering surface holding one loaded document.
///
/// All methods are suspension points; no two calls execute concurrently
/// within one run, so implementations need no interior locking for the
/// harvester's sake. Element addressing is positional (`selector` + `index`)
/// because handles on a virtualized feed go stale between cycles.
#[async_trait]
pub trait FeedSurface: Send + Sync {
    /// Load a URL. Completion of rendering is NOT implied; callers poll
    /// [`ready_state`](Self::ready_state) afterwards.
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn ready_state(&self) -> Result<ReadyState>;

    /// Number of nodes currently matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize>;

    async fn inner_text(&self, selector: &str, index: usize) -> Result<Option<String>>;

    async fn attribute(&self, selector: &str, index: usize, name: &str)
    -> Result<Option<String>>;

    async fn click(&self, selector: &str, index: usize) -> Result<()>;

    /// Number of nodes matching `selector` inside the `scope_index`-th node
    /// matching `scope`.
    async fn count_within(&self, scope: &str, scope_index: usize, selector: &str)
    -> Result<usize>;

    async fn inner_text_within(
        &self,
        scope: &str,
        scope_index: usize,
        selector: &str,
        index: usize,
    ) -> Result<Option<String>>;

    async fn attribute_within(
        &self,
        scope: &str,
        scope_index: usize,
        selector: &str,
        index: usize,
        name: &str,
    ) -> Result<Option<String>>;

    async fn click_within(
        &self,
        scope: &str,
        scope_index: usize,
        selector: &str,
        index: usize,
    ) -> Result<()>;

    async fn scroll_by(&self, pixels: i64) -> Result<()>;

    async fn scroll_to_bottom(&self) -> Result<()>;

    /// Current full document height, one input to the structural probe.
    async fn document_height(&self) -> Result<i64>;

    /// URL the surface currently displays, when known. Surfaces that cannot
    /// report one return `None`.
    async fn current_url(&self) -> Result<Option<String>> {
        Ok(None)
    }

    async fn page_title(&self) -> Result<String>;

    /// Visible text of the whole document body.
    async fn body_text(&self) -> Result<String>;

    /// Wait a fixed duration. Fakes override this to a no-op so settle and
    /// navigation tests run instantly.
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
