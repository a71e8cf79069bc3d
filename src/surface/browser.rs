//! Browser lifecycle for harvest sessions.
//!
//! Launches chromiumoxide with stealth arguments, keeps the CDP event handler
//! on a tracked `JoinHandle`, and guarantees the session closes on every exit
//! path. The handler MUST be aborted once the browser is gone or it runs
//! forever.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::seq::IndexedRandom;
use serde::Deserialize;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Desktop user agents rotated per session so repeated runs do not present a
/// single fingerprint.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
];

/// One exclusively-owned browser session.
///
/// Scoped acquisition: [`close`](Self::close) must run on every exit path
/// before the run's result is returned. `Drop` aborts the handler as a
/// fallback so a panicking run still kills the Chrome process.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserSession {
    /// Open a new page, applying captured session-state cookies when present.
    pub async fn new_page(&self, session_state: Option<&Path>) -> Result<Page> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to create blank page")?;

        if let Some(path) = session_state {
            match load_session_cookies(path) {
                Ok(cookies) if !cookies.is_empty() => {
                    let count = cookies.len();
                    page.set_cookies(cookies)
                        .await
                        .context("Failed to apply session-state cookies")?;
                    info!(count, "Applied session-state cookies");
                }
                Ok(_) => debug!("Session-state file contained no cookies"),
                // A stale or malformed blob degrades to an anonymous session.
                Err(e) => warn!("Failed to load session state from {}: {e:#}", path.display()),
            }
        }

        Ok(page)
    }

    /// Shut the session down: close the browser, stop the handler, remove the
    /// temp profile.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close failed: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser wait after close: {e}");
        }
        self.handler.abort();
        if let Some(dir) = self.user_data_dir.take()
            && let Err(e) = std::fs::remove_dir_all(&dir)
        {
            warn!("Failed to remove temp profile {}: {e}", dir.display());
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(dir) = self.user_data_dir.take() {
            warn!("BrowserSession dropped without close(), removing temp profile in Drop");
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("Failed to remove temp profile {}: {e}", dir.display());
            }
        }
    }
}

/// Launch a browser for one harvest run.
///
/// Tries the auto-detected Chromium first; when no managed binary exists,
/// falls back to an explicit executable from `CHROME_BIN`. The returned
/// session owns the CDP event-handler task.
pub async fn launch_browser(headless: bool) -> Result<BrowserSession> {
    let user_data_dir = std::env::temp_dir().join(format!(
        "sentinel_profile_{}_{}",
        std::process::id(),
        chrono::Utc::now().timestamp_millis()
    ));
    std::fs::create_dir_all(&user_data_dir).context("Failed to create user data directory")?;

    let config = build_config(headless, &user_data_dir, None)?;

    let launched = match Browser::launch(config).await {
        Ok(pair) => Ok(pair),
        Err(e) => {
            // Managed binaries may be absent; retry with a locally installed
            // Chrome before giving up.
            let chrome_bin = std::env::var("CHROME_BIN").unwrap_or_default();
            if chrome_bin.is_empty() {
                Err(e)
            } else {
                warn!("Default browser launch failed ({e}), retrying with CHROME_BIN");
                let config = build_config(headless, &user_data_dir, Some(&chrome_bin))?;
                Browser::launch(config).await
            }
        }
    };

    let (browser, mut handler) = launched.context("Failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::error!("Browser handler error: {e:?}");
            }
        }
        debug!("Browser event handler task completed");
    });

    info!(headless, "Browser session launched");

    Ok(BrowserSession {
        browser,
        handler: handler_task,
        user_data_dir: Some(user_data_dir),
    })
}

fn build_config(
    headless: bool,
    user_data_dir: &Path,
    chrome_executable: Option<&str>,
) -> Result<BrowserConfig> {
    let user_agent = USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0]);

    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(1920, 1080)
        .user_data_dir(user_data_dir.to_path_buf())
        .headless_mode(if headless {
            HeadlessMode::New
        } else {
            HeadlessMode::False
        })
        .arg(format!("--user-agent={user_agent}"))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-desktop-notifications")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--no-sandbox")
        .arg("--disable-background-networking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-hang-monitor")
        .arg("--disable-popup-blocking")
        .arg("--disable-prompt-on-repost")
        .arg("--metrics-recording-only")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--mute-audio");

    if let Some(path) = chrome_executable {
        builder = builder.chrome_executable(path);
    }

    builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))
}

/// Captured session state, the shape written by the one-time login flow:
/// `{"cookies": [{"name": ..., "value": ..., "domain": ..., ...}]}`.
#[derive(Debug, Deserialize)]
struct SessionState {
    #[serde(default)]
    cookies: Vec<SessionCookie>,
}

#[derive(Debug, Deserialize)]
struct SessionCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    secure: Option<bool>,
    #[serde(default, rename = "httpOnly")]
    http_only: Option<bool>,
}

fn load_session_cookies(path: &Path) -> Result<Vec<CookieParam>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session state file {}", path.display()))?;
    let state: SessionState =
        serde_json::from_str(&raw).context("Session state is not valid JSON")?;

    let mut params = Vec::with_capacity(state.cookies.len());
    for cookie in state.cookies {
        let mut builder = CookieParam::builder().name(cookie.name).value(cookie.value);
        if let Some(domain) = cookie.domain {
            builder = builder.domain(domain);
        }
        if let Some(path) = cookie.path {
            builder = builder.path(path);
        }
        if let Some(secure) = cookie.secure {
            builder = builder.secure(secure);
        }
        if let Some(http_only) = cookie.http_only {
            builder = builder.http_only(http_only);
        }
        match builder.build() {
            Ok(param) => params.push(param),
            Err(e) => warn!("Skipping malformed session cookie: {e}"),
        }
    }
    Ok(params)
}
