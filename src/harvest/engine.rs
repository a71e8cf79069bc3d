//! The harvest loop: Navigating → Settling ⇄ Harvesting → Finalizing → Done.
//!
//! The loop owns the dedup ledger and drives the traversal surface. There is
//! no event announcing that a virtualized feed has finished growing, so
//! liveness is decided by a stall counter over the distinct-identity count,
//! bounded above by an absolute cycle cap. Downstream treats an empty result
//! as worse than a diagnostic record, so a run always returns a non-empty
//! list rather than raising.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::extract::{
    click_page_expand_controls, collect_from_permalink_links, collect_page_level, deliver,
    harvest_visible_posts,
};
use super::ledger::DedupLedger;
use super::record::{ContentRecord, RecordSink};
use super::selectors::PROBE_SELECTORS;
use crate::config::HarvestConfig;
use crate::error::{HarvestError, HarvestResult};
use crate::surface::{ChromiumSurface, FeedSurface, ReadyState, launch_browser};

/// Consecutive non-growing cycles required to stop (once `min_cycles` ran).
const STALL_THRESHOLD: u32 = 3;

/// Consecutive unchanged probe polls required to consider the feed settled.
const SETTLE_ROUNDS: u32 = 2;

/// Interval between probe polls while settling.
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(800);

/// Bounded wait for the fuller load signal during tier-two navigation.
const FULL_LOAD_TIMEOUT: Duration = Duration::from_secs(20);

/// Grace pause before proceeding unconditionally (tier three).
const NAV_GRACE_PAUSE: Duration = Duration::from_secs(2);

/// Harvest one target feed with a real browser session.
///
/// The session is exclusively owned by this run and released on every exit
/// path before the result is returned. Errors establishing the session are
/// the only ones surfaced; once the loop is running, failures are converted
/// into diagnostic records instead.
pub async fn harvest_feed(
    config: &HarvestConfig,
    sink: Option<&dyn RecordSink>,
) -> HarvestResult<Vec<ContentRecord>> {
    let session = launch_browser(config.headless())
        .await
        .map_err(|e| HarvestError::Browser(format!("{e:#}")))?;

    let result = async {
        let page = session
            .new_page(config.session_state().map(|p| p.as_path()))
            .await
            .map_err(|e| HarvestError::Browser(format!("{e:#}")))?;
        let surface = ChromiumSurface::new(page);
        Ok(run_on_surface(config, &surface, sink).await)
    }
    .await;

    session.close().await;
    result
}

/// Run the harvest loop against an already-established surface.
///
/// Never raises: any error escaping the cycle loop is caught once here,
/// logged, and converted into the emergency placeholder path.
pub async fn run_on_surface(
    config: &HarvestConfig,
    surface: &dyn FeedSurface,
    sink: Option<&dyn RecordSink>,
) -> Vec<ContentRecord> {
    let target_url = config.target_url();
    let mut collected = Vec::new();
    let mut ledger = DedupLedger::new();

    if let Err(e) = drive_cycles(config, surface, sink, &mut collected, &mut ledger).await {
        warn!(target_url, "Harvest loop failed, falling back: {e:#}");
        if collected.is_empty() {
            let record = ContentRecord::emergency(target_url, &format!("{e:#}"));
            deliver(sink, &record).await;
            collected.push(record);
        }
    }

    if collected.is_empty() {
        let record = ContentRecord::emergency(target_url, "");
        deliver(sink, &record).await;
        collected.push(record);
    }

    info!(
        target_url,
        records = collected.len(),
        distinct = ledger.len(),
        "Harvest run complete"
    );
    collected
}

async fn drive_cycles(
    config: &HarvestConfig,
    surface: &dyn FeedSurface,
    sink: Option<&dyn RecordSink>,
    collected: &mut Vec<ContentRecord>,
    ledger: &mut DedupLedger,
) -> anyhow::Result<()> {
    let target_url = config.target_url();

    navigate_resilient(surface, target_url, config.nav_timeout()).await;

    // A redirect away from the target (login wall, interstitial) is worth a
    // trace even though harvesting proceeds on whatever rendered.
    if let Ok(Some(landed)) = surface.current_url().await
        && landed != target_url
    {
        debug!(landed, "Landed on a different URL after navigation");
    }

    let min_cycles = config.min_cycles();
    let max_cycles = config.max_cycles();
    let mut no_growth: u32 = 0;

    for cycle in 0..max_cycles {
        let before = ledger.len();

        // Harvest before scrolling as well: older nodes may be virtualized
        // out once the viewport moves.
        collected.extend(harvest_visible_posts(surface, target_url, ledger, sink).await);

        click_page_expand_controls(surface).await;

        let wheel_delta = rand::rng().random_range(1600..=3200);
        surface.scroll_by(wheel_delta).await?;
        surface.scroll_to_bottom().await?;

        wait_for_feed_settle(surface, SETTLE_ROUNDS).await;

        // Second harvest after dynamic content settles.
        collected.extend(harvest_visible_posts(surface, target_url, ledger, sink).await);

        let after = ledger.len();
        if after > before {
            no_growth = 0;
        } else {
            no_growth += 1;
        }
        debug!(
            cycle,
            before,
            after,
            no_growth,
            "Harvest cycle finished"
        );

        // Growth can be bursty; require both enough cycles and a stalled feed.
        if cycle + 1 >= min_cycles && no_growth >= STALL_THRESHOLD {
            info!(cycle, "Feed growth stalled, stopping scroll loop");
            break;
        }
    }

    // Finalizing: one last pass, then the broader fallback strategies.
    collected.extend(harvest_visible_posts(surface, target_url, ledger, sink).await);

    if collected.len() <= 1 {
        collected.extend(collect_from_permalink_links(surface, target_url, ledger, sink).await);
    }

    if collected.is_empty() {
        let record = collect_page_level(surface, target_url).await;
        deliver(sink, &record).await;
        collected.push(record);
    }

    Ok(())
}

/// Three-tier navigation resilience. The feed keeps long-lived requests open,
/// so a network-idle signal is unreliable; prefer the early content-loaded
/// signal and degrade from there. Never raises: the page is left in "best
/// available" state for harvesting to proceed.
async fn navigate_resilient(surface: &dyn FeedSurface, target_url: &str, nav_timeout: Duration) {
    // Tier 1: navigate and wait for initial content.
    match surface.navigate(target_url).await {
        Ok(()) => {
            if wait_for_ready(surface, ReadyState::Interactive, nav_timeout).await {
                // Got initial content; opportunistically wait for the fuller
                // load signal, but do not insist on it.
                wait_for_ready(surface, ReadyState::Complete, FULL_LOAD_TIMEOUT).await;
                return;
            }
            warn!(target_url, "Initial content-loaded wait timed out");
        }
        Err(e) => warn!(target_url, "Navigation attempt failed: {e:#}"),
    }

    // Tier 2: retry, waiting for the full load signal.
    match surface.navigate(target_url).await {
        Ok(()) => {
            if wait_for_ready(surface, ReadyState::Complete, FULL_LOAD_TIMEOUT).await {
                return;
            }
            warn!(target_url, "Full-load wait timed out");
        }
        Err(e) => warn!(target_url, "Navigation retry failed: {e:#}"),
    }

    // Tier 3: proceed unconditionally after a grace pause.
    if let Err(e) = surface.navigate(target_url).await {
        warn!(target_url, "Final navigation attempt failed, proceeding anyway: {e:#}");
    }
    surface.wait(NAV_GRACE_PAUSE).await;
}

/// Poll the readiness probe until it reaches `want` (or better). Returns
/// whether the state was observed before the deadline.
async fn wait_for_ready(surface: &dyn FeedSurface, want: ReadyState, timeout: Duration) -> bool {
    let poll = Duration::from_millis(250);
    let mut waited = Duration::ZERO;
    loop {
        match surface.ready_state().await {
            Ok(state) if state == ReadyState::Complete => return true,
            Ok(state) if want == ReadyState::Interactive && state.content_loaded() => return true,
            Ok(_) => {}
            Err(e) => debug!("readyState probe failed: {e:#}"),
        }
        if waited >= timeout {
            return false;
        }
        surface.wait(poll).await;
        waited += poll;
    }
}

/// Wait for the structural probe (candidate count + document height) to hold
/// still for `rounds` consecutive polls. Bounded at `2 * rounds` polls so a
/// permanently-fluctuating probe cannot stall the run.
async fn wait_for_feed_settle(surface: &dyn FeedSurface, rounds: u32) {
    let mut last_height: i64 = -1;
    let mut last_signal: i64 = -1;
    let mut stable_rounds: u32 = 0;

    for _ in 0..rounds * 2 {
        surface.wait(SETTLE_POLL_INTERVAL).await;

        let height = surface.document_height().await.unwrap_or(last_height);
        let signal = structural_probe(surface).await;

        if height == last_height && signal == last_signal {
            stable_rounds += 1;
            if stable_rounds >= rounds {
                break;
            }
        } else {
            stable_rounds = 0;
        }
        last_height = height;
        last_signal = signal;
    }
}

/// Cheap, repeatable measurement of visible feed richness.
async fn structural_probe(surface: &dyn FeedSurface) -> i64 {
    let mut total: i64 = 0;
    for selector in PROBE_SELECTORS {
        total += surface.count(selector).await.unwrap_or(0) as i64;
    }
    total
}
