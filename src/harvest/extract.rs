//! Extraction cascade: ordered strategies of decreasing specificity.
//!
//! Container extraction runs every cycle because it is the highest-fidelity
//! source. The broader strategies are reserved for under-delivering runs so
//! generic link matches do not drown true content. Failures inside any single
//! region are swallowed and the region skipped; losing one candidate must
//! never cost the cycle.

use std::time::Duration;

use tracing::{debug, warn};

use super::ledger::DedupLedger;
use super::normalize::{normalize_feed_url, synthetic_content_url};
use super::record::{ContentRecord, RecordSink, SourceStrategy};
use super::selectors::{
    COMMENT_EXPAND_PATTERNS, COMMENT_TEXT_PATTERNS, CONTAINER_SIGNATURES,
    MAX_COMMENTS_PER_POST, MAX_EXPAND_CLICKS_PER_PATTERN, MAX_PAGE_EXPAND_CLICKS,
    MAX_PAGE_SNIPPET_LEN, MAX_PERMALINK_SCAN, MIN_COMMENT_TEXT_LEN, MIN_POST_TEXT_LEN,
    PAGE_EXPAND_PATTERNS, PERMALINK_PATTERNS, PERMALINK_SCAN_SELECTOR,
};
use crate::surface::FeedSurface;

/// Pause after a simulated click so lazily-rendered nodes attach before the
/// next lookup.
const POST_CLICK_SETTLE: Duration = Duration::from_millis(200);

/// Primary strategy: collect currently visible post containers across all
/// known structural signatures. Deduplicates against the ledger and delivers
/// each accepted record to the sink as it is produced.
pub async fn harvest_visible_posts(
    surface: &dyn FeedSurface,
    target_url: &str,
    ledger: &mut DedupLedger,
    sink: Option<&dyn RecordSink>,
) -> Vec<ContentRecord> {
    let mut batch = Vec::new();
    for signature in CONTAINER_SIGNATURES {
        let count = surface.count(signature).await.unwrap_or(0);
        for index in 0..count {
            match extract_container(surface, signature, index, target_url, ledger).await {
                Ok(Some(record)) => {
                    deliver(sink, &record).await;
                    batch.push(record);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(signature, index, "Skipping container after extraction error: {e:#}");
                }
            }
        }
    }
    batch
}

/// Extract one candidate region into at most one record.
async fn extract_container(
    surface: &dyn FeedSurface,
    signature: &str,
    index: usize,
    target_url: &str,
    ledger: &mut DedupLedger,
) -> anyhow::Result<Option<ContentRecord>> {
    let raw_text = surface
        .inner_text(signature, index)
        .await?
        .map(|text| text.trim().to_string())
        .unwrap_or_default();
    if raw_text.len() < MIN_POST_TEXT_LEN {
        return Ok(None);
    }

    let permalink = extract_permalink(surface, signature, index, target_url).await;
    let identity =
        permalink.unwrap_or_else(|| synthetic_content_url(target_url, &raw_text, index));
    if !ledger.accept(&identity) {
        return Ok(None);
    }

    let comments = extract_comments(surface, signature, index, &raw_text).await;
    Ok(Some(ContentRecord::new(
        identity,
        raw_text,
        comments,
        SourceStrategy::ContainerPost,
    )))
}

/// Try the permalink patterns in order, scoped to one container; the first
/// href that normalizes wins.
async fn extract_permalink(
    surface: &dyn FeedSurface,
    signature: &str,
    index: usize,
    base_url: &str,
) -> Option<String> {
    for pattern in PERMALINK_PATTERNS {
        let links = surface
            .count_within(signature, index, pattern)
            .await
            .unwrap_or(0);
        for link_index in 0..links {
            let href = surface
                .attribute_within(signature, index, pattern, link_index, "href")
                .await
                .ok()
                .flatten();
            if let Some(href) = href
                && let Some(normalized) = normalize_feed_url(&href, base_url)
            {
                return Some(normalized);
            }
        }
    }
    None
}

/// Best-effort comment sub-extraction for one container.
///
/// Expands a bounded number of comment controls first (many layouts lazy-
/// render comment DOM only after expansion; a control that does not respond
/// is skipped), then scans the comment-text patterns for distinct fragments
/// that are not the post body re-captured.
async fn extract_comments(
    surface: &dyn FeedSurface,
    signature: &str,
    index: usize,
    raw_text: &str,
) -> Vec<String> {
    for pattern in COMMENT_EXPAND_PATTERNS {
        let controls = surface
            .count_within(signature, index, pattern)
            .await
            .unwrap_or(0)
            .min(MAX_EXPAND_CLICKS_PER_PATTERN);
        for control in 0..controls {
            if surface
                .click_within(signature, index, pattern, control)
                .await
                .is_ok()
            {
                surface.wait(POST_CLICK_SETTLE).await;
            }
        }
    }

    let mut comments: Vec<String> = Vec::new();
    for pattern in COMMENT_TEXT_PATTERNS {
        let nodes = surface
            .count_within(signature, index, pattern)
            .await
            .unwrap_or(0);
        for node in 0..nodes {
            let Some(text) = surface
                .inner_text_within(signature, index, pattern, node)
                .await
                .ok()
                .flatten()
            else {
                continue;
            };
            let text = text.trim();
            if text.len() < MIN_COMMENT_TEXT_LEN {
                continue;
            }
            // Guard against re-capturing the post body as its own comment.
            if text == raw_text || raw_text.contains(text) {
                continue;
            }
            if comments.iter().any(|seen| seen == text) {
                continue;
            }
            comments.push(text.to_string());
            if comments.len() >= MAX_COMMENTS_PER_POST {
                return comments;
            }
        }
    }
    comments
}

/// Click page-level expansion controls to expose more feed/comment nodes
/// between harvest passes. Unresponsive controls are skipped.
pub async fn click_page_expand_controls(surface: &dyn FeedSurface) {
    for pattern in PAGE_EXPAND_PATTERNS {
        let controls = surface
            .count(pattern)
            .await
            .unwrap_or(0)
            .min(MAX_PAGE_EXPAND_CLICKS);
        for control in 0..controls {
            if surface.click(pattern, control).await.is_ok() {
                surface.wait(POST_CLICK_SETTLE).await;
            }
        }
    }
}

/// Secondary strategy: harvest post-like links directly from page anchors.
/// Invoked when the structural signatures did not match this layout.
pub async fn collect_from_permalink_links(
    surface: &dyn FeedSurface,
    target_url: &str,
    ledger: &mut DedupLedger,
    sink: Option<&dyn RecordSink>,
) -> Vec<ContentRecord> {
    let mut collected = Vec::new();
    let count = surface
        .count(PERMALINK_SCAN_SELECTOR)
        .await
        .unwrap_or(0)
        .min(MAX_PERMALINK_SCAN);

    for index in 0..count {
        let Some(href) = surface
            .attribute(PERMALINK_SCAN_SELECTOR, index, "href")
            .await
            .ok()
            .flatten()
        else {
            continue;
        };
        let Some(normalized) = normalize_feed_url(&href, target_url) else {
            continue;
        };
        if !ledger.accept(&normalized) {
            continue;
        }

        let link_text = surface
            .inner_text(PERMALINK_SCAN_SELECTOR, index)
            .await
            .ok()
            .flatten()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "Permalink discovered from profile/page feed.".to_string());

        let record = ContentRecord::new(
            normalized,
            link_text,
            Vec::new(),
            SourceStrategy::PermalinkFallback,
        );
        deliver(sink, &record).await;
        collected.push(record);
    }
    collected
}

/// Tertiary strategy: one page-level record when the whole run found nothing.
/// Identity is the target URL itself, so no further dedup applies.
pub async fn collect_page_level(surface: &dyn FeedSurface, target_url: &str) -> ContentRecord {
    let title = surface
        .page_title()
        .await
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    let body_text = surface
        .body_text()
        .await
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let snippet_source = if body_text.is_empty() { &title } else { &body_text };
    let mut snippet: String = snippet_source
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_PAGE_SNIPPET_LEN)
        .collect();
    snippet = snippet.trim().to_string();
    if snippet.is_empty() {
        snippet = "No extractable post containers found. Fallback page-level record.".to_string();
    }

    ContentRecord::new(
        target_url,
        format!("{title}\n\n{snippet}").trim().to_string(),
        Vec::new(),
        SourceStrategy::PageFallback,
    )
}

/// Hand a record to the sink; sink failures are logged, never fatal.
pub(crate) async fn deliver(sink: Option<&dyn RecordSink>, record: &ContentRecord) {
    if let Some(sink) = sink
        && let Err(e) = sink.deliver(record).await
    {
        warn!(url = %record.url, "Record sink failed: {e:#}");
    }
}
