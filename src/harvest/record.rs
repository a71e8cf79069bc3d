//! The unit of harvest output.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Which extraction strategy produced a record. Tags survive into the store
/// so low-signal runs are distinguishable from healthy ones downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStrategy {
    ContainerPost,
    PermalinkFallback,
    PageFallback,
    EmergencyFallback,
    BatchError,
}

impl SourceStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContainerPost => "container_post",
            Self::PermalinkFallback => "permalink_fallback",
            Self::PageFallback => "page_fallback",
            Self::EmergencyFallback => "emergency_fallback",
            Self::BatchError => "batch_error",
        }
    }
}

/// One extracted content item.
///
/// Created by exactly one extraction strategy invocation and immutable after
/// that, except for `target_url`, which batch runs attach afterwards to tie
/// the record back to the input link that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Normalized identity URL, unique within one run.
    pub url: String,
    /// Raw visible text. Non-empty for non-fallback records.
    pub raw_text: String,
    /// Best-effort comment texts, in discovery order.
    pub comments: Vec<String>,
    /// Always `comments.len()` for container-derived records.
    pub comment_count: usize,
    pub source_strategy: SourceStrategy,
    /// ISO-8601 UTC capture timestamp.
    pub scraped_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

impl ContentRecord {
    pub fn new(
        url: impl Into<String>,
        raw_text: impl Into<String>,
        comments: Vec<String>,
        source_strategy: SourceStrategy,
    ) -> Self {
        let comment_count = comments.len();
        Self {
            url: url.into(),
            raw_text: raw_text.into(),
            comments,
            comment_count,
            source_strategy,
            scraped_at: now_iso(),
            target_url: None,
        }
    }

    /// Emergency placeholder embedding the failure reason, so a failed run is
    /// observable downstream instead of silently empty.
    pub fn emergency(target_url: &str, reason: &str) -> Self {
        let mut text =
            "No extractable post containers found. Emergency fallback record.".to_string();
        if !reason.is_empty() {
            text = format!("{text} Reason: {reason}");
        }
        Self::new(target_url, text, Vec::new(), SourceStrategy::EmergencyFallback)
    }

    /// Batch-element failure marker for one target of a multi-target batch.
    pub fn batch_error(target_url: &str, reason: &str) -> Self {
        let mut record = Self::new(
            target_url,
            format!("Harvest task failed before producing records. Reason: {reason}"),
            Vec::new(),
            SourceStrategy::BatchError,
        );
        record.target_url = Some(target_url.to_string());
        record
    }
}

pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Per-record callback for callers that want incremental persistence rather
/// than a final batch. Implementations must not raise for expected business
/// conditions (duplicates are the persistence layer's own concern); errors
/// are logged by the engine and never fail the run.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn deliver(&self, record: &ContentRecord) -> anyhow::Result<()>;
}
