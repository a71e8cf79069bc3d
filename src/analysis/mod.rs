//! Batch analysis of harvested records through an LLM endpoint.
//!
//! Records are sent in one batch with stable index keys (`post_1`, `post_2`,
//! ...) so the model can echo identifiers back reliably; the reply is mapped
//! to real document ids afterwards. The response contract is strict JSON, but
//! models decorate it anyway, so parsing tolerates fenced code blocks and
//! surrounding prose. Rate-limit responses are retried with truncated
//! exponential backoff.

mod parse;

pub use parse::{Analysis, Sentiment, extract_json_object, map_results};

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use crate::error::{HarvestError, HarvestResult};
use crate::store::{HarvestStore, StoredRecord};

/// Max attempts against a rate-limited endpoint.
const MAX_ATTEMPTS: u32 = 5;

/// Base backoff; actual delay is `base * 2^(attempt-1)`.
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "models/gemini-2.0-flash";

/// Resolve the analysis API key.
///
/// Priority: explicit value → `GEMINI_API_KEY` env → `GEMINI_KEY` env.
/// A missing key is a configuration failure and aborts before any call.
pub fn resolve_api_key(explicit: Option<&str>) -> HarvestResult<String> {
    if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    for var in ["GEMINI_API_KEY", "GEMINI_KEY"] {
        if let Some(key) = std::env::var(var)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
        {
            return Ok(key);
        }
    }
    Err(HarvestError::Config(
        "analysis API key is not set (GEMINI_API_KEY)".into(),
    ))
}

pub struct AnalysisClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnalysisClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different endpoint root. Used by tests.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Analyze a batch of records, returning results keyed by document id.
    /// Identities the model dropped are simply absent from the map.
    pub async fn analyze_records(
        &self,
        records: &[StoredRecord],
    ) -> HarvestResult<HashMap<String, Analysis>> {
        if records.is_empty() {
            return Ok(HashMap::new());
        }

        // Stable index keys the model can echo back without mangling long ids.
        let index_map: Vec<(String, String)> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (format!("post_{}", i + 1), r.doc_id.clone()))
            .collect();

        let prompt = build_batch_prompt(records, &index_map);
        let raw_text = self.call_with_backoff(&prompt).await?;

        let parsed = extract_json_object(&raw_text)
            .map_err(|e| HarvestError::Analysis(format!("unparseable model reply: {e}")))?;
        let results = parsed
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let doc_ids: Vec<String> = records.iter().map(|r| r.doc_id.clone()).collect();
        let out = map_results(&results, &index_map, &doc_ids);
        info!(requested = records.len(), returned = out.len(), "Analysis batch complete");
        Ok(out)
    }

    async fn call_with_backoff(&self, prompt: &str) -> HarvestResult<String> {
        let url = format!(
            "{}/v1beta/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| HarvestError::Analysis(format!("request failed: {e}")))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| HarvestError::Analysis(format!("response read failed: {e}")))?;

            if status.as_u16() == 429 || text.contains("RESOURCE_EXHAUSTED") {
                if attempt < MAX_ATTEMPTS {
                    let wait = INITIAL_BACKOFF * 2u32.pow(attempt - 1);
                    warn!(
                        attempt,
                        wait_secs = wait.as_secs(),
                        "Analysis endpoint rate-limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
                return Err(HarvestError::Analysis(format!(
                    "still rate-limited after {MAX_ATTEMPTS} attempts"
                )));
            }

            if !status.is_success() {
                return Err(HarvestError::Analysis(format!(
                    "endpoint returned {status}: {}",
                    text.chars().take(300).collect::<String>()
                )));
            }

            let value: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| HarvestError::Analysis(format!("non-JSON response body: {e}")))?;
            return response_text(&value).ok_or_else(|| {
                HarvestError::Analysis("response contained no candidate text".into())
            });
        }
        unreachable!("retry loop returns on final attempt")
    }
}

/// Concatenated text of the first candidate's parts.
fn response_text(body: &serde_json::Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

fn build_batch_prompt(records: &[StoredRecord], index_map: &[(String, String)]) -> String {
    let reverse: HashMap<&str, &str> = index_map
        .iter()
        .map(|(key, id)| (id.as_str(), key.as_str()))
        .collect();
    let batch: Vec<serde_json::Value> = records
        .iter()
        .map(|record| {
            json!({
                "_id": reverse.get(record.doc_id.as_str()).copied().unwrap_or(record.doc_id.as_str()),
                "raw_text": record.raw_text,
            })
        })
        .collect();

    format!(
        "You are a multilingual analyst specialising in social media posts. \
         For EACH post object below:\n\
         1. **translation** - translate the text to English (keep as-is if already English).\n\
         2. **sentiment** - one of: Anxiety, Anger, Joy, Neutral.\n\
         3. **risk_score** - integer 1-10 (10 = most urgent / concerning).\n\
         4. **topics** - short array of topic strings.\n\n\
         Return **strictly valid JSON** with this exact shape:\n\
         {{\"results\": [\n  \
         {{\"_id\": \"<same _id from input>\", \"translation\": \"...\", \
         \"sentiment\": \"...\", \"risk_score\": N, \"topics\": [...]}}\n]}}\n\n\
         Posts:\n{}",
        serde_json::to_string_pretty(&batch).unwrap_or_else(|_| "[]".into())
    )
}

/// Fetch pending records, analyze them, and write results back.
///
/// Returns the number of records transitioned. A failed analysis call marks
/// the whole batch `error` so it does not sit pending forever.
pub async fn process_pending(
    store: &HarvestStore,
    client: &AnalysisClient,
    limit: u32,
) -> HarvestResult<u32> {
    let pending = store.pending_records(limit).await?;
    if pending.is_empty() {
        return Ok(0);
    }

    let mut updated = 0;
    match client.analyze_records(&pending).await {
        Ok(by_id) => {
            for record in &pending {
                match by_id.get(&record.doc_id) {
                    Some(analysis) => {
                        let value = serde_json::to_value(analysis)
                            .map_err(|e| HarvestError::Analysis(e.to_string()))?;
                        store
                            .mark_processed(&record.doc_id, Some(&value), "processed")
                            .await?;
                    }
                    None => {
                        store.mark_processed(&record.doc_id, None, "error").await?;
                    }
                }
                updated += 1;
            }
        }
        Err(e) => {
            warn!("Analysis batch failed, marking records as error: {e}");
            for record in &pending {
                store.mark_processed(&record.doc_id, None, "error").await?;
                updated += 1;
            }
        }
    }
    Ok(updated)
}
