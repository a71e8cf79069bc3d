//! Model-reply parsing and result mapping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Closed sentiment set; anything else the model invents degrades to Neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Anxiety,
    Anger,
    Joy,
    Neutral,
}

impl Sentiment {
    fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "anxiety" => Self::Anxiety,
            "anger" => Self::Anger,
            "joy" => Self::Joy,
            _ => Self::Neutral,
        }
    }
}

/// One record's analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub translation: String,
    pub sentiment: Sentiment,
    /// 1-10, 10 most urgent. Out-of-range model output is clamped.
    pub risk_score: u8,
    pub topics: Vec<String>,
}

impl Analysis {
    fn from_item(item: &serde_json::Value) -> Option<Self> {
        let obj = item.as_object()?;
        let translation = obj
            .get("translation")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let sentiment = obj
            .get("sentiment")
            .and_then(|v| v.as_str())
            .map(Sentiment::from_label)
            .unwrap_or(Sentiment::Neutral);
        let risk_score = obj
            .get("risk_score")
            .and_then(|v| v.as_i64())
            .unwrap_or(1)
            .clamp(1, 10) as u8;
        let topics = obj
            .get("topics")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            translation,
            sentiment,
            risk_score,
            topics,
        })
    }
}

/// Parse a JSON object out of raw model text, tolerating fenced code blocks
/// and prose before or after the payload.
pub fn extract_json_object(text: &str) -> Result<serde_json::Value, String> {
    let mut candidate = text.trim();
    if candidate.is_empty() {
        return Err("model returned empty text".into());
    }

    if candidate.starts_with("```") {
        candidate = candidate.trim_matches('`').trim();
        if let Some(stripped) = candidate.strip_prefix("json") {
            candidate = stripped.trim();
        }
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate)
        && value.is_object()
    {
        return Ok(value);
    }

    // Fall back to the outermost braces.
    let start = candidate.find('{');
    let end = candidate.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err("reply does not contain a JSON object".into());
    };
    if end <= start {
        return Err("reply does not contain a JSON object".into());
    }

    let value: serde_json::Value = serde_json::from_str(&candidate[start..=end])
        .map_err(|e| format!("sliced JSON did not parse: {e}"))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err("JSON payload is not an object".into())
    }
}

/// Map model result items back to real document ids.
///
/// Keyed matching first: each item's `_id` is looked up in the index map
/// (items carrying a real id already pass through). When keyed matching
/// produced nothing but the model returned exactly one item per input, fall
/// back to zipping by position — an explicit best-effort heuristic with no
/// correctness guarantee if the model reordered or dropped items.
pub fn map_results(
    results: &[serde_json::Value],
    index_map: &[(String, String)],
    doc_ids: &[String],
) -> HashMap<String, Analysis> {
    let by_key: HashMap<&str, &str> = index_map
        .iter()
        .map(|(key, id)| (key.as_str(), id.as_str()))
        .collect();

    let mut out = HashMap::new();
    for item in results {
        let Some(returned_key) = item.get("_id").and_then(|v| v.as_str()) else {
            continue;
        };
        let real_id = by_key.get(returned_key).copied().unwrap_or(returned_key);
        if !doc_ids.iter().any(|id| id == real_id) {
            continue;
        }
        if let Some(analysis) = Analysis::from_item(item) {
            out.insert(real_id.to_string(), analysis);
        }
    }

    if out.is_empty() && results.len() == doc_ids.len() {
        warn!("Keyed result matching failed, zipping by position (best effort)");
        for (item, doc_id) in results.iter().zip(doc_ids) {
            if let Some(analysis) = Analysis::from_item(item) {
                out.insert(doc_id.clone(), analysis);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index_map() -> Vec<(String, String)> {
        vec![
            ("post_1".into(), "doc-a".into()),
            ("post_2".into(), "doc-b".into()),
        ]
    }

    #[test]
    fn plain_json_parses() {
        let value = extract_json_object(r#"{"results": []}"#).unwrap();
        assert!(value.get("results").is_some());
    }

    #[test]
    fn fenced_json_parses() {
        let value = extract_json_object("```json\n{\"results\": [1]}\n```").unwrap();
        assert_eq!(value["results"][0], 1);
    }

    #[test]
    fn json_embedded_in_prose_parses() {
        let value =
            extract_json_object("Here you go:\n{\"results\": []}\nHope that helps!").unwrap();
        assert!(value.get("results").is_some());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(extract_json_object("no json here").is_err());
        assert!(extract_json_object("").is_err());
    }

    #[test]
    fn keyed_mapping_resolves_index_keys() {
        let results = vec![json!({
            "_id": "post_2",
            "translation": "hello",
            "sentiment": "Joy",
            "risk_score": 3,
            "topics": ["greeting"]
        })];
        let out = map_results(&results, &index_map(), &["doc-a".into(), "doc-b".into()]);
        assert_eq!(out.len(), 1);
        let analysis = &out["doc-b"];
        assert_eq!(analysis.sentiment, Sentiment::Joy);
        assert_eq!(analysis.risk_score, 3);
    }

    #[test]
    fn positional_fallback_only_on_full_count_mismatch() {
        // Mangled keys, matching count: fall back to position.
        let results = vec![
            json!({"_id": "mangled_1", "translation": "a", "sentiment": "Anger", "risk_score": 9, "topics": []}),
            json!({"_id": "mangled_2", "translation": "b", "sentiment": "Neutral", "risk_score": 1, "topics": []}),
        ];
        let out = map_results(&results, &index_map(), &["doc-a".into(), "doc-b".into()]);
        assert_eq!(out.len(), 2);
        assert_eq!(out["doc-a"].sentiment, Sentiment::Anger);

        // Mangled keys, wrong count: no guesswork, empty result.
        let out = map_results(&results[..1].to_vec(), &index_map(), &["doc-a".into(), "doc-b".into()]);
        assert!(out.is_empty());
    }

    #[test]
    fn unknown_sentiment_and_wild_scores_are_tamed() {
        let item = json!({
            "_id": "post_1",
            "translation": "x",
            "sentiment": "Exuberant",
            "risk_score": 42,
            "topics": []
        });
        let out = map_results(
            &[item],
            &index_map(),
            &["doc-a".into(), "doc-b".into()],
        );
        assert_eq!(out["doc-a"].sentiment, Sentiment::Neutral);
        assert_eq!(out["doc-a"].risk_score, 10);
    }
}
