//! Reduce raw model output to candidate events.

use serde_json::Value;
use snapcal_schema::CandidateEvent;
use thiserror::Error;

use crate::fallback;

/// Strict parse failed. Always recovered by the fallback extractor.
#[derive(Debug, Error)]
#[error("unparsable model response: {0}")]
pub(crate) struct UnparsableResponse(#[from] serde_json::Error);

/// Remove a surrounding ```json / ``` fence and trim whitespace.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest);
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Read candidates from an already-parsed JSON value. Arrays yield their
/// object elements; anything else yields nothing.
pub(crate) fn candidates_from_value(value: &Value) -> Vec<CandidateEvent> {
    match value {
        Value::Array(items) => items.iter().filter_map(CandidateEvent::from_value).collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn parse_strict(cleaned: &str) -> Result<Vec<CandidateEvent>, UnparsableResponse> {
    let value: Value = serde_json::from_str(cleaned)?;
    Ok(candidates_from_value(&value))
}

/// Full parse stage: fence stripping, strict JSON, then best-effort recovery.
/// Never fails; the worst case is an empty list.
pub fn parse_candidates(raw: &str) -> Vec<CandidateEvent> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        tracing::debug!("model returned empty text");
        return Vec::new();
    }

    match parse_strict(cleaned) {
        Ok(candidates) => candidates,
        Err(err) => {
            tracing::warn!(error = %err, response = raw, "strict parse failed, running fallback extractor");
            let recovered = fallback::extract(raw);
            tracing::debug!(recovered = recovered.len(), "fallback extractor finished");
            recovered
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        assert_eq!(
            strip_code_fences("```json\n[{\"title\":\"Gala\"}]\n```"),
            "[{\"title\":\"Gala\"}]"
        );
    }

    #[test]
    fn strips_bare_fence_and_whitespace() {
        assert_eq!(strip_code_fences("  ```\n[]\n```  \n"), "[]");
        assert_eq!(strip_code_fences("\n [] \n"), "[]");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fences("Sorry."), "Sorry.");
    }

    #[test]
    fn parses_plain_array() {
        let candidates = parse_candidates(r#"[{"title":"A"},{"title":"B"}]"#);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].title.as_deref(), Some("B"));
    }

    #[test]
    fn parses_fenced_array() {
        let candidates = parse_candidates("```json\n[{\"title\":\"Gala\"}]\n```");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title.as_deref(), Some("Gala"));
        assert!(candidates[0].start_date.is_none());
    }

    #[test]
    fn non_array_json_is_empty() {
        assert!(parse_candidates(r#"{"title":"Gala"}"#).is_empty());
        assert!(parse_candidates("42").is_empty());
        assert!(parse_candidates("null").is_empty());
    }

    #[test]
    fn non_object_elements_are_skipped() {
        let candidates = parse_candidates(r#"[null, "Gala", {"title":"Kept"}, 3]"#);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title.as_deref(), Some("Kept"));
    }

    #[test]
    fn empty_and_blank_text_are_empty() {
        assert!(parse_candidates("").is_empty());
        assert!(parse_candidates("   \n").is_empty());
        assert!(parse_candidates("```json\n```").is_empty());
    }

    #[test]
    fn refusal_text_falls_back_to_empty() {
        assert!(parse_candidates("Sorry, I cannot help with that.").is_empty());
    }

    #[test]
    fn strict_parse_reports_unparsable() {
        assert!(parse_strict("[{").is_err());
        assert!(parse_strict("[]").unwrap().is_empty());
    }
}
