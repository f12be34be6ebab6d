//! Tolerant parsing of JSON emitted by models.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::InferenceError;

#[allow(clippy::expect_used)]
static LIST_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:子问题\s*\d+\s*[:：]|\d{1,2}\s*(?:[、)）:：]|\.\s)|[-*•]\s)\s*")
        .expect("label pattern is valid")
});

/// Removes a surrounding markdown code fence, if any.
pub(crate) fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = trimmed.trim_start_matches('`');
    // Drop the info string ("json", "JSON", ...) on the opening line.
    let body = body.split_once('\n').map_or(body, |(_, rest)| rest);
    body.trim_end().trim_end_matches('`').trim()
}

/// Parses a model answer as JSON.
///
/// Accepts a bare document, a fenced one, or a document embedded in prose
/// (first `{`/`[` to the matching last `}`/`]`).
pub(crate) fn extract_json(content: &str) -> Result<Value, InferenceError> {
    let body = strip_code_fence(content);
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(value);
    }

    let embedded = [('{', '}'), ('[', ']')].iter().find_map(|&(open, close)| {
        let start = body.find(open)?;
        let end = body.rfind(close)?;
        (end > start)
            .then(|| serde_json::from_str::<Value>(&body[start..=end]).ok())
            .flatten()
    });

    embedded.ok_or_else(|| InferenceError::Malformed {
        message: format!(
            "not valid JSON: {}",
            content.chars().take(120).collect::<String>()
        ),
    })
}

/// Strips list labels like `子问题1:` or `2.` from a proposed query.
pub(crate) fn clean_query(text: &str) -> String {
    LIST_LABEL.replace(text, "").trim().to_string()
}

/// Collects the string entries of a JSON array, cleaned, non-blank and
/// without case-insensitive repeats, in their original order.
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(Value::as_str)
        .map(clean_query)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}
