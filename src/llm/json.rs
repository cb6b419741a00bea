//! Parsing of JSON payloads returned as model text.
//!
//! Models are asked for a bare JSON array but frequently wrap it in a markdown
//! code fence. The fence is stripped, then the body must parse; anything else
//! is an error for the caller's retry policy to handle.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResponseParseError {
    #[error("Empty model response")]
    Empty,

    #[error("Model response is not valid JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
        /// First characters of the offending body, for logs.
        excerpt: String,
    },
}

/// Strip a surrounding markdown code fence (```json ... ```), if present.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    // Drop the opening fence line, including any language tag.
    let body = match trimmed.find('\n') {
        Some(newline) => &trimmed[newline + 1..],
        None => return trimmed.trim_start_matches('`').trim(),
    };

    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim()
}

/// Strip a code fence and deserialize the body.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Result<T, ResponseParseError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(ResponseParseError::Empty);
    }
    serde_json::from_str(body).map_err(|source| ResponseParseError::Json {
        source,
        excerpt: body.chars().take(120).collect(),
    })
}
