//! External scoring and analysis oracle.
//!
//! The oracle is an LLM reached over an OpenAI-compatible chat API. It is
//! treated as untrusted: it may be unconfigured, fail, or answer with text
//! that only loosely contains the JSON that was asked for. Callers decide how
//! to degrade; [`extract_json`] does the loose parsing.

mod chat;
pub mod mock;

pub use chat::ChatOracle;
pub use mock::MockOracle;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// A text-in, text-out completion service
#[async_trait]
pub trait Oracle: Send + Sync + std::fmt::Debug {
    /// Model identifier, for logging
    fn model(&self) -> &str;

    /// Complete a single user prompt
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Errors from the oracle
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// No credentials or unknown provider
    #[error("Oracle not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Non-success response from the provider
    #[error("API error: {0}")]
    Api(String),

    /// The answer did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Network(err.to_string())
    }
}

fn json_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"(?s)```json\s*(.*?)\s*```", r"(?s)```\s*(.*?)\s*```", r"(?s)\{.*\}"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Pull a JSON value out of free text
///
/// Tries, in order: the whole text, a fenced ```json block, any fenced block,
/// and the widest `{...}` span.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Some(value);
    }

    for pattern in json_patterns() {
        let Some(captures) = pattern.captures(text) else {
            continue;
        };
        let candidate = captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if let Ok(value) = serde_json::from_str(candidate) {
            return Some(value);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_raw_json() {
        assert_eq!(extract_json(r#" {"0": 80} "#), Some(json!({"0": 80})));
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here are the scores:\n```json\n{\"0\": 90, \"1\": 10}\n```\nDone.";
        assert_eq!(extract_json(text), Some(json!({"0": 90, "1": 10})));

        let text = "```\n{\"summary\": \"ok\"}\n```";
        assert_eq!(extract_json(text), Some(json!({"summary": "ok"})));
    }

    #[test]
    fn test_extract_embedded_object() {
        let text = "Sure! {\"summary\": \"short\", \"key_points\": [\"a\"]} Hope this helps.";
        assert_eq!(
            extract_json(text),
            Some(json!({"summary": "short", "key_points": ["a"]}))
        );
    }

    #[test]
    fn test_extract_nothing() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{broken"), None);
    }
}
