//! Oracle-backed relevance scoring of search results.
//!
//! Results are scored in fixed-size batches. Each batch becomes one compact
//! numbered prompt, and the oracle answers with a JSON mapping from the
//! batch-local number to a score in 0-100. Scores are normalized, merged onto
//! the items, filtered by threshold and sorted best first.
//!
//! Any oracle failure skips the whole step: the caller gets its input back
//! unchanged, without scores.

use serde_json::Value;
use std::sync::Arc;

use crate::models::{truncate_chars, ResultItem};
use crate::oracle::{extract_json, Oracle, OracleError};
use crate::utils::AnalysisCache;

/// Score used when the oracle leaves an item out or answers with garbage
pub const DEFAULT_SCORE: u8 = 50;

const TITLE_CHARS: usize = 100;
const SNIPPET_CHARS: usize = 200;
const CACHE_KIND: &str = "relevance";

/// Relevance post-pass for search results
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    oracle: Option<Arc<dyn Oracle>>,
    cache: Option<AnalysisCache>,
    batch_size: usize,
}

impl RelevanceFilter {
    pub fn new(oracle: Option<Arc<dyn Oracle>>, batch_size: usize) -> Self {
        Self {
            oracle,
            cache: None,
            batch_size: batch_size.max(1),
        }
    }

    /// Remember batch scores in the analysis cache
    pub fn with_cache(mut self, cache: AnalysisCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Whether an oracle is configured
    pub fn is_available(&self) -> bool {
        self.oracle.is_some()
    }

    /// Score, filter and sort `results`
    ///
    /// Keeps items scoring at least `threshold`, best first. Returns the input
    /// unchanged when no oracle is configured or any batch fails.
    pub async fn filter(
        &self,
        query: &str,
        results: Vec<ResultItem>,
        threshold: u8,
    ) -> Vec<ResultItem> {
        let Some(oracle) = &self.oracle else {
            return results;
        };
        if results.is_empty() {
            return results;
        }

        let mut scores = Vec::with_capacity(results.len());
        for batch in results.chunks(self.batch_size) {
            match self.score_batch(oracle.as_ref(), query, batch).await {
                Ok(batch_scores) => scores.extend(batch_scores),
                Err(e) => {
                    tracing::warn!("Relevance filter skipped, oracle failed: {}", e);
                    return results;
                }
            }
        }

        let before = results.len();
        let mut scored: Vec<ResultItem> = results
            .into_iter()
            .zip(scores)
            .filter(|(_, score)| *score >= threshold)
            .map(|(mut item, score)| {
                item.relevance_score = Some(score);
                item
            })
            .collect();
        scored.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));

        tracing::info!(
            "Relevance filter: {} -> {} results (threshold={})",
            before,
            scored.len(),
            threshold
        );
        scored
    }

    async fn score_batch(
        &self,
        oracle: &dyn Oracle,
        query: &str,
        batch: &[ResultItem],
    ) -> Result<Vec<u8>, OracleError> {
        let prompt = build_prompt(query, batch);
        // The analysis cache keys on a prefix; a batch prompt needs every item in its key
        let cache_content = format!("{:x}", md5::compute(prompt.as_bytes()));

        if let Some(cache) = &self.cache {
            match cache.get::<Vec<u8>>(&cache_content, CACHE_KIND).await {
                Ok(Some(scores)) if scores.len() == batch.len() => return Ok(scores),
                Ok(_) => {}
                Err(e) => tracing::warn!("Relevance cache read failed: {}", e),
            }
        }

        let answer = oracle.complete(&prompt).await?;
        let parsed = extract_json(&answer).ok_or_else(|| {
            OracleError::Malformed(format!(
                "no JSON in answer: {}",
                truncate_chars(&answer, 80)
            ))
        })?;
        let scores = scores_from_answer(&parsed, batch.len())?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&cache_content, CACHE_KIND, &scores).await {
                tracing::warn!("Relevance cache write failed: {}", e);
            }
        }
        Ok(scores)
    }
}

/// Numbered prompt for one batch
fn build_prompt(query: &str, batch: &[ResultItem]) -> String {
    let mut prompt = format!(
        "Rate how relevant each search result is to the query \"{}\".\n\
         Give every result an integer score from 0 (unrelated) to 100 (exactly on topic).\n\
         Reply with only a JSON object mapping the result number to its score, \
         for example {{\"0\": 85, \"1\": 20}}.\n\n",
        query
    );
    for (i, item) in batch.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] Title: {}\n    Snippet: {}\n",
            i,
            truncate_chars(&item.title, TITLE_CHARS),
            truncate_chars(&item.snippet, SNIPPET_CHARS)
        ));
    }
    prompt
}

/// Read one score per batch index from the oracle's JSON
///
/// Accepts an object keyed by index or a positional array; anything else is
/// malformed.
fn scores_from_answer(answer: &Value, len: usize) -> Result<Vec<u8>, OracleError> {
    match answer {
        Value::Object(map) => Ok((0..len)
            .map(|i| normalize_score(map.get(&i.to_string())))
            .collect()),
        Value::Array(values) => Ok((0..len).map(|i| normalize_score(values.get(i))).collect()),
        other => Err(OracleError::Malformed(format!(
            "expected an object of scores, got {}",
            other
        ))),
    }
}

/// Clamp a score into 0..=100; missing or unparseable values become 50
pub fn normalize_score(value: Option<&Value>) -> u8 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() => n.round().clamp(0.0, 100.0) as u8,
        _ => DEFAULT_SCORE,
    }
}
