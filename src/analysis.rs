//! Oracle-backed content analysis: summaries, translations and paper
//! breakdowns, all behind the analysis cache.
//!
//! Successful answers are cached by content prefix and analysis kind. Errors
//! are never cached, so a failed call is retried the next time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::db::StoreError;
use crate::download::{normalize_artifact_id, DownloadError, DownloadManager};
use crate::oracle::{extract_json, Oracle, OracleError};
use crate::utils::{extract_text_async, AnalysisCache, PdfExtractError};

const KIND_SUMMARY: &str = "summary";
const KIND_PAPER: &str = "paper_analysis";
const KIND_PAPER_FULL: &str = "paper_full_analysis";

/// Marker appended to content cut at the length limit
const TRUNCATION_MARKER: &str = "...(truncated)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub translated_text: String,
    pub source_lang: String,
}

/// Structured breakdown of an academic paper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperAnalysis {
    pub abstract_summary: String,
    pub method: String,
    pub innovation: String,
    pub results: String,
    pub conclusion: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Failed to download PDF for {0}")]
    DownloadFailed(String),

    #[error(transparent)]
    Extraction(#[from] PdfExtractError),

    #[error("No text could be extracted from {0}")]
    EmptyText(String),
}

#[derive(Debug, Clone)]
pub struct AnalysisService {
    oracle: Option<Arc<dyn Oracle>>,
    cache: AnalysisCache,
    downloads: DownloadManager,
    max_content_length: usize,
}

impl AnalysisService {
    pub fn new(
        oracle: Option<Arc<dyn Oracle>>,
        cache: AnalysisCache,
        downloads: DownloadManager,
        max_content_length: usize,
    ) -> Self {
        Self {
            oracle,
            cache,
            downloads,
            max_content_length,
        }
    }

    pub fn is_available(&self) -> bool {
        self.oracle.is_some()
    }

    /// Short summary plus a handful of key points
    pub async fn summarize(&self, content: &str) -> Result<Summary, AnalysisError> {
        if let Some(cached) = self.cache.get(content, KIND_SUMMARY).await? {
            return Ok(cached);
        }

        let prompt = format!(
            "Summarize the following content in at most 200 words and list 3 to 5 key points.\n\
             Reply with JSON only: {{\"summary\": \"...\", \"key_points\": [\"...\"]}}\n\n\
             Content:\n{}",
            self.truncate(content)
        );
        let text = self.oracle()?.complete(&prompt).await?;
        let summary = parse_summary(&text);

        self.cache.set(content, KIND_SUMMARY, &summary).await?;
        Ok(summary)
    }

    /// Translate into `target_lang` (a language code such as `zh` or `en`)
    pub async fn translate(
        &self,
        content: &str,
        target_lang: &str,
    ) -> Result<Translation, AnalysisError> {
        let kind = format!("translate_{}", target_lang);
        if let Some(cached) = self.cache.get(content, &kind).await? {
            return Ok(cached);
        }

        let prompt = format!(
            "Translate the following content into {}. Keep technical terms accurate; \
             after key terms you may give the original in parentheses.\n\n\
             Content:\n{}",
            language_name(target_lang),
            self.truncate(content)
        );
        let text = self.oracle()?.complete(&prompt).await?;
        let translation = Translation {
            translated_text: text.trim().to_string(),
            source_lang: "en".to_string(),
        };

        self.cache.set(content, &kind, &translation).await?;
        Ok(translation)
    }

    /// Analyze a paper from its title and abstract
    pub async fn analyze_paper(
        &self,
        title: &str,
        abstract_text: &str,
    ) -> Result<PaperAnalysis, AnalysisError> {
        let key = format!("{}:{}", title, abstract_text);
        if let Some(cached) = self.cache.get(&key, KIND_PAPER).await? {
            return Ok(cached);
        }

        let body = self.truncate(&format!("Title: {}\n\nAbstract: {}", title, abstract_text));
        let analysis = self.ask_paper_analysis(&body).await?;

        self.cache.set(&key, KIND_PAPER, &analysis).await?;
        Ok(analysis)
    }

    /// Download the paper's PDF, extract its text and analyze the full paper
    pub async fn analyze_paper_full(
        &self,
        artifact_id: &str,
        title: &str,
    ) -> Result<PaperAnalysis, AnalysisError> {
        let id = normalize_artifact_id(artifact_id);
        let key = format!("full:{}", id);
        if let Some(cached) = self.cache.get(&key, KIND_PAPER_FULL).await? {
            return Ok(cached);
        }
        // Fail before any download when there is nobody to ask
        self.oracle()?;

        let path = self
            .downloads
            .get_or_download(&id)
            .await?
            .ok_or_else(|| AnalysisError::DownloadFailed(id.clone()))?;

        let text = extract_text_async(&path).await?;
        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyText(path.display().to_string()));
        }
        tracing::info!("Extracted {} characters from {}", text.len(), path.display());

        let body = self.truncate(&format!("Title: {}\n\nFull text: {}", title, text));
        let analysis = self.ask_paper_analysis(&body).await?;

        self.cache.set(&key, KIND_PAPER_FULL, &analysis).await?;
        Ok(analysis)
    }

    async fn ask_paper_analysis(&self, body: &str) -> Result<PaperAnalysis, AnalysisError> {
        let prompt = format!(
            "Analyze the key information of the following academic paper.\n\
             Reply with JSON only: {{\"abstract_summary\": \"overview\", \"method\": \"research method\", \
             \"innovation\": \"main contributions\", \"results\": \"experimental results\", \
             \"conclusion\": \"conclusions and limitations\"}}\n\n\
             Paper:\n{}",
            body
        );
        let text = self.oracle()?.complete(&prompt).await?;
        Ok(parse_paper_analysis(&text))
    }

    fn oracle(&self) -> Result<&Arc<dyn Oracle>, OracleError> {
        self.oracle.as_ref().ok_or_else(|| {
            OracleError::NotConfigured("set analysis.api_key or the provider's API key variable".to_string())
        })
    }

    fn truncate(&self, content: &str) -> String {
        truncate_content(content, self.max_content_length)
    }
}

fn truncate_content(content: &str, max: usize) -> String {
    match content.char_indices().nth(max) {
        Some((idx, _)) => format!("{}{}", &content[..idx], TRUNCATION_MARKER),
        None => content.to_string(),
    }
}

fn language_name(code: &str) -> &str {
    match code {
        "zh" => "Chinese",
        "en" => "English",
        "ja" => "Japanese",
        "ko" => "Korean",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        other => other,
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Falls back to the raw answer as the summary when it holds no JSON
fn parse_summary(text: &str) -> Summary {
    let Some(parsed) = extract_json(text).filter(Value::is_object) else {
        return Summary {
            summary: text.trim().to_string(),
            key_points: Vec::new(),
        };
    };
    Summary {
        summary: parsed
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| text.trim().to_string()),
        key_points: parsed
            .get("key_points")
            .and_then(Value::as_array)
            .map(|points| {
                points
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Falls back to the raw answer as `abstract_summary` when it holds no JSON
fn parse_paper_analysis(text: &str) -> PaperAnalysis {
    match extract_json(text).filter(Value::is_object) {
        Some(parsed) => PaperAnalysis {
            abstract_summary: string_field(&parsed, "abstract_summary"),
            method: string_field(&parsed, "method"),
            innovation: string_field(&parsed, "innovation"),
            results: string_field(&parsed, "results"),
            conclusion: string_field(&parsed, "conclusion"),
        },
        None => PaperAnalysis {
            abstract_summary: text.trim().to_string(),
            ..PaperAnalysis::default()
        },
    }
}
