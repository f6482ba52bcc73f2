//! OpenAI-compatible chat-completion oracle (DeepSeek, ZhipuAI).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Oracle, OracleError};
use crate::config::AnalysisConfig;
use crate::utils::HttpClient;

const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
const DEEPSEEK_MODEL: &str = "deepseek-chat";
const ZHIPU_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";
const ZHIPU_MODEL: &str = "glm-4-flash";

const MAX_TOKENS: u32 = 1500;

/// Chat-completion client for one provider
#[derive(Debug, Clone)]
pub struct ChatOracle {
    client: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatOracle {
    /// Build from configuration; fails with `NotConfigured` when no API key
    /// is available or the provider is unknown
    pub fn from_config(config: &AnalysisConfig, client: HttpClient) -> Result<Self, OracleError> {
        let (default_base, default_model) = match config.provider.as_str() {
            "deepseek" => (DEEPSEEK_BASE_URL, DEEPSEEK_MODEL),
            "zhipu" => (ZHIPU_BASE_URL, ZHIPU_MODEL),
            other => {
                return Err(OracleError::NotConfigured(format!(
                    "unknown provider '{}'",
                    other
                )))
            }
        };

        let api_key = config.resolved_api_key().ok_or_else(|| {
            OracleError::NotConfigured(format!("no API key for provider '{}'", config.provider))
        })?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            temperature: config.temperature,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Oracle for ChatOracle {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        tracing::debug!(
            "Calling {} with prompt length {}",
            self.model,
            prompt.len()
        );

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(&format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Network(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api(format!(
                "{} returned {}: {}",
                self.model,
                status,
                crate::models::truncate_chars(&body, 200)
            )));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(format!("Failed to parse response: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::Malformed("response has no content".to_string()))
    }
}
