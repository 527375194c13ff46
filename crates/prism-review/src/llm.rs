use std::time::Duration;

use async_trait::async_trait;
use prism_core::{LlmConfig, ProviderError};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Per-request model settings.
///
/// # Examples
///
/// ```
/// use prism_core::LlmConfig;
/// use prism_review::llm::ModelConfig;
///
/// let model = ModelConfig::from(&LlmConfig::default());
/// assert_eq!(model.model, "gpt-4o");
/// assert_eq!(model.max_tokens, 4096);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&LlmConfig> for ModelConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// One system + user exchange with a chat model.
///
/// Implementations hold their own credentials. The pipeline only sees
/// the returned text or a [`ProviderError`].
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        model: &ModelConfig,
    ) -> Result<String, ProviderError>;
}

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use prism_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage {
///     role: Role::User,
///     content: "Review this code".into(),
/// };
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Role in the chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// OpenAI, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use prism_core::LlmConfig;
/// use prism_review::llm::LlmClient;
///
/// let client = LlmClient::new(&LlmConfig::default(), "test-key".into()).unwrap();
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LlmClient {
    /// Create a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::new(format!("failed to create HTTP client: {e}")))?;
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatProvider for LlmClient {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        model: &ModelConfig,
    ) -> Result<String, ProviderError> {
        let messages = [
            ChatMessage {
                role: Role::System,
                content: system.to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: user.to_string(),
            },
        ];
        let body = serde_json::json!({
            "model": model.model,
            "messages": messages,
            "max_tokens": model.max_tokens,
            "temperature": model.temperature,
            "response_format": { "type": "json_object" },
        });

        tracing::debug!(model = %model.model, chars = user.len(), "sending chat request");
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ProviderError::new(format!("failed to read response: {e}")).with_status(status.as_u16())
        })?;

        if !status.is_success() {
            let err = error_from_body(&text)
                .unwrap_or_else(|| ProviderError::new(format!("LLM API error: {text}")));
            return Err(err.with_status(status.as_u16()));
        }

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::new(format!("failed to parse response: {e}")))?;
        if let Some(err) = error_from_body(&text) {
            return Err(err);
        }

        value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::new(format!("unexpected response structure: {value}")))
    }
}

/// Extract `{"error": {"message", "code"}}` from a provider response body.
fn error_from_body(body: &str) -> Option<ProviderError> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error").filter(|e| !e.is_null())?;
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.as_str())
        .unwrap_or("unknown provider error")
        .to_string();
    let code = error.get("code").and_then(|c| match c {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let err = ProviderError::new(message);
    Some(match code {
        Some(code) => err.with_code(code),
        None => err,
    })
}
