use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_core::{CompletionOptions, CompletionProvider, LlmConfig, TesseraError};

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use tessera_rag::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage {
///     role: Role::User,
///     content: "What is the capital of France?".into(),
/// };
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use tessera_rag::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// Chat endpoint dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatApi {
    /// Ollama `/api/chat` with sampling under `options`.
    Ollama,
    /// OpenAI-compatible `/v1/chat/completions`.
    OpenAi,
}

/// Chat completion client for Ollama or any OpenAI-compatible server.
///
/// # Examples
///
/// ```
/// use tessera_core::LlmConfig;
/// use tessera_rag::llm::{ChatApi, LlmClient};
///
/// let client = LlmClient::new(&LlmConfig::default()).unwrap();
/// assert_eq!(client.api(), ChatApi::Ollama);
/// assert_eq!(client.model(), "mistral:latest");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    api: ChatApi,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("api", &self.api)
            .field("model", &self.config.model)
            .field("base_url", &self.base_url())
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::Config`] for an unknown provider or if the HTTP
    /// client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, TesseraError> {
        let api = match config.provider.to_lowercase().as_str() {
            "ollama" => ChatApi::Ollama,
            "openai" => ChatApi::OpenAi,
            other => {
                return Err(TesseraError::Config(format!(
                    "unknown LLM provider: {other}. Use \"ollama\" or \"openai\""
                )))
            }
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TesseraError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
            api,
        })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Endpoint dialect in use.
    pub fn api(&self) -> ChatApi {
        self.api
    }

    fn base_url(&self) -> &str {
        let default = match self.api {
            ChatApi::Ollama => "http://localhost:11434",
            ChatApi::OpenAi => "https://api.openai.com",
        };
        self.config
            .base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
    }

    fn endpoint(&self) -> String {
        match self.api {
            ChatApi::Ollama => format!("{}/api/chat", self.base_url()),
            ChatApi::OpenAi => format!("{}/v1/chat/completions", self.base_url()),
        }
    }

    fn build_body(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> serde_json::Value {
        match self.api {
            ChatApi::Ollama => serde_json::json!({
                "model": model,
                "messages": messages,
                "stream": false,
                "options": {
                    "temperature": options.temperature,
                    "top_p": options.top_p,
                    "frequency_penalty": options.frequency_penalty,
                    "presence_penalty": options.presence_penalty,
                },
            }),
            ChatApi::OpenAi => serde_json::json!({
                "model": model,
                "messages": messages,
                "temperature": options.temperature,
                "top_p": options.top_p,
                "frequency_penalty": options.frequency_penalty,
                "presence_penalty": options.presence_penalty,
            }),
        }
    }

    /// Send a chat request and return the assistant's text.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::CompletionFailure`] on HTTP errors or response
    /// parsing failures.
    pub async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        options: &CompletionOptions,
    ) -> Result<String, TesseraError> {
        let body = self.build_body(model, &messages, options);

        let mut request = self.client.post(self.endpoint());
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| TesseraError::CompletionFailure(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(TesseraError::CompletionFailure(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TesseraError::CompletionFailure(format!("failed to parse response: {e}")))?;

        extract_content(self.api, &response_body)
    }
}

fn extract_content(api: ChatApi, body: &serde_json::Value) -> Result<String, TesseraError> {
    let message = match api {
        ChatApi::Ollama => body.get("message"),
        ChatApi::OpenAi => body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message")),
    };

    message
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            TesseraError::CompletionFailure(format!("unexpected response structure: {body}"))
        })
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, TesseraError> {
        let messages = vec![ChatMessage {
            role: Role::User,
            content: prompt.to_string(),
        }];
        self.chat(model, messages, options).await
    }
}
