//! HTTP embedding clients for Ollama and OpenAI-compatible providers.
//!
//! Transient failures (transport errors, HTTP 429 and 5xx) are retried with
//! exponential backoff. Batches go through [`embed_all`], which bounds the
//! number of requests in flight and keeps results in input order.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tessera_core::{Embedder, EmbeddingConfig, EmbeddingVector, TesseraError};

/// Wire protocol spoken by the embedding endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// `POST /api/embeddings {model, prompt}`.
    Ollama,
    /// `POST /v1/embeddings {model, input}`.
    OpenAi,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(EmbeddingProvider::Ollama),
            "openai" => Ok(EmbeddingProvider::OpenAi),
            other => Err(TesseraError::Config(format!(
                "unknown embedding provider: {other}. Use \"ollama\" or \"openai\""
            ))),
        }
    }
}

/// Client for an embedding HTTP API.
///
/// # Examples
///
/// ```
/// use tessera_retrieval::embedding::{EmbeddingClient, EmbeddingProvider};
///
/// let client = EmbeddingClient::new(EmbeddingProvider::Ollama, "http://localhost:11434");
/// assert_eq!(client.provider(), EmbeddingProvider::Ollama);
/// ```
pub struct EmbeddingClient {
    client: reqwest::Client,
    provider: EmbeddingProvider,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiDataItem>,
}

#[derive(Deserialize)]
struct OpenAiDataItem {
    embedding: Vec<f32>,
}

enum Attempt {
    Retry(String),
    Fail(String),
}

impl EmbeddingClient {
    /// Create a client with default retry policy and no API key.
    pub fn new(provider: EmbeddingProvider, base_url: &str) -> Self {
        let defaults = EmbeddingConfig::default();
        Self {
            client: reqwest::Client::new(),
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            max_retries: defaults.max_retries,
            retry_backoff: Duration::from_millis(defaults.retry_backoff_ms),
        }
    }

    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::Config`] for an unknown provider, or if the
    /// `openai` provider has no API key.
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_core::EmbeddingConfig;
    /// use tessera_retrieval::embedding::EmbeddingClient;
    ///
    /// let client = EmbeddingClient::with_config(&EmbeddingConfig::default()).unwrap();
    /// ```
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, TesseraError> {
        let provider: EmbeddingProvider = config.provider.parse()?;
        if provider == EmbeddingProvider::OpenAi && config.api_key.is_none() {
            return Err(TesseraError::Config(
                "embedding API key not found: set embedding.api_key in .tessera.toml or OPENAI_API_KEY env var".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TesseraError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            provider,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Override the retry policy.
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    /// The wire protocol in use.
    pub fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    fn endpoint(&self) -> String {
        match self.provider {
            EmbeddingProvider::Ollama => format!("{}/api/embeddings", self.base_url),
            EmbeddingProvider::OpenAi => format!("{}/v1/embeddings", self.base_url),
        }
    }

    fn build_body(&self, model: &str, text: &str) -> Result<serde_json::Value, TesseraError> {
        let body = match self.provider {
            EmbeddingProvider::Ollama => serde_json::to_value(OllamaRequest {
                model,
                prompt: text,
            })?,
            EmbeddingProvider::OpenAi => serde_json::to_value(OpenAiRequest { model, input: text })?,
        };
        Ok(body)
    }

    async fn attempt(&self, body: &serde_json::Value) -> Result<EmbeddingVector, Attempt> {
        let mut request = self.client.post(self.endpoint()).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Attempt::Retry(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            let message = format!("embedding API returned {status}: {body}");
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                Attempt::Retry(message)
            } else {
                Attempt::Fail(message)
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| Attempt::Retry(format!("failed to read response: {e}")))?;
        parse_embedding(self.provider, &text).map_err(Attempt::Fail)
    }
}

fn parse_embedding(provider: EmbeddingProvider, body: &str) -> Result<EmbeddingVector, String> {
    let embedding = match provider {
        EmbeddingProvider::Ollama => serde_json::from_str::<OllamaResponse>(body)
            .map_err(|e| format!("failed to parse response: {e}"))?
            .embedding,
        EmbeddingProvider::OpenAi => serde_json::from_str::<OpenAiResponse>(body)
            .map_err(|e| format!("failed to parse response: {e}"))?
            .data
            .into_iter()
            .next()
            .ok_or_else(|| "empty response from embedding API".to_string())?
            .embedding,
    };

    if embedding.is_empty() {
        return Err("embedding API returned an empty vector".into());
    }
    Ok(embedding)
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, model: &str, text: &str) -> Result<EmbeddingVector, TesseraError> {
        let body = self.build_body(model, text)?;
        let mut backoff = self.retry_backoff;
        let mut attempt = 0u32;

        loop {
            match self.attempt(&body).await {
                Ok(vector) => return Ok(vector),
                Err(Attempt::Fail(message)) => return Err(TesseraError::EmbeddingUnavailable(message)),
                Err(Attempt::Retry(message)) => {
                    if attempt >= self.max_retries {
                        return Err(TesseraError::EmbeddingUnavailable(message));
                    }
                    attempt += 1;
                    tracing::debug!(attempt, error = %message, "retrying embedding request");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

/// Embed every text with at most `concurrency` requests in flight.
///
/// Results are in the same order as `texts`, whatever order the requests
/// complete in. The first failure aborts the batch.
///
/// # Errors
///
/// Returns the first error reported by `embedder`.
pub async fn embed_all(
    embedder: &dyn Embedder,
    model: &str,
    texts: &[String],
    concurrency: usize,
) -> Result<Vec<EmbeddingVector>, TesseraError> {
    stream::iter(texts.iter().map(|text| embedder.embed(model, text)))
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn ollama_request_format_is_correct() {
        let client = EmbeddingClient::new(EmbeddingProvider::Ollama, "http://localhost:11434/");
        let body = client.build_body("nomic-embed-text", "hola").unwrap();
        assert_eq!(body["model"], "nomic-embed-text");
        assert_eq!(body["prompt"], "hola");
        assert_eq!(client.endpoint(), "http://localhost:11434/api/embeddings");
    }

    #[test]
    fn openai_request_format_is_correct() {
        let client = EmbeddingClient::new(EmbeddingProvider::OpenAi, "https://api.openai.com");
        let body = client.build_body("text-embedding-3-small", "hi").unwrap();
        assert_eq!(body["input"], "hi");
        assert!(body.get("prompt").is_none());
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/embeddings");
    }

    #[test]
    fn response_parsing_works() {
        let ollama = r#"{"embedding": [0.1, 0.2, 0.3]}"#;
        assert_eq!(
            parse_embedding(EmbeddingProvider::Ollama, ollama).unwrap(),
            vec![0.1, 0.2, 0.3]
        );

        let openai = r#"{"data": [{"embedding": [0.4, 0.5]}]}"#;
        assert_eq!(
            parse_embedding(EmbeddingProvider::OpenAi, openai).unwrap(),
            vec![0.4, 0.5]
        );
    }

    #[test]
    fn empty_embeddings_are_rejected() {
        assert!(parse_embedding(EmbeddingProvider::Ollama, r#"{"embedding": []}"#).is_err());
        assert!(parse_embedding(EmbeddingProvider::OpenAi, r#"{"data": []}"#).is_err());
        assert!(parse_embedding(EmbeddingProvider::Ollama, "not json").is_err());
    }

    #[test]
    fn unknown_provider_is_a_config_error() {
        let config = EmbeddingConfig {
            provider: "voyage".into(),
            ..EmbeddingConfig::default()
        };
        let err = EmbeddingClient::with_config(&config).unwrap_err();
        assert!(err.to_string().contains("voyage"));
    }

    #[test]
    fn openai_without_key_gives_clear_error() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            api_key: None,
            ..EmbeddingConfig::default()
        };
        let err = EmbeddingClient::with_config(&config).unwrap_err().to_string();
        assert!(err.contains("API key"), "error should mention API key: {err}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_embedding_unavailable() {
        let client = EmbeddingClient::new(EmbeddingProvider::Ollama, "http://127.0.0.1:1")
            .with_retries(1, Duration::from_millis(1));
        let err = client.embed("m", "text").await.unwrap_err();
        assert!(matches!(err, TesseraError::EmbeddingUnavailable(_)));
    }

    struct SlowEcho {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for SlowEcho {
        async fn embed(&self, _model: &str, text: &str) -> Result<EmbeddingVector, TesseraError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // Later inputs finish first.
            let n: u64 = text.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(20 - n)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if text == "fail" {
                return Err(TesseraError::EmbeddingUnavailable("boom".into()));
            }
            Ok(vec![n as f32])
        }
    }

    #[tokio::test]
    async fn embed_all_is_bounded_and_ordered() {
        let embedder = Arc::new(SlowEcho {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let texts: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        let vectors = embed_all(embedder.as_ref(), "m", &texts, 3).await.unwrap();

        let firsts: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        let expected: Vec<f32> = (0..12).map(|i| i as f32).collect();
        assert_eq!(firsts, expected);
        assert!(embedder.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn embed_all_fails_on_any_error() {
        let embedder = SlowEcho {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let texts = vec!["1".to_string(), "fail".to_string(), "2".to_string()];
        let err = embed_all(&embedder, "m", &texts, 2).await.unwrap_err();
        assert!(matches!(err, TesseraError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn embed_all_of_nothing_is_empty() {
        let embedder = SlowEcho {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        assert!(embed_all(&embedder, "m", &[], 4).await.unwrap().is_empty());
    }
}
