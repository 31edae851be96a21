use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TesseraError;
use crate::types::{CompletionOptions, DistanceMetric};

/// Top-level configuration loaded from `.tessera.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use tessera_core::TesseraConfig;
///
/// let config = TesseraConfig::default();
/// assert_eq!(config.retrieval.chunk_max_tokens, 500);
/// assert_eq!(config.embedding.dimensions, 768);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TesseraConfig {
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Completion provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Vector index settings.
    #[serde(default)]
    pub index: IndexConfig,
    /// Chunking, ranking, and context assembly policy.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Local note vault.
    #[serde(default)]
    pub notes: NotesConfig,
    /// Web encyclopedia source.
    #[serde(default)]
    pub web: WebConfig,
}

impl TesseraConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::Io`] if the file cannot be read, or
    /// [`TesseraError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tessera_core::TesseraConfig;
    /// use std::path::Path;
    ///
    /// let config = TesseraConfig::from_file(Path::new(".tessera.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, TesseraError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_core::TesseraConfig;
    ///
    /// let toml = r#"
    /// [retrieval]
    /// top_k = 3
    /// "#;
    /// let config = TesseraConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.retrieval.top_k, 3);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, TesseraError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay values from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values looked up through `get`.
    ///
    /// Recognised keys: `VAULT_PATH`, `OLLAMA_HOST`, `QDRANT_URL`,
    /// `OPENAI_API_KEY` (for `openai` providers without a configured key).
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_core::TesseraConfig;
    ///
    /// let config = TesseraConfig::default().with_env_from(|key| match key {
    ///     "VAULT_PATH" => Some("/srv/vault".into()),
    ///     _ => None,
    /// });
    /// assert_eq!(config.notes.vault_path.to_str(), Some("/srv/vault"));
    /// ```
    pub fn with_env_from(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(vault) = get("VAULT_PATH") {
            self.notes.vault_path = PathBuf::from(vault);
        }
        if let Some(host) = get("OLLAMA_HOST") {
            if self.embedding.provider == "ollama" {
                self.embedding.base_url = host.clone();
            }
            if self.llm.provider == "ollama" {
                self.llm.base_url = Some(host);
            }
        }
        if let Some(url) = get("QDRANT_URL") {
            self.index.url = url;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            if self.embedding.provider == "openai" && self.embedding.api_key.is_none() {
                self.embedding.api_key = Some(key.clone());
            }
            if self.llm.provider == "openai" && self.llm.api_key.is_none() {
                self.llm.api_key = Some(key);
            }
        }
        self
    }

    /// Check cross-field constraints before any I/O happens.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidConfig`] naming the first violation.
    ///
    /// # Examples
    ///
    /// ```
    /// use tessera_core::TesseraConfig;
    ///
    /// let mut config = TesseraConfig::default();
    /// assert!(config.validate().is_ok());
    /// config.retrieval.chunk_overlap_tokens = 500;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), TesseraError> {
        let r = &self.retrieval;
        if r.chunk_overlap_tokens >= r.chunk_max_tokens {
            return Err(TesseraError::InvalidConfig(format!(
                "chunk_overlap_tokens ({}) must be smaller than chunk_max_tokens ({})",
                r.chunk_overlap_tokens, r.chunk_max_tokens
            )));
        }
        if r.search_limit == 0 || r.top_k == 0 {
            return Err(TesseraError::InvalidConfig(
                "search_limit and top_k must be at least 1".into(),
            ));
        }
        if r.context_item_chars == 0 {
            return Err(TesseraError::InvalidConfig(
                "context_item_chars must be at least 1".into(),
            ));
        }
        if self.embedding.concurrency == 0 || self.web.concurrency == 0 {
            return Err(TesseraError::InvalidConfig(
                "concurrency limits must be at least 1".into(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(TesseraError::InvalidConfig(
                "embedding.dimensions must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Embedding provider configuration.
///
/// # Examples
///
/// ```
/// use tessera_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "ollama");
/// assert_eq!(config.model, "nomic-embed-text");
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `"ollama"` or `"openai"` (any OpenAI-compatible endpoint).
    #[serde(default = "default_ollama_provider")]
    pub provider: String,
    /// Provider base URL.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// API key, for providers that need one.
    pub api_key: Option<String>,
    /// Model name (default: `"nomic-embed-text"`).
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding dimensions (default: 768).
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    /// Maximum embedding requests in flight (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Retries for transient failures (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff between retries, doubled each attempt (default: 250).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Per-request timeout (default: 30).
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_ollama_provider() -> String {
    "ollama".into()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_embedding_dimensions() -> usize {
    768
}

fn default_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_embedding_timeout() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_ollama_provider(),
            base_url: default_ollama_url(),
            api_key: None,
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

/// Completion provider configuration.
///
/// # Examples
///
/// ```
/// use tessera_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "mistral:latest");
/// assert_eq!(config.temperature, 0.7);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `"ollama"` or `"openai"` (any OpenAI-compatible endpoint).
    #[serde(default = "default_ollama_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Sampling temperature (default: 0.7).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus sampling mass (default: 1.0).
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Frequency penalty (default: 0.0).
    #[serde(default)]
    pub frequency_penalty: f32,
    /// Presence penalty (default: 0.0).
    #[serde(default)]
    pub presence_penalty: f32,
    /// Request timeout (default: 120).
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_model() -> String {
    "mistral:latest".into()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    1.0
}

fn default_llm_timeout() -> u64 {
    120
}

impl LlmConfig {
    /// Sampling options for completion calls.
    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_ollama_provider(),
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Vector index configuration.
///
/// # Examples
///
/// ```
/// use tessera_core::{IndexBackend, IndexConfig};
///
/// let config = IndexConfig::default();
/// assert_eq!(config.backend, IndexBackend::Sqlite);
/// assert_eq!(config.collection, "notes");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Storage backend (default: `sqlite`).
    #[serde(default)]
    pub backend: IndexBackend,
    /// SQLite database file (default: `.tessera/index.db`).
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// Qdrant gRPC endpoint (default: `http://localhost:6334`).
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    /// Collection name (default: `"notes"`).
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Similarity metric (default: cosine).
    #[serde(default)]
    pub metric: DistanceMetric,
    /// Per-request timeout for a remote index, in seconds (default: 30).
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,
}

/// Vector index backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Local SQLite file.
    #[default]
    Sqlite,
    /// Remote Qdrant server.
    Qdrant,
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".tessera/index.db")
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_index_timeout() -> u64 {
    30
}

fn default_collection() -> String {
    "notes".into()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            path: default_index_path(),
            url: default_qdrant_url(),
            collection: default_collection(),
            metric: DistanceMetric::default(),
            timeout_secs: default_index_timeout(),
        }
    }
}

/// Chunking, ranking, and context policy.
///
/// # Examples
///
/// ```
/// use tessera_core::RetrievalConfig;
///
/// let config = RetrievalConfig::default();
/// assert_eq!(config.chunk_overlap_tokens, 50);
/// assert_eq!(config.score_threshold, 0.3);
/// assert_eq!(config.context_item_chars, 500);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Tokens per chunk window (default: 500).
    #[serde(default = "default_chunk_max_tokens")]
    pub chunk_max_tokens: usize,
    /// Tokens shared by consecutive windows (default: 50).
    #[serde(default = "default_chunk_overlap_tokens")]
    pub chunk_overlap_tokens: usize,
    /// Hits requested from the vector index (default: 5).
    #[serde(default = "default_five")]
    pub search_limit: usize,
    /// Hits scoring at or below this are dropped (default: 0.3).
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// Hits kept after ranking (default: 5).
    #[serde(default = "default_five")]
    pub top_k: usize,
    /// Characters kept per context item (default: 500).
    #[serde(default = "default_context_item_chars")]
    pub context_item_chars: usize,
    /// Separator between context items (default: blank line).
    #[serde(default = "default_context_separator")]
    pub context_separator: String,
    /// Overall character budget for the rendered context.
    pub context_budget_chars: Option<usize>,
    /// End-to-end deadline for one query (default: 180).
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Time allowed to each optional ingestion stage (default: 60).
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    /// Hugging Face `tokenizer.json` used for chunking.
    pub tokenizer_path: Option<PathBuf>,
    /// Directory to write fetched-article chunks to, for inspection.
    pub dump_chunks_dir: Option<PathBuf>,
    /// Prompt template with `{context}` and `{question}` placeholders.
    pub prompt_template: Option<String>,
}

fn default_chunk_max_tokens() -> usize {
    500
}

fn default_chunk_overlap_tokens() -> usize {
    50
}

fn default_five() -> usize {
    5
}

fn default_score_threshold() -> f64 {
    0.3
}

fn default_context_item_chars() -> usize {
    500
}

fn default_context_separator() -> String {
    "\n\n".into()
}

fn default_deadline_secs() -> u64 {
    180
}

fn default_stage_timeout_secs() -> u64 {
    60
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_max_tokens: default_chunk_max_tokens(),
            chunk_overlap_tokens: default_chunk_overlap_tokens(),
            search_limit: default_five(),
            score_threshold: default_score_threshold(),
            top_k: default_five(),
            context_item_chars: default_context_item_chars(),
            context_separator: default_context_separator(),
            context_budget_chars: None,
            deadline_secs: default_deadline_secs(),
            stage_timeout_secs: default_stage_timeout_secs(),
            tokenizer_path: None,
            dump_chunks_dir: None,
            prompt_template: None,
        }
    }
}

/// Markdown vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesConfig {
    /// Vault root (default: `~/obsidian/test`).
    #[serde(default = "default_vault_path")]
    pub vault_path: PathBuf,
    /// Note file extension (default: `"md"`).
    #[serde(default = "default_note_extension")]
    pub extension: String,
}

fn default_vault_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join("obsidian")
        .join("test")
}

fn default_note_extension() -> String {
    "md".into()
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            vault_path: default_vault_path(),
            extension: default_note_extension(),
        }
    }
}

/// Wikipedia source configuration.
///
/// # Examples
///
/// ```
/// use tessera_core::WebConfig;
///
/// let config = WebConfig::default();
/// assert!(config.enabled);
/// assert_eq!(config.language, "es");
/// assert_eq!(config.search_limit, 20);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Consult the web source at all (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Wikipedia language edition (default: `"es"`).
    #[serde(default = "default_language")]
    pub language: String,
    /// Search results to summarize (default: 20).
    #[serde(default = "default_web_search_limit")]
    pub search_limit: usize,
    /// Summary requests in flight (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-request timeout (default: 15).
    #[serde(default = "default_web_timeout")]
    pub timeout_secs: u64,
    /// User-Agent header sent to Wikipedia.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "es".into()
}

fn default_web_search_limit() -> usize {
    20
}

fn default_web_timeout() -> u64 {
    15
}

fn default_user_agent() -> String {
    concat!("tessera/", env!("CARGO_PKG_VERSION")).into()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: default_language(),
            search_limit: default_web_search_limit(),
            concurrency: default_concurrency(),
            timeout_secs: default_web_timeout(),
            user_agent: default_user_agent(),
        }
    }
}
