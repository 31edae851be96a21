use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Embedding produced by the embedding provider.
///
/// The length is fixed for a given model and must equal the dimension the
/// vector collection was created with.
pub type EmbeddingVector = Vec<f32>;

/// A note or fetched article before chunking.
///
/// # Examples
///
/// ```
/// use tessera_core::Document;
///
/// let doc = Document {
///     id: "vault/paris.md".into(),
///     title: Some("Paris".into()),
///     text: "Paris is the capital of France.".into(),
///     tag: Some("travel".into()),
/// };
/// assert_eq!(doc.display_title(), "Paris");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Source identity (file path, article title, ...).
    pub id: String,
    /// Optional human-readable title.
    pub title: Option<String>,
    /// Full body text.
    pub text: String,
    /// Tag the document was selected by, if any.
    pub tag: Option<String>,
}

impl Document {
    /// Title to store alongside the document's points.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNTITLED)
    }
}

/// Placeholder title for documents that carry none.
pub const UNTITLED: &str = "Untitled";

/// A token window of a larger document.
///
/// `token_start..token_end` is a half-open range into the tokenizer's unit
/// stream for the source text.
///
/// # Examples
///
/// ```
/// use tessera_core::Chunk;
///
/// let chunk = Chunk {
///     source_id: "Paris".into(),
///     text: "Paris is the capital".into(),
///     token_start: 0,
///     token_end: 4,
/// };
/// assert_eq!(chunk.token_len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Identity of the document the chunk was cut from.
    pub source_id: String,
    /// Source text covered by the token window.
    pub text: String,
    /// First token of the window (inclusive).
    pub token_start: usize,
    /// End of the window (exclusive).
    pub token_end: usize,
}

impl Chunk {
    /// Number of tokens in the window.
    pub fn token_len(&self) -> usize {
        self.token_end - self.token_start
    }
}

/// Data stored with every point in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Title of the source document, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Text that was embedded.
    pub text: String,
}

/// The unit stored and searched in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPoint {
    /// Globally unique point identifier (UUID v4 string).
    pub id: String,
    /// Embedding of `payload.text`.
    pub vector: EmbeddingVector,
    /// Stored payload.
    pub payload: Payload,
}

/// A search result returned by a vector index, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    /// Stored payload of the matched point.
    pub payload: Payload,
    /// Similarity under the collection's metric.
    pub score: f64,
}

/// Input to the ranker.
///
/// Candidates retrieved from the index carry a `score`; freshly fetched
/// candidates carry only a `vector` and are scored by cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Text and title to rank.
    pub payload: Payload,
    /// Embedding, when the candidate has not been scored yet.
    pub vector: Option<EmbeddingVector>,
    /// Precomputed similarity, if any.
    pub score: Option<f64>,
}

impl From<IndexHit> for Candidate {
    fn from(hit: IndexHit) -> Self {
        Self {
            payload: hit.payload,
            vector: None,
            score: Some(hit.score),
        }
    }
}

/// A ranked candidate.
///
/// # Examples
///
/// ```
/// use tessera_core::ScoredCandidate;
///
/// let c = ScoredCandidate {
///     title: Some("Paris".into()),
///     text: "Paris is the capital of France.".into(),
///     score: 0.82,
/// };
/// assert!(c.score > 0.3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    /// Title of the source document, if known.
    pub title: Option<String>,
    /// Candidate text.
    pub text: String,
    /// Similarity to the query, in `[-1, 1]` for cosine.
    pub score: f64,
}

/// Ordered, truncated snippets handed to the completion provider.
///
/// An empty context is valid and renders as the empty string.
///
/// # Examples
///
/// ```
/// use tessera_core::Context;
///
/// let ctx = Context::new(vec!["a".into(), "b".into()], "\n\n");
/// assert_eq!(ctx.render(), "a\n\nb");
/// assert!(Context::empty("\n\n").render().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    items: Vec<String>,
    separator: String,
}

impl Context {
    /// Build a context from already truncated items.
    pub fn new(items: Vec<String>, separator: impl Into<String>) -> Self {
        Self {
            items,
            separator: separator.into(),
        }
    }

    /// A context with no items.
    pub fn empty(separator: impl Into<String>) -> Self {
        Self::new(Vec::new(), separator)
    }

    /// Items in ranked order.
    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing relevant was found.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Join the items with the separator.
    pub fn render(&self) -> String {
        self.items.join(&self.separator)
    }
}

/// A natural-language question, optionally scoped to a note tag.
///
/// # Examples
///
/// ```
/// use tessera_core::Query;
///
/// let q = Query::new("capital of France").with_tag("geo");
/// assert_eq!(q.tag.as_deref(), Some("geo"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Question text.
    pub text: String,
    /// Note tag to pull local documents for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Query {
    /// Query without a tag.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag: None,
        }
    }

    /// Scope local-note retrieval to `tag`.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// A search hit from the web source, before the full article is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebCandidate {
    /// Article title, used to fetch the full text.
    pub title: String,
    /// Short summary used to pick the best article.
    pub summary: String,
    /// Embedding of `summary`, if the source computed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<EmbeddingVector>,
}

/// Similarity metric of a vector collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine similarity (default).
    #[default]
    Cosine,
    /// Raw dot product.
    Dot,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::Dot => write!(f, "dot"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "dot" => Ok(DistanceMetric::Dot),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

/// Sampling options forwarded to the completion provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
    /// Penalty for repeated tokens.
    pub frequency_penalty: f32,
    /// Penalty for tokens already present.
    pub presence_penalty: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Answer returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// The question that was asked.
    pub title: String,
    /// Raw completion text.
    pub content: String,
}

/// Stages of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CollectLocal,
    ScrapeExternal,
    IndexBestArticle,
    EmbedQuery,
    Retrieve,
    Rank,
    Assemble,
    Complete,
}

impl Stage {
    /// Stable snake_case name, used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::CollectLocal => "collect_local",
            Stage::ScrapeExternal => "scrape_external",
            Stage::IndexBestArticle => "index_best_article",
            Stage::EmbedQuery => "embed_query",
            Stage::Retrieve => "retrieve",
            Stage::Rank => "rank",
            Stage::Assemble => "assemble",
            Stage::Complete => "complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened during a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Local notes embedded and upserted.
    pub notes_indexed: usize,
    /// Web candidates considered for the best article.
    pub web_candidates: usize,
    /// Title of the article that was fetched, if any.
    pub best_article: Option<String>,
    /// Article chunks embedded and upserted.
    pub chunks_indexed: usize,
    /// Hits returned by the vector index.
    pub retrieved: usize,
    /// Hits that survived ranking.
    pub kept: usize,
    /// Stages that failed and were skipped.
    pub degraded: Vec<Stage>,
    /// Wall-clock time of the run.
    pub elapsed_ms: u64,
}

/// Successful result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// The completion, titled with the question.
    pub answer: Answer,
    /// Exact prompt sent to the completion provider.
    pub prompt: String,
    /// Run statistics.
    pub report: RunReport,
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use tessera_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "markdown".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn distance_metric_round_trips_through_str() {
        for metric in [DistanceMetric::Cosine, DistanceMetric::Dot] {
            let parsed: DistanceMetric = metric.to_string().parse().unwrap();
            assert_eq!(parsed, metric);
        }
        assert!("euclid".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn untitled_document_gets_placeholder() {
        let doc = Document {
            id: "a.md".into(),
            title: None,
            text: "body".into(),
            tag: None,
        };
        assert_eq!(doc.display_title(), UNTITLED);
    }

    #[test]
    fn index_hit_becomes_prescored_candidate() {
        let hit = IndexHit {
            payload: Payload {
                title: None,
                text: "t".into(),
            },
            score: 0.5,
        };
        let candidate = Candidate::from(hit);
        assert_eq!(candidate.score, Some(0.5));
        assert!(candidate.vector.is_none());
    }

    #[test]
    fn stage_names_are_snake_case() {
        assert_eq!(Stage::IndexBestArticle.to_string(), "index_best_article");
        let json = serde_json::to_string(&Stage::EmbedQuery).unwrap();
        assert_eq!(json, "\"embed_query\"");
    }

    #[test]
    fn payload_omits_missing_title() {
        let payload = Payload {
            title: None,
            text: "x".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("title").is_none());
    }
}
