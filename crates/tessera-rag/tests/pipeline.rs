use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tessera_core::{
    CompletionOptions, CompletionProvider, DistanceMetric, Document, Embedder, EmbeddingVector,
    IndexHit, IndexedPoint, NoteSource, Query, Stage, TesseraConfig, TesseraError, VectorIndex,
    WebCandidate, WebSource,
};
use tessera_rag::pipeline::{Collaborators, RagPipeline};
use tessera_retrieval::store::SqliteIndex;

const LYON_SUMMARY: &str = "Lyon sits on the river Rhone.";
const PARIS_SUMMARY: &str = "Paris is the capital of France.";

const KEYWORDS: [&str; 6] = ["capital", "france", "paris", "lyon", "river", "cheese"];

const PARIS_ARTICLE: &str = "Paris is the capital of France and its largest city. \
The Seine river crosses Paris from east to west. \
Paris hosts the national government of France. \
Lyon is the third largest city in the country and is known for its food. \
The cheese of the region is famous. \
France has a long history and Paris has been the capital since the Middle Ages.";

/// Counts keyword occurrences, one dimension per keyword.
#[derive(Default)]
struct KeywordEmbedder {
    calls: Mutex<Vec<String>>,
    fail: bool,
    rejected: Vec<&'static str>,
}

impl KeywordEmbedder {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Fails only for the given texts, as a provider does for oversized input.
    fn rejecting(texts: &[&'static str]) -> Self {
        Self {
            rejected: texts.to_vec(),
            ..Self::default()
        }
    }

    fn calls_for(&self, text: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| *t == text).count()
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, _model: &str, text: &str) -> Result<EmbeddingVector, TesseraError> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(TesseraError::EmbeddingUnavailable("connection refused".into()));
        }
        if self.rejected.iter().any(|r| *r == text) {
            return Err(TesseraError::EmbeddingUnavailable(
                "embedding API returned 400: input too long".into(),
            ));
        }
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).collect();
        Ok(KEYWORDS
            .iter()
            .map(|k| words.iter().filter(|w| *w == k).count() as f32)
            .collect())
    }
}

struct FixedNotes(Result<Vec<Document>, ()>);

#[async_trait]
impl NoteSource for FixedNotes {
    async fn list_by_tag(&self, tag: &str) -> Result<Vec<Document>, TesseraError> {
        match &self.0 {
            Ok(docs) => Ok(docs
                .iter()
                .filter(|d| d.tag.as_deref() == Some(tag))
                .cloned()
                .collect()),
            Err(()) => Err(TesseraError::ExternalSourceUnavailable(
                "vault directory missing".into(),
            )),
        }
    }
}

enum WebBehaviour {
    Articles,
    BrokenFetch,
    Outage,
    Hang,
}

struct FakeWiki {
    behaviour: WebBehaviour,
    fetched: Mutex<Vec<String>>,
}

impl FakeWiki {
    fn new(behaviour: WebBehaviour) -> Self {
        Self {
            behaviour,
            fetched: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WebSource for FakeWiki {
    async fn search(&self, _query: &str) -> Result<Vec<WebCandidate>, TesseraError> {
        match self.behaviour {
            WebBehaviour::Articles | WebBehaviour::BrokenFetch => Ok(vec![
                WebCandidate {
                    title: "Lyon".into(),
                    summary: LYON_SUMMARY.into(),
                    vector: None,
                },
                WebCandidate {
                    title: "Paris".into(),
                    summary: PARIS_SUMMARY.into(),
                    vector: None,
                },
            ]),
            WebBehaviour::Outage => Err(TesseraError::ExternalSourceUnavailable(
                "Wikipedia search returned 503 Service Unavailable".into(),
            )),
            WebBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn fetch_full_text(&self, title: &str) -> Result<Option<String>, TesseraError> {
        self.fetched.lock().unwrap().push(title.to_string());
        if matches!(self.behaviour, WebBehaviour::BrokenFetch) {
            return Err(TesseraError::ExternalSourceUnavailable(
                "Wikipedia parse returned 500 Internal Server Error".into(),
            ));
        }
        Ok((title == "Paris").then(|| PARIS_ARTICLE.to_string()))
    }
}

#[derive(Default)]
struct RecordingLlm {
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl RecordingLlm {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for RecordingLlm {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, TesseraError> {
        assert_eq!(model, "mistral:latest");
        assert_eq!(options.temperature, 0.7);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Paris.".into())
    }
}

/// Index that only records calls.
#[derive(Default)]
struct CountingIndex {
    resets: Mutex<usize>,
    upserts: Mutex<Vec<IndexedPoint>>,
}

#[async_trait]
impl VectorIndex for CountingIndex {
    async fn reset_collection(
        &self,
        _name: &str,
        _dimension: usize,
        _metric: DistanceMetric,
    ) -> Result<(), TesseraError> {
        *self.resets.lock().unwrap() += 1;
        Ok(())
    }

    async fn upsert(&self, points: Vec<IndexedPoint>) -> Result<(), TesseraError> {
        self.upserts.lock().unwrap().extend(points);
        Ok(())
    }

    async fn search(&self, _vector: &[f32], _limit: usize) -> Result<Vec<IndexHit>, TesseraError> {
        Ok(Vec::new())
    }
}

/// Index whose writes fail while reads keep working.
struct ReadOnlyIndex;

#[async_trait]
impl VectorIndex for ReadOnlyIndex {
    async fn reset_collection(
        &self,
        _name: &str,
        _dimension: usize,
        _metric: DistanceMetric,
    ) -> Result<(), TesseraError> {
        Ok(())
    }

    async fn upsert(&self, _points: Vec<IndexedPoint>) -> Result<(), TesseraError> {
        Err(TesseraError::IndexUnavailable(
            "attempt to write a readonly database".into(),
        ))
    }

    async fn search(&self, _vector: &[f32], _limit: usize) -> Result<Vec<IndexHit>, TesseraError> {
        Ok(Vec::new())
    }
}

fn config() -> TesseraConfig {
    let mut config = TesseraConfig::default();
    config.embedding.dimensions = KEYWORDS.len();
    config.retrieval.chunk_max_tokens = 20;
    config.retrieval.chunk_overlap_tokens = 5;
    config
}

fn tagged_notes() -> Vec<Document> {
    vec![
        Document {
            id: "vault/capitals.md".into(),
            title: Some("Capitals".into()),
            text: "Paris is the capital of France.".into(),
            tag: Some("geo".into()),
        },
        Document {
            id: "vault/food.md".into(),
            title: None,
            text: "Cheese from France.".into(),
            tag: Some("geo".into()),
        },
        Document {
            id: "vault/other.md".into(),
            title: Some("Other".into()),
            text: "Lyon river cheese.".into(),
            tag: Some("misc".into()),
        },
    ]
}

async fn initialised_index(config: &TesseraConfig) -> Arc<SqliteIndex> {
    let index = Arc::new(SqliteIndex::in_memory(&config.index.collection).unwrap());
    index
        .reset_collection(
            &config.index.collection,
            config.embedding.dimensions,
            DistanceMetric::Cosine,
        )
        .await
        .unwrap();
    index
}

#[tokio::test]
async fn best_article_is_chunked_indexed_and_used() {
    let dump_dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.retrieval.context_item_chars = 60;
    config.retrieval.dump_chunks_dir = Some(dump_dir.path().to_path_buf());

    let embedder = Arc::new(KeywordEmbedder::default());
    let web = Arc::new(FakeWiki::new(WebBehaviour::Articles));
    let llm = Arc::new(RecordingLlm::default());
    let index = initialised_index(&config).await;

    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: embedder.clone(),
            index: index.clone(),
            notes: None,
            web: Some(web.clone()),
            completion: llm.clone(),
        },
    )
    .unwrap();

    let outcome = pipeline.run_query(&Query::new("capital of France")).await.unwrap();

    assert_eq!(outcome.answer.title, "capital of France");
    assert_eq!(outcome.answer.content, "Paris.");
    assert_eq!(outcome.report.web_candidates, 2);
    assert_eq!(outcome.report.best_article.as_deref(), Some("Paris"));
    assert!(outcome.report.chunks_indexed > 1);
    assert!(outcome.report.kept >= 1);
    assert!(outcome.report.kept <= outcome.report.retrieved);
    assert!(outcome.report.degraded.is_empty());
    assert_eq!(*web.fetched.lock().unwrap(), vec!["Paris".to_string()]);

    // the query vector from web selection is reused for retrieval
    assert_eq!(embedder.calls_for("capital of France"), 1);

    let stats = index.stats().unwrap();
    assert_eq!(stats.total_points, outcome.report.chunks_indexed);

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0], outcome.prompt);
    assert!(outcome.prompt.contains("Paris is the capital of France"));
    assert!(outcome.prompt.contains("..."));
    assert!(outcome.prompt.contains("Question: capital of France"));

    let dump = std::fs::read_to_string(dump_dir.path().join("rag_chunks_capital_of_France.txt"))
        .unwrap();
    assert!(dump.starts_with("Paris is the capital of France"));
}

#[tokio::test]
async fn missing_notes_and_web_outage_still_answer() {
    let config = config();
    let web = Arc::new(FakeWiki::new(WebBehaviour::Outage));
    let llm = Arc::new(RecordingLlm::default());

    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: initialised_index(&config).await,
            notes: Some(Arc::new(FixedNotes(Ok(Vec::new())))),
            web: Some(web),
            completion: llm.clone(),
        },
    )
    .unwrap();

    let query = Query::new("capital of France").with_tag("nonexistent");
    let outcome = pipeline.run_query(&query).await.unwrap();

    assert_eq!(outcome.report.notes_indexed, 0);
    assert_eq!(outcome.report.degraded, vec![Stage::ScrapeExternal]);
    assert_eq!(outcome.report.retrieved, 0);
    assert!(outcome.prompt.contains("Context:\n\n\nQuestion: capital of France"));
    assert_eq!(llm.prompts().len(), 1);
}

#[tokio::test]
async fn query_embedding_failure_is_fatal_and_skips_completion() {
    let config = config();
    let llm = Arc::new(RecordingLlm::default());

    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::failing()),
            index: initialised_index(&config).await,
            notes: None,
            web: Some(Arc::new(FakeWiki::new(WebBehaviour::Articles))),
            completion: llm.clone(),
        },
    )
    .unwrap();

    let err = pipeline
        .run_query(&Query::new("capital of France"))
        .await
        .unwrap_err();

    assert!(matches!(err, TesseraError::EmbeddingUnavailable(_)));
    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn tagged_notes_are_indexed_with_titles() {
    let config = config();
    let llm = Arc::new(RecordingLlm::default());
    let index = initialised_index(&config).await;

    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: index.clone(),
            notes: Some(Arc::new(FixedNotes(Ok(tagged_notes())))),
            web: None,
            completion: llm.clone(),
        },
    )
    .unwrap();

    let query = Query::new("capital of France").with_tag("geo");
    let outcome = pipeline.run_query(&query).await.unwrap();

    assert_eq!(outcome.report.notes_indexed, 2);
    assert_eq!(outcome.report.kept, 2);
    assert!(outcome
        .prompt
        .contains("Context:\nParis is the capital of France.\n\nCheese from France.\n"));

    let hits = index.search(&[1.0, 1.0, 0.0, 0.0, 0.0, 0.0], 5).await.unwrap();
    let titles: Vec<_> = hits.iter().map(|h| h.payload.title.as_deref()).collect();
    assert_eq!(titles, vec![Some("Capitals"), Some("Untitled")]);
}

#[tokio::test]
async fn note_source_failure_degrades() {
    let config = config();
    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: initialised_index(&config).await,
            notes: Some(Arc::new(FixedNotes(Err(())))),
            web: None,
            completion: Arc::new(RecordingLlm::default()),
        },
    )
    .unwrap();

    let outcome = pipeline
        .run_query(&Query::new("capital of France").with_tag("geo"))
        .await
        .unwrap();
    assert_eq!(outcome.report.degraded, vec![Stage::CollectLocal]);
    assert_eq!(outcome.answer.content, "Paris.");
}

#[tokio::test]
async fn missing_collection_is_index_unavailable() {
    let config = config();
    let llm = Arc::new(RecordingLlm::default());
    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: Arc::new(SqliteIndex::in_memory(&config.index.collection).unwrap()),
            notes: None,
            web: None,
            completion: llm.clone(),
        },
    )
    .unwrap();

    let err = pipeline.run_query(&Query::new("q")).await.unwrap_err();
    assert!(matches!(err, TesseraError::IndexUnavailable(_)));
    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn hanging_web_source_is_cut_off_by_stage_timeout() {
    let mut config = config();
    config.retrieval.stage_timeout_secs = 1;

    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: initialised_index(&config).await,
            notes: None,
            web: Some(Arc::new(FakeWiki::new(WebBehaviour::Hang))),
            completion: Arc::new(RecordingLlm::default()),
        },
    )
    .unwrap();

    let outcome = pipeline
        .run_query(&Query::new("capital of France"))
        .await
        .unwrap();
    assert_eq!(outcome.report.degraded, vec![Stage::ScrapeExternal]);
}

#[tokio::test]
async fn slow_completion_hits_the_deadline() {
    let mut config = config();
    config.retrieval.deadline_secs = 1;

    let llm = Arc::new(RecordingLlm {
        delay: Some(Duration::from_secs(3600)),
        ..RecordingLlm::default()
    });
    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: initialised_index(&config).await,
            notes: None,
            web: None,
            completion: llm.clone(),
        },
    )
    .unwrap();

    let err = pipeline
        .run_query(&Query::new("capital of France"))
        .await
        .unwrap_err();
    assert!(matches!(err, TesseraError::Timeout { ref stage } if stage == "complete"));
    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn run_query_never_resets_the_collection() {
    let config = config();
    let index = Arc::new(CountingIndex::default());
    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: index.clone(),
            notes: Some(Arc::new(FixedNotes(Ok(tagged_notes())))),
            web: Some(Arc::new(FakeWiki::new(WebBehaviour::Articles))),
            completion: Arc::new(RecordingLlm::default()),
        },
    )
    .unwrap();

    pipeline
        .run_query(&Query::new("capital of France").with_tag("geo"))
        .await
        .unwrap();
    assert_eq!(*index.resets.lock().unwrap(), 0);
    assert!(!index.upserts.lock().unwrap().is_empty());

    let ids: std::collections::HashSet<_> = index
        .upserts
        .lock()
        .unwrap()
        .iter()
        .map(|p| p.id.clone())
        .collect();
    assert_eq!(ids.len(), index.upserts.lock().unwrap().len());

    pipeline.init_collection().await.unwrap();
    assert_eq!(*index.resets.lock().unwrap(), 1);
}

#[tokio::test]
async fn disabled_web_is_not_consulted() {
    let mut config = config();
    config.web.enabled = false;
    let web = Arc::new(FakeWiki::new(WebBehaviour::Articles));

    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: initialised_index(&config).await,
            notes: None,
            web: Some(web.clone()),
            completion: Arc::new(RecordingLlm::default()),
        },
    )
    .unwrap();

    let outcome = pipeline.run_query(&Query::new("capital of France")).await.unwrap();
    assert_eq!(outcome.report.web_candidates, 0);
    assert!(web.fetched.lock().unwrap().is_empty());
}

#[test]
fn invalid_chunking_is_rejected_before_io() {
    let mut config = config();
    config.retrieval.chunk_overlap_tokens = config.retrieval.chunk_max_tokens;

    let err = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: Arc::new(CountingIndex::default()),
            notes: None,
            web: None,
            completion: Arc::new(RecordingLlm::default()),
        },
    )
    .unwrap_err();
    assert!(matches!(err, TesseraError::InvalidConfig(_)));
}

#[tokio::test]
async fn empty_question_is_rejected() {
    let config = config();
    let llm = Arc::new(RecordingLlm::default());
    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: Arc::new(CountingIndex::default()),
            notes: None,
            web: None,
            completion: llm.clone(),
        },
    )
    .unwrap();

    let err = pipeline.run_query(&Query::new("   ")).await.unwrap_err();
    assert!(matches!(err, TesseraError::InvalidConfig(_)));
    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn one_unembeddable_summary_only_drops_that_candidate() {
    let config = config();
    let embedder = Arc::new(KeywordEmbedder::rejecting(&[LYON_SUMMARY]));
    let web = Arc::new(FakeWiki::new(WebBehaviour::Articles));

    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: embedder.clone(),
            index: initialised_index(&config).await,
            notes: None,
            web: Some(web.clone()),
            completion: Arc::new(RecordingLlm::default()),
        },
    )
    .unwrap();

    let outcome = pipeline.run_query(&Query::new("capital of France")).await.unwrap();
    assert_eq!(embedder.calls_for(LYON_SUMMARY), 1);
    assert_eq!(outcome.report.web_candidates, 2);
    assert_eq!(outcome.report.best_article.as_deref(), Some("Paris"));
    assert!(outcome.report.degraded.is_empty());
    assert!(outcome.report.chunks_indexed > 0);
    assert_eq!(*web.fetched.lock().unwrap(), vec!["Paris".to_string()]);
}

#[tokio::test]
async fn no_embeddable_summary_degrades_web_stage() {
    let config = config();
    let embedder = Arc::new(KeywordEmbedder::rejecting(&[LYON_SUMMARY, PARIS_SUMMARY]));
    let web = Arc::new(FakeWiki::new(WebBehaviour::Articles));

    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder,
            index: initialised_index(&config).await,
            notes: None,
            web: Some(web.clone()),
            completion: Arc::new(RecordingLlm::default()),
        },
    )
    .unwrap();

    let outcome = pipeline.run_query(&Query::new("capital of France")).await.unwrap();
    assert_eq!(outcome.report.degraded, vec![Stage::ScrapeExternal]);
    assert!(outcome.report.best_article.is_none());
    assert!(web.fetched.lock().unwrap().is_empty());
    assert_eq!(outcome.answer.content, "Paris.");
}

#[tokio::test]
async fn full_text_failure_degrades_indexing_only() {
    let config = config();
    let llm = Arc::new(RecordingLlm::default());
    let index = initialised_index(&config).await;

    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: index.clone(),
            notes: None,
            web: Some(Arc::new(FakeWiki::new(WebBehaviour::BrokenFetch))),
            completion: llm.clone(),
        },
    )
    .unwrap();

    let outcome = pipeline.run_query(&Query::new("capital of France")).await.unwrap();
    assert_eq!(outcome.report.degraded, vec![Stage::IndexBestArticle]);
    assert_eq!(outcome.report.best_article.as_deref(), Some("Paris"));
    assert_eq!(outcome.report.chunks_indexed, 0);
    assert_eq!(index.stats().unwrap().total_points, 0);
    assert_eq!(outcome.answer.content, "Paris.");
    assert_eq!(llm.prompts().len(), 1);
}

#[tokio::test]
async fn failed_writes_degrade_while_search_still_answers() {
    let config = config();
    let llm = Arc::new(RecordingLlm::default());

    let pipeline = RagPipeline::new(
        &config,
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::default()),
            index: Arc::new(ReadOnlyIndex),
            notes: Some(Arc::new(FixedNotes(Ok(tagged_notes())))),
            web: Some(Arc::new(FakeWiki::new(WebBehaviour::Articles))),
            completion: llm.clone(),
        },
    )
    .unwrap();

    let outcome = pipeline
        .run_query(&Query::new("capital of France").with_tag("geo"))
        .await
        .unwrap();
    assert_eq!(
        outcome.report.degraded,
        vec![Stage::CollectLocal, Stage::IndexBestArticle]
    );
    assert_eq!(outcome.report.retrieved, 0);
    assert_eq!(outcome.answer.content, "Paris.");
    assert_eq!(llm.prompts().len(), 1);
}
