use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tessera_core::{
    Answer, Chunk, CompletionOptions, CompletionProvider, DistanceMetric, Embedder,
    EmbeddingVector, IndexedPoint, NoteSource, Payload, Query, QueryOutcome, RunReport, Stage,
    TesseraConfig, TesseraError, VectorIndex, WebCandidate, WebSource,
};
use tessera_retrieval::chunker::Chunker;
use tessera_retrieval::context::ContextAssembler;
use tessera_retrieval::embedding::embed_all;
use tessera_retrieval::rank::{best_candidate, rank};
use tokio::time::Instant;
use tracing::Instrument;

use crate::prompt::PromptTemplate;

/// External capabilities a pipeline is assembled from.
///
/// Sources are optional: a pipeline without a note source skips local notes,
/// and one without a web source skips Wikipedia.
pub struct Collaborators {
    /// Embedding provider.
    pub embedder: Arc<dyn Embedder>,
    /// Vector index bound to the configured collection.
    pub index: Arc<dyn VectorIndex>,
    /// Tagged local notes.
    pub notes: Option<Arc<dyn NoteSource>>,
    /// Encyclopedia search and article fetch.
    pub web: Option<Arc<dyn WebSource>>,
    /// Language-model completion.
    pub completion: Arc<dyn CompletionProvider>,
}

struct Settings {
    embedding_model: String,
    embedding_concurrency: usize,
    dimensions: usize,
    collection: String,
    metric: DistanceMetric,
    llm_model: String,
    options: CompletionOptions,
    search_limit: usize,
    score_threshold: f64,
    top_k: usize,
    deadline: Duration,
    stage_timeout: Duration,
    dump_chunks_dir: Option<PathBuf>,
    web_enabled: bool,
}

/// Time left for the run, and the cap for stages that may degrade.
struct Budget {
    deadline: Instant,
    stage_cap: Duration,
}

impl Budget {
    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn optional(&self) -> Duration {
        self.stage_cap.min(self.remaining())
    }
}

/// Retrieval-augmented question answering over notes, an index, and the web.
///
/// A run moves through the [`Stage`]s in order. Local-note collection,
/// web scraping, and article indexing are best effort: their failures are
/// logged, recorded in [`RunReport::degraded`], and the run carries on.
/// From query embedding onwards every failure ends the run with an error,
/// and the completion provider is never called with a partial context.
///
/// Dropping the future returned by [`RagPipeline::run_query`] cancels the run
/// together with any requests in flight.
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    notes: Option<Arc<dyn NoteSource>>,
    web: Option<Arc<dyn WebSource>>,
    completion: Arc<dyn CompletionProvider>,
    chunker: Chunker,
    assembler: ContextAssembler,
    template: PromptTemplate,
    settings: Settings,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("collection", &self.settings.collection)
            .field("embedding_model", &self.settings.embedding_model)
            .field("llm_model", &self.settings.llm_model)
            .field("chunker", &self.chunker)
            .finish_non_exhaustive()
    }
}

impl RagPipeline {
    /// Assemble a pipeline, validating the configuration before any I/O.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidConfig`] for inconsistent settings (for
    /// example an overlap not smaller than the chunk size) or an unusable
    /// prompt template, and tokenizer loading errors.
    pub fn new(config: &TesseraConfig, parts: Collaborators) -> Result<Self, TesseraError> {
        config.validate()?;
        let r = &config.retrieval;

        let chunker = Chunker::from_settings(
            r.tokenizer_path.as_deref(),
            r.chunk_max_tokens,
            r.chunk_overlap_tokens,
        )?;
        let template = PromptTemplate::from_option(r.prompt_template.as_deref())?;
        let assembler = ContextAssembler::new(r.context_item_chars, r.context_separator.clone())
            .with_budget(r.context_budget_chars);

        Ok(Self {
            embedder: parts.embedder,
            index: parts.index,
            notes: parts.notes,
            web: parts.web,
            completion: parts.completion,
            chunker,
            assembler,
            template,
            settings: Settings {
                embedding_model: config.embedding.model.clone(),
                embedding_concurrency: config.embedding.concurrency,
                dimensions: config.embedding.dimensions,
                collection: config.index.collection.clone(),
                metric: config.index.metric,
                llm_model: config.llm.model.clone(),
                options: config.llm.options(),
                search_limit: r.search_limit,
                score_threshold: r.score_threshold,
                top_k: r.top_k,
                deadline: Duration::from_secs(r.deadline_secs),
                stage_timeout: Duration::from_secs(r.stage_timeout_secs),
                dump_chunks_dir: r.dump_chunks_dir.clone(),
                web_enabled: config.web.enabled,
            },
        })
    }

    /// Drop and recreate the configured collection.
    ///
    /// Destroys everything indexed so far. This is a one-off setup step and is
    /// never performed by [`RagPipeline::run_query`].
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::IndexUnavailable`] if the index rejects the reset.
    pub async fn init_collection(&self) -> Result<(), TesseraError> {
        tracing::info!(
            collection = %self.settings.collection,
            dimension = self.settings.dimensions,
            metric = %self.settings.metric,
            "initialising collection"
        );
        self.index
            .reset_collection(
                &self.settings.collection,
                self.settings.dimensions,
                self.settings.metric,
            )
            .await
    }

    /// Answer `query`.
    ///
    /// # Errors
    ///
    /// - [`TesseraError::InvalidConfig`] for an empty question
    /// - [`TesseraError::EmbeddingUnavailable`] if the question cannot be embedded
    /// - [`TesseraError::IndexUnavailable`] or [`TesseraError::DimensionMismatch`]
    ///   if the index cannot be searched
    /// - [`TesseraError::CompletionFailure`] if the model call fails
    /// - [`TesseraError::Timeout`] if a required stage runs past the deadline
    pub async fn run_query(&self, query: &Query) -> Result<QueryOutcome, TesseraError> {
        if query.text.trim().is_empty() {
            return Err(TesseraError::InvalidConfig("query text must not be empty".into()));
        }

        let span = tracing::info_span!("run_query", query = %query.text, tag = ?query.tag);
        self.run(query).instrument(span).await
    }

    async fn run(&self, query: &Query) -> Result<QueryOutcome, TesseraError> {
        let started = Instant::now();
        let budget = Budget {
            deadline: started + self.settings.deadline,
            stage_cap: self.settings.stage_timeout,
        };
        let mut report = RunReport::default();
        let mut query_vector: Option<EmbeddingVector> = None;

        if let (Some(tag), Some(notes)) = (query.tag.as_deref(), &self.notes) {
            let stage = Stage::CollectLocal;
            let t = begin(stage);
            match bounded(stage, budget.optional(), self.collect_local(notes.as_ref(), tag)).await {
                Ok(count) => {
                    report.notes_indexed = count;
                    tracing::info!(stage = %stage, notes = count, elapsed_ms = ms(t), "stage finished");
                }
                Err(e) => degrade(&mut report, stage, &e),
            }
        }

        if let Some(web) = self.web.as_ref().filter(|_| self.settings.web_enabled) {
            let stage = Stage::ScrapeExternal;
            let t = begin(stage);
            let best = match bounded(
                stage,
                budget.optional(),
                self.scrape_external(web.as_ref(), &query.text, &mut query_vector),
            )
            .await
            {
                Ok((seen, best)) => {
                    report.web_candidates = seen;
                    tracing::info!(
                        stage = %stage,
                        candidates = seen,
                        best = best.as_ref().map(|c| c.title.as_str()),
                        elapsed_ms = ms(t),
                        "stage finished"
                    );
                    best
                }
                Err(e) => {
                    degrade(&mut report, stage, &e);
                    None
                }
            };

            if let Some(best) = best {
                let stage = Stage::IndexBestArticle;
                let t = begin(stage);
                report.best_article = Some(best.title.clone());
                match bounded(
                    stage,
                    budget.optional(),
                    self.index_article(web.as_ref(), &best.title, &query.text),
                )
                .await
                {
                    Ok(count) => {
                        report.chunks_indexed = count;
                        tracing::info!(stage = %stage, chunks = count, elapsed_ms = ms(t), "stage finished");
                    }
                    Err(e) => degrade(&mut report, stage, &e),
                }
            }
        }

        let query_vector = match query_vector {
            Some(vector) => vector,
            None => {
                let stage = Stage::EmbedQuery;
                let t = begin(stage);
                let vector = bounded(
                    stage,
                    budget.remaining(),
                    self.embedder.embed(&self.settings.embedding_model, &query.text),
                )
                .await
                .map_err(|e| abort(stage, e))?;
                tracing::info!(stage = %stage, dimension = vector.len(), elapsed_ms = ms(t), "stage finished");
                vector
            }
        };

        let stage = Stage::Retrieve;
        let t = begin(stage);
        let hits = bounded(
            stage,
            budget.remaining(),
            self.index.search(&query_vector, self.settings.search_limit),
        )
        .await
        .map_err(|e| abort(stage, e))?;
        report.retrieved = hits.len();
        tracing::info!(stage = %stage, hits = hits.len(), elapsed_ms = ms(t), "stage finished");

        let stage = Stage::Rank;
        let t = begin(stage);
        let ranked = rank(
            &query_vector,
            hits.into_iter().map(Into::into).collect(),
            self.settings.score_threshold,
            self.settings.top_k,
        );
        report.kept = ranked.len();
        tracing::info!(stage = %stage, kept = ranked.len(), elapsed_ms = ms(t), "stage finished");

        let stage = Stage::Assemble;
        let t = begin(stage);
        let context = self.assembler.assemble(&ranked);
        tracing::info!(stage = %stage, items = context.len(), elapsed_ms = ms(t), "stage finished");

        let stage = Stage::Complete;
        let t = begin(stage);
        let prompt = self.template.render(&context, &query.text);
        let content = bounded(
            stage,
            budget.remaining(),
            self.completion
                .complete(&self.settings.llm_model, &prompt, &self.settings.options),
        )
        .await
        .map_err(|e| abort(stage, e))?;
        tracing::info!(stage = %stage, chars = content.len(), elapsed_ms = ms(t), "stage finished");

        report.elapsed_ms = ms(started);
        if !report.degraded.is_empty() {
            tracing::warn!(degraded = ?report.degraded, "query completed with partial sources");
        }

        Ok(QueryOutcome {
            answer: Answer {
                title: query.text.clone(),
                content,
            },
            prompt,
            report,
        })
    }

    async fn collect_local(&self, notes: &dyn NoteSource, tag: &str) -> Result<usize, TesseraError> {
        let documents = notes.list_by_tag(tag).await?;

        let mut chunks = Vec::new();
        let mut titles = Vec::new();
        let mut contributing = 0;
        for doc in &documents {
            let doc_chunks = self.chunker.chunk(&doc.id, &doc.text)?;
            if !doc_chunks.is_empty() {
                contributing += 1;
            }
            titles.extend(std::iter::repeat(doc.display_title().to_string()).take(doc_chunks.len()));
            chunks.extend(doc_chunks);
        }

        self.embed_and_upsert(&chunks, &titles).await?;
        tracing::debug!(tag, documents = documents.len(), chunks = chunks.len(), "local notes indexed");
        Ok(contributing)
    }

    /// Returns the number of candidates seen and the one closest to the query.
    async fn scrape_external(
        &self,
        web: &dyn WebSource,
        question: &str,
        query_vector: &mut Option<EmbeddingVector>,
    ) -> Result<(usize, Option<WebCandidate>), TesseraError> {
        let found = web.search(question).await?;
        if found.is_empty() {
            return Ok((0, None));
        }
        let seen = found.len();

        // One failed summary costs that candidate only.
        let embedder = self.embedder.as_ref();
        let model = self.settings.embedding_model.as_str();
        let embedded: Vec<Option<WebCandidate>> = stream::iter(found.into_iter().map(
            |mut candidate| async move {
                if candidate.vector.is_some() {
                    return Some(candidate);
                }
                match embedder.embed(model, &candidate.summary).await {
                    Ok(vector) => {
                        candidate.vector = Some(vector);
                        Some(candidate)
                    }
                    Err(e) => {
                        tracing::debug!(title = %candidate.title, error = %e, "dropping web candidate");
                        None
                    }
                }
            },
        ))
        .buffered(self.settings.embedding_concurrency.max(1))
        .collect()
        .await;
        let mut candidates: Vec<WebCandidate> = embedded.into_iter().flatten().collect();
        if candidates.is_empty() {
            return Err(TesseraError::EmbeddingUnavailable(format!(
                "none of {seen} web candidate summaries could be embedded"
            )));
        }

        let query = match query_vector.clone() {
            Some(vector) => vector,
            None => {
                let vector = self
                    .embedder
                    .embed(&self.settings.embedding_model, question)
                    .await?;
                *query_vector = Some(vector.clone());
                vector
            }
        };

        let best = best_candidate(&query, &candidates).map(|(idx, score)| {
            tracing::debug!(title = %candidates[idx].title, score, "best web candidate");
            candidates.swap_remove(idx)
        });
        Ok((seen, best))
    }

    async fn index_article(
        &self,
        web: &dyn WebSource,
        title: &str,
        question: &str,
    ) -> Result<usize, TesseraError> {
        let Some(text) = web.fetch_full_text(title).await? else {
            tracing::info!(title, "article has no body; nothing to index");
            return Ok(0);
        };

        let chunks = self.chunker.chunk(title, &text)?;
        if let Some(dir) = &self.settings.dump_chunks_dir {
            dump_chunks(dir, question, &chunks).await;
        }

        let titles = vec![title.to_string(); chunks.len()];
        self.embed_and_upsert(&chunks, &titles).await?;
        Ok(chunks.len())
    }

    async fn embed_and_upsert(&self, chunks: &[Chunk], titles: &[String]) -> Result<(), TesseraError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_all(
            self.embedder.as_ref(),
            &self.settings.embedding_model,
            &texts,
            self.settings.embedding_concurrency,
        )
        .await?;

        let points = texts
            .into_iter()
            .zip(vectors)
            .zip(titles)
            .map(|((text, vector), title)| IndexedPoint {
                id: uuid::Uuid::new_v4().to_string(),
                vector,
                payload: Payload {
                    title: Some(title.clone()),
                    text,
                },
            })
            .collect();

        self.index.upsert(points).await
    }
}

async fn bounded<T>(
    stage: Stage,
    limit: Duration,
    work: impl Future<Output = Result<T, TesseraError>>,
) -> Result<T, TesseraError> {
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(TesseraError::Timeout {
            stage: stage.to_string(),
        }),
    }
}

fn begin(stage: Stage) -> Instant {
    tracing::info!(stage = %stage, "stage started");
    Instant::now()
}

fn ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn degrade(report: &mut RunReport, stage: Stage, err: &TesseraError) {
    tracing::warn!(stage = %stage, error = %err, "stage failed; continuing without it");
    report.degraded.push(stage);
}

fn abort(stage: Stage, err: TesseraError) -> TesseraError {
    tracing::error!(stage = %stage, error = %err, "query failed");
    err
}

/// File name for the chunk dump of `question`.
fn dump_file_name(question: &str) -> String {
    let slug: String = question
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("rag_chunks_{slug}.txt")
}

async fn dump_chunks(dir: &Path, question: &str, chunks: &[Chunk]) {
    let path = dir.join(dump_file_name(question));
    let body = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    match write_dump(dir, &path, body).await {
        Ok(()) => tracing::debug!(path = %path.display(), chunks = chunks.len(), "chunks written"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to write chunk dump"),
    }
}

async fn write_dump(dir: &Path, path: &Path, body: String) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_file_name_replaces_separators() {
        assert_eq!(dump_file_name("capital of France"), "rag_chunks_capital_of_France.txt");
        assert_eq!(dump_file_name("../etc/passwd"), "rag_chunks____etc_passwd.txt");
        assert_eq!(dump_file_name(" ¿Qué es? "), "rag_chunks__Qué_es_.txt");
    }

    #[tokio::test]
    async fn bounded_turns_elapsed_time_into_timeout() {
        let err = bounded(Stage::Retrieve, Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), TesseraError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, TesseraError::Timeout { ref stage } if stage == "retrieve"));
    }

    #[tokio::test]
    async fn bounded_passes_results_through() {
        let value = bounded(Stage::Rank, Duration::from_secs(1), async { Ok::<_, TesseraError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn budget_optional_never_exceeds_remaining() {
        let budget = Budget {
            deadline: Instant::now() + Duration::from_millis(50),
            stage_cap: Duration::from_secs(60),
        };
        assert!(budget.optional() <= Duration::from_millis(50));

        let budget = Budget {
            deadline: Instant::now() + Duration::from_secs(600),
            stage_cap: Duration::from_secs(1),
        };
        assert_eq!(budget.optional(), Duration::from_secs(1));
    }
}
