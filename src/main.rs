use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use tessera_core::{
    IndexBackend, NoteSource, OutputFormat, Query, QueryOutcome, TesseraConfig, VectorIndex,
    WebSource,
};
use tessera_rag::llm::LlmClient;
use tessera_rag::pipeline::{Collaborators, RagPipeline};
use tessera_retrieval::chunker::Chunker;
use tessera_retrieval::embedding::EmbeddingClient;
use tessera_retrieval::qdrant::QdrantIndex;
use tessera_retrieval::store::SqliteIndex;
use tessera_sources::notes::VaultNotes;
use tessera_sources::wiki::WikipediaClient;

const CONFIG_FILE: &str = ".tessera.toml";

#[derive(Parser)]
#[command(
    name = "tessera",
    version,
    about = "Ask questions over your notes, a vector index, and Wikipedia",
    long_about = "Tessera answers questions with retrieval-augmented generation.\n\n\
                   Tagged notes from a Markdown vault and the closest Wikipedia article\n\
                   are chunked, embedded, and indexed; the best matches become the\n\
                   context of a single completion call.\n\n\
                   Examples:\n  \
                     tessera init --reset                        Write config and create the collection\n  \
                     tessera ask 'capital of France'             Ask using the index and Wikipedia\n  \
                     tessera ask 'trip budget' --tag travel      Include notes tagged #travel\n  \
                     tessera chunk article.txt --max-tokens 200  Inspect chunk boundaries\n  \
                     tessera doctor                              Check setup and providers"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .tessera.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable output (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  Markdown-formatted output"
    )]
    format: OutputFormat,

    /// Enable verbose output (debug logs on stderr)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Create a default .tessera.toml configuration file
    #[command(long_about = "Create a default .tessera.toml configuration file.\n\n\
        Fails if .tessera.toml already exists, unless --reset is given.\n\
        With --reset the vector collection is dropped and recreated with the\n\
        configured dimension and metric. This destroys everything indexed so far.")]
    Init {
        /// Drop and recreate the vector collection
        #[arg(long)]
        reset: bool,
    },
    /// Answer a question
    #[command(long_about = "Answer a question.\n\n\
        Notes carrying --tag and the best-matching Wikipedia article are indexed\n\
        first; failures there are reported but do not stop the query. The index\n\
        is then searched, hits are ranked and truncated, and the resulting\n\
        context is sent to the completion model.\n\n\
        Examples:\n  tessera ask 'capital of France'\n  tessera ask 'packing list' --tag travel --no-web --show-prompt")]
    Ask {
        /// The question
        query: String,

        /// Index notes carrying this tag before answering
        #[arg(long)]
        tag: Option<String>,

        /// Skip Wikipedia
        #[arg(long)]
        no_web: bool,

        /// Print the prompt sent to the model
        #[arg(long)]
        show_prompt: bool,
    },
    /// List notes carrying a tag
    Notes {
        /// Tag to match (with or without a leading '#')
        #[arg(long)]
        tag: String,
    },
    /// Split a text file into token windows
    Chunk {
        /// File to chunk
        file: PathBuf,

        /// Window size in tokens (default: from config)
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Tokens shared by consecutive windows (default: from config)
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Show vector index statistics
    Status,
    /// Check your Tessera setup and providers
    #[command(long_about = "Check your Tessera setup and providers.\n\n\
        Runs diagnostics for the config file, note vault, embedding and\n\
        completion providers, vector index, and tokenizer. Use --format json\n\
        for machine-readable output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1m\x1b[35m\u{25c6}\x1b[0m \x1b[1mtessera\x1b[0m v{version} | answers from your notes, your index, and Wikipedia\n");

        println!("Quick start:");
        println!("  \x1b[36mtessera init --reset\x1b[0m            Write .tessera.toml and create the collection");
        println!("  \x1b[36mtessera ask 'capital of France'\x1b[0m Ask a question\n");

        println!("All commands:");
        println!("  \x1b[32mask\x1b[0m       Retrieval-augmented answer");
        println!("  \x1b[32mnotes\x1b[0m     List notes carrying a tag");
        println!("  \x1b[32mchunk\x1b[0m     Inspect token windows of a file");
        println!("  \x1b[32mstatus\x1b[0m    Vector index statistics");
        println!("  \x1b[32mdoctor\x1b[0m    Check your setup and providers");
        println!("  \x1b[32minit\x1b[0m      Create default configuration\n");
    } else {
        println!("tessera v{version} | answers from your notes, your index, and Wikipedia\n");

        println!("Quick start:");
        println!("  tessera init --reset            Write .tessera.toml and create the collection");
        println!("  tessera ask 'capital of France' Ask a question\n");

        println!("All commands:");
        println!("  ask       Retrieval-augmented answer");
        println!("  notes     List notes carrying a tag");
        println!("  chunk     Inspect token windows of a file");
        println!("  status    Vector index statistics");
        println!("  doctor    Check your setup and providers");
        println!("  init      Create default configuration\n");
    }

    println!("Run 'tessera <command> --help' for details.");
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "tessera=debug,tessera_core=debug,tessera_retrieval=debug,tessera_sources=debug,tessera_rag=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<TesseraConfig> {
    let config = match path {
        Some(path) => TesseraConfig::from_file(path)
            .into_diagnostic()
            .wrap_err(format!("loading {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                TesseraConfig::from_file(default_path)?
            } else {
                TesseraConfig::default()
            }
        }
    };
    Ok(config.with_env())
}

fn open_index(config: &TesseraConfig) -> Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match config.index.backend {
        IndexBackend::Sqlite => {
            Arc::new(SqliteIndex::open(&config.index.path, &config.index.collection)?)
        }
        IndexBackend::Qdrant => Arc::new(QdrantIndex::new(
            &config.index.url,
            &config.index.collection,
            Duration::from_secs(config.index.timeout_secs),
        )?),
    };
    Ok(index)
}

fn build_pipeline(config: &TesseraConfig, with_notes: bool) -> Result<RagPipeline> {
    let embedder = EmbeddingClient::with_config(&config.embedding)?;
    let completion = LlmClient::new(&config.llm)?;

    let notes: Option<Arc<dyn NoteSource>> = if with_notes {
        Some(Arc::new(VaultNotes::from_config(&config.notes)))
    } else {
        None
    };
    let web: Option<Arc<dyn WebSource>> = if config.web.enabled {
        Some(Arc::new(WikipediaClient::with_config(&config.web)?))
    } else {
        None
    };

    let pipeline = RagPipeline::new(
        config,
        Collaborators {
            embedder: Arc::new(embedder),
            index: open_index(config)?,
            notes,
            web,
            completion: Arc::new(completion),
        },
    )?;
    Ok(pipeline)
}

fn spinner(message: &'static str) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

fn print_outcome(outcome: &QueryOutcome, format: OutputFormat, show_prompt: bool) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("## {}\n", outcome.answer.title);
            println!("{}\n", outcome.answer.content);
            if show_prompt {
                println!("<details><summary>Prompt</summary>\n\n```text\n{}\n```\n</details>", outcome.prompt);
            }
        }
        OutputFormat::Text => {
            if show_prompt {
                println!("--- prompt ---\n{}\n--- answer ---", outcome.prompt);
            }
            println!("{}", outcome.answer.content);
        }
    }

    let report = &outcome.report;
    if !report.degraded.is_empty() {
        let stages: Vec<&str> = report.degraded.iter().map(|s| s.as_str()).collect();
        eprintln!("note: answered without {}", stages.join(", "));
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

/// GET `url` and report the status line, or why the request failed.
async fn probe(client: &reqwest::Client, url: &str) -> std::result::Result<String, String> {
    match client.get(url).send().await {
        Ok(r) if r.status().is_success() => Ok(r.status().to_string()),
        Ok(r) => Err(format!("{url} returned {}", r.status())),
        Err(e) => Err(format!("{url} unreachable: {e}")),
    }
}

async fn check_provider(
    client: &reqwest::Client,
    name: &'static str,
    provider: &str,
    base_url: &str,
    has_key: bool,
) -> CheckResult {
    match provider {
        "ollama" => {
            let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
            match probe(client, &url).await {
                Ok(_) => CheckResult::pass(name, format!("ollama at {base_url}")),
                Err(e) => CheckResult::fail(name, e, "start Ollama with `ollama serve` or set OLLAMA_HOST"),
            }
        }
        "openai" if has_key => CheckResult::pass(name, format!("openai-compatible at {base_url}")),
        "openai" => CheckResult::fail(
            name,
            "OPENAI_API_KEY not set",
            format!("export OPENAI_API_KEY=... or set api_key in {CONFIG_FILE}"),
        ),
        other => CheckResult::fail(name, format!("unknown provider '{other}'"), "use \"ollama\" or \"openai\""),
    }
}

async fn run_doctor(config: &TesseraConfig, format: OutputFormat, use_color: bool) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .into_diagnostic()?;

    // 1. Config file
    if Path::new(CONFIG_FILE).exists() {
        checks.push(CheckResult::pass("config_file", format!("{CONFIG_FILE} found")));
    } else {
        checks.push(CheckResult::fail(
            "config_file",
            format!("{CONFIG_FILE} not found"),
            "run 'tessera init' to create a default config",
        ));
    }
    match config.validate() {
        Ok(()) => checks.push(CheckResult::pass(
            "retrieval_settings",
            format!(
                "{} token windows, {} overlap, top {}",
                config.retrieval.chunk_max_tokens,
                config.retrieval.chunk_overlap_tokens,
                config.retrieval.top_k
            ),
        )),
        Err(e) => checks.push(CheckResult::fail(
            "retrieval_settings",
            e.to_string(),
            format!("fix the [retrieval] section of {CONFIG_FILE}"),
        )),
    }

    // 2. Note vault
    let vault = VaultNotes::from_config(&config.notes);
    if vault.root().is_dir() {
        checks.push(CheckResult::pass("note_vault", vault.root().display().to_string()));
    } else {
        checks.push(CheckResult::fail(
            "note_vault",
            format!("{} not found", vault.root().display()),
            "export VAULT_PATH=... or set [notes] vault_path",
        ));
    }

    // 3. Providers
    checks.push(
        check_provider(
            &client,
            "embedding_provider",
            &config.embedding.provider,
            &config.embedding.base_url,
            config.embedding.api_key.is_some(),
        )
        .await,
    );
    let llm_base = config.llm.base_url.clone().unwrap_or_else(|| {
        match config.llm.provider.as_str() {
            "openai" => "https://api.openai.com".into(),
            _ => "http://localhost:11434".into(),
        }
    });
    checks.push(
        check_provider(
            &client,
            "llm_provider",
            &config.llm.provider,
            &llm_base,
            config.llm.api_key.is_some() || std::env::var("OPENAI_API_KEY").is_ok(),
        )
        .await,
    );

    // 4. Vector index
    match config.index.backend {
        IndexBackend::Sqlite => {
            let path = &config.index.path;
            if !path.exists() {
                checks.push(CheckResult::fail(
                    "vector_index",
                    format!("{} not found", path.display()),
                    "run 'tessera init --reset' to create the collection",
                ));
            } else {
                match SqliteIndex::open(path, &config.index.collection).and_then(|i| i.stats()) {
                    Ok(stats) if stats.dimension.is_some() => checks.push(CheckResult::pass(
                        "vector_index",
                        format!(
                            "'{}' has {} points (dimension {})",
                            stats.collection,
                            stats.total_points,
                            stats.dimension.unwrap_or_default()
                        ),
                    )),
                    Ok(stats) => checks.push(CheckResult::fail(
                        "vector_index",
                        format!("collection '{}' missing", stats.collection),
                        "run 'tessera init --reset' to create the collection",
                    )),
                    Err(e) => checks.push(CheckResult::fail(
                        "vector_index",
                        e.to_string(),
                        format!("delete {} and run 'tessera init --reset'", path.display()),
                    )),
                }
            }
        }
        IndexBackend::Qdrant => {
            let hint = "start Qdrant or set QDRANT_URL, then run 'tessera init --reset'";
            let exists = match QdrantIndex::new(
                &config.index.url,
                &config.index.collection,
                Duration::from_secs(3),
            ) {
                Ok(index) => index.collection_exists().await,
                Err(e) => Err(e),
            };
            match exists {
                Ok(true) => checks.push(CheckResult::pass(
                    "vector_index",
                    format!("qdrant collection '{}'", config.index.collection),
                )),
                Ok(false) => checks.push(CheckResult::fail(
                    "vector_index",
                    format!("collection '{}' not found at {}", config.index.collection, config.index.url),
                    "run 'tessera init --reset'",
                )),
                Err(e) => checks.push(CheckResult::fail("vector_index", e.to_string(), hint)),
            }
        }
    }

    // 5. Tokenizer
    match &config.retrieval.tokenizer_path {
        Some(path) if path.exists() => {
            checks.push(CheckResult::pass("tokenizer", path.display().to_string()));
        }
        Some(path) => checks.push(CheckResult::fail(
            "tokenizer",
            format!("{} not found", path.display()),
            "download tokenizer.json for your embedding model or unset tokenizer_path",
        )),
        None => checks.push(CheckResult::info("tokenizer", "word-level (no tokenizer_path set)")),
    }

    // 6. Web source
    if config.web.enabled {
        checks.push(CheckResult::info(
            "web_source",
            format!("https://{}.wikipedia.org", config.web.language),
        ));
    } else {
        checks.push(CheckResult::info("web_source", "disabled"));
    }

    match format {
        OutputFormat::Json => {
            let version = env!("CARGO_PKG_VERSION");
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let version = env!("CARGO_PKG_VERSION");
            println!("Tessera v{version} | environment check\n");

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<20} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Tessera Configuration

[embedding]
# provider = "ollama"            # or "openai"
# base_url = "http://localhost:11434"
# model = "nomic-embed-text"
# dimensions = 768
# concurrency = 4

[llm]
# provider = "ollama"            # or "openai"
# model = "mistral:latest"
# temperature = 0.7
# top_p = 1.0

[index]
# backend = "sqlite"             # or "qdrant"
# path = ".tessera/index.db"
# url = "http://localhost:6334"   # gRPC port
# timeout_secs = 30
# collection = "notes"
# metric = "cosine"

[retrieval]
# chunk_max_tokens = 500
# chunk_overlap_tokens = 50
# search_limit = 5
# score_threshold = 0.3
# top_k = 5
# context_item_chars = 500
# deadline_secs = 180
# tokenizer_path = "tokenizer.json"
# dump_chunks_dir = ".tessera/chunks"

[notes]
# vault_path = "~/obsidian/test"
# extension = "md"

[web]
# enabled = true
# language = "es"
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
        }
        Some(Command::Init { reset }) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                if !reset {
                    miette::bail!("{CONFIG_FILE} already exists");
                }
            } else {
                std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
                println!("Created {CONFIG_FILE} with default configuration");
            }

            if reset {
                config.validate()?;
                let index = open_index(&config)?;
                index
                    .reset_collection(
                        &config.index.collection,
                        config.embedding.dimensions,
                        config.index.metric,
                    )
                    .await?;
                println!(
                    "Recreated collection '{}' ({} dimensions, {})",
                    config.index.collection, config.embedding.dimensions, config.index.metric
                );
            }
        }
        Some(Command::Ask {
            query,
            tag,
            no_web,
            show_prompt,
        }) => {
            if no_web {
                config.web.enabled = false;
            }
            let pipeline = build_pipeline(&config, tag.is_some())?;
            let query = Query { text: query, tag };

            let pb = spinner("Thinking...");
            let outcome = pipeline.run_query(&query).await.inspect_err(|_e| {
                if let Some(pb) = &pb {
                    pb.finish_and_clear();
                }
            })?;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            if cli.verbose {
                let r = &outcome.report;
                eprintln!(
                    "notes: {}, web candidates: {}, article: {}, chunks: {}, retrieved: {}, kept: {}, {} ms",
                    r.notes_indexed,
                    r.web_candidates,
                    r.best_article.as_deref().unwrap_or("-"),
                    r.chunks_indexed,
                    r.retrieved,
                    r.kept,
                    r.elapsed_ms
                );
            }
            print_outcome(&outcome, cli.format, show_prompt)?;
        }
        Some(Command::Notes { ref tag }) => {
            let vault = VaultNotes::from_config(&config.notes);
            let notes = vault.scan(tag)?;

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&notes).into_diagnostic()?);
                }
                OutputFormat::Markdown => {
                    println!("# Notes tagged `{tag}`\n");
                    for note in &notes {
                        println!("- **{}** `{}`", note.display_title(), note.id);
                    }
                }
                OutputFormat::Text => {
                    for note in &notes {
                        println!("{}\t{}", note.id, note.display_title());
                    }
                    eprintln!("{} notes tagged '{tag}' in {}", notes.len(), vault.root().display());
                }
            }
        }
        Some(Command::Chunk {
            ref file,
            max_tokens,
            overlap,
        }) => {
            let text = std::fs::read_to_string(file)
                .into_diagnostic()
                .wrap_err(format!("reading {}", file.display()))?;
            let chunker = Chunker::from_settings(
                config.retrieval.tokenizer_path.as_deref(),
                max_tokens.unwrap_or(config.retrieval.chunk_max_tokens),
                overlap.unwrap_or(config.retrieval.chunk_overlap_tokens),
            )?;
            let chunks = chunker.chunk(&file.display().to_string(), &text)?;

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&chunks).into_diagnostic()?);
                }
                _ => {
                    for (i, chunk) in chunks.iter().enumerate() {
                        let preview: String = chunk.text.chars().take(60).collect();
                        println!(
                            "#{i:<3} tokens {}..{} ({}) {preview}",
                            chunk.token_start,
                            chunk.token_end,
                            chunk.token_len()
                        );
                    }
                    eprintln!(
                        "{} chunks ({} tokens per window, {} overlap)",
                        chunks.len(),
                        chunker.max_tokens(),
                        chunker.overlap_tokens()
                    );
                }
            }
        }
        Some(Command::Status) => match config.index.backend {
            IndexBackend::Sqlite => {
                let index = SqliteIndex::open(&config.index.path, &config.index.collection)?;
                let stats = index.stats()?;
                match cli.format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&stats).into_diagnostic()?);
                    }
                    _ => {
                        println!("Index: {}", config.index.path.display());
                        println!("Collection: {}", stats.collection);
                        match (stats.dimension, stats.metric) {
                            (Some(dimension), Some(metric)) => {
                                println!("Dimension: {dimension} ({metric})");
                            }
                            _ => println!("Dimension: - (run 'tessera init --reset')"),
                        }
                        println!("Points: {}", stats.total_points);
                        println!("Size: {:.1} KB", stats.index_size_bytes as f64 / 1024.0);
                    }
                }
            }
            IndexBackend::Qdrant => {
                println!("Index: qdrant at {}", config.index.url);
                println!("Collection: {}", config.index.collection);
                println!("Run 'tessera doctor' to check that the collection exists.");
            }
        },
        Some(Command::Doctor) => {
            run_doctor(&config, cli.format, use_color).await?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "tessera", &mut std::io::stdout());
        }
    }

    Ok(())
}
