use anyhow::Context;
use campus_rag_core::{
    Answer, IngestionReport, QueryPipeline, RagConfig, RagSettings, RetrievalHit,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXIT_WORD: &str = "sair";

#[derive(Parser)]
#[command(name = "campus-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Embedding provider: google, openai, huggingface or local
    #[arg(long, env = "EMBEDDING_PROVIDER", default_value = "local")]
    embedding_provider: String,

    /// Embedding model; each provider has its own default
    #[arg(long, env = "EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Provider tuning as a JSON object (batch_size, dimensions, normalize, ...)
    #[arg(long, env = "EMBEDDING_KWARGS")]
    embedding_kwargs: Option<String>,

    /// Retrieval settings as a JSON object (search_type, k, fetch_k, ...)
    #[arg(long, env = "RETRIEVER_CONFIG")]
    retriever_config: Option<String>,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    hf_token: Option<String>,

    /// OCR backend: tesseract or http
    #[arg(long, env = "OCR_BACKEND", default_value = "tesseract")]
    ocr_backend: String,

    #[arg(long, env = "OCR_LANGUAGE", default_value = "por")]
    ocr_language: String,

    /// Multimodal OCR endpoint, required by the http backend
    #[arg(long, env = "OCR_ENDPOINT")]
    ocr_endpoint: Option<String>,

    #[arg(long, env = "OCR_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,

    /// Pages with less extracted text than this are sent through OCR
    #[arg(long, env = "OCR_MIN_CHARS", default_value = "40")]
    ocr_min_chars: usize,

    /// Longest chunk, in characters
    #[arg(long, env = "CHUNK_MAX_CHARS", default_value = "4000")]
    chunk_max_chars: usize,

    /// Characters shared by consecutive chunks of a page
    #[arg(long, env = "CHUNK_OVERLAP_CHARS", default_value = "200")]
    chunk_overlap_chars: usize,

    /// A page tail shorter than this is anchored to the end of the page
    #[arg(long, env = "MIN_CHUNK_CHARS", default_value = "200")]
    min_chunk_chars: usize,

    /// Documents loaded concurrently; also caps concurrent OCR work
    #[arg(long, env = "INGEST_WORKERS", default_value = "4")]
    workers: usize,

    /// Folder that contains the corpus, searched recursively
    #[arg(long, env = "CORPUS_DIR", default_value = "dados/")]
    corpus_dir: PathBuf,

    /// Where the vector index is persisted
    #[arg(long, env = "INDEX_PATH", default_value = "dados/.index/index.json")]
    index_path: PathBuf,

    /// Language model used to write answers
    #[arg(long, env = "LLM_MODEL", default_value = "gemini-2.0-flash")]
    llm_model: String,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the index from the corpus folder.
    Ingest,
    /// Answer a single question.
    Ask {
        question: String,
        /// Re-ingest the corpus even when a matching index exists.
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
    /// Ask questions interactively until `sair`.
    Chat {
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },
}

impl Cli {
    fn settings(&self) -> RagSettings {
        RagSettings {
            embedding_provider: self.embedding_provider.clone(),
            embedding_model: self.embedding_model.clone(),
            embedding_kwargs: self.embedding_kwargs.clone(),
            retriever_config: self.retriever_config.clone(),
            google_api_key: self.google_api_key.clone(),
            openai_api_key: self.openai_api_key.clone(),
            hf_token: self.hf_token.clone(),
            ocr_backend: self.ocr_backend.clone(),
            ocr_language: self.ocr_language.clone(),
            ocr_endpoint: self.ocr_endpoint.clone(),
            ocr_api_key: self.ocr_api_key.clone(),
            ocr_min_chars: self.ocr_min_chars,
            chunk_max_chars: self.chunk_max_chars,
            chunk_overlap_chars: self.chunk_overlap_chars,
            min_chunk_chars: self.min_chunk_chars,
            workers: self.workers,
            corpus_dir: self.corpus_dir.clone(),
            index_path: self.index_path.clone(),
            llm_model: self.llm_model.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = RagConfig::from_settings(cli.settings()).context("invalid configuration")?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        provider = %config.embedding.provider,
        model = %config.embedding.model_name,
        "campus-rag boot"
    );

    match cli.command {
        Command::Ingest => {
            let ingestion = config.ingestion_pipeline()?;
            let report = ingestion
                .run(&config.corpus_dir)
                .await
                .with_context(|| format!("ingestion of {} failed", config.corpus_dir.display()))?;
            print_report(&report);
            println!(
                "index written to {} at {}",
                config.index_path.display(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask { question, rebuild } => {
            let query = open_query_pipeline(&config, rebuild).await?;
            let answer = query.answer(&question).await?;
            print_answer(&answer);
        }
        Command::Chat { rebuild } => {
            let query = open_query_pipeline(&config, rebuild).await?;
            chat(&query).await?;
        }
    }

    Ok(())
}

async fn open_query_pipeline(config: &RagConfig, rebuild: bool) -> anyhow::Result<QueryPipeline> {
    let answerer = config.llm.build_answerer()?;
    let ingestion = config.ingestion_pipeline()?;

    if let Some(report) = ingestion
        .open_or_rebuild(&config.corpus_dir, rebuild)
        .await
        .context("could not open the index (pass --rebuild after changing the embedding provider)")?
    {
        print_report(&report);
    }

    let query = QueryPipeline::over_index(
        config.embedding_provider()?,
        ingestion.shared_index(),
        config.retriever.clone(),
        Arc::new(answerer),
    )
    .await?;
    Ok(query)
}

async fn chat(query: &QueryPipeline) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nPergunta (ou '{EXIT_WORD}' para encerrar): ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case(EXIT_WORD) {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match query.answer(question).await {
            Ok(answer) => print_answer(&answer),
            Err(error) => warn!(error = %error, "question failed"),
        }
    }
    Ok(())
}

fn print_report(report: &IngestionReport) {
    println!(
        "{} documents, {} pages, {} chunks indexed",
        report.documents, report.pages, report.chunks
    );
    for failure in &report.page_failures {
        println!(
            "  page failed: {} (page {}): {}",
            failure.source_path, failure.page, failure.reason
        );
    }
    for skipped in &report.skipped_documents {
        println!("  document skipped: {}: {}", skipped.source_path, skipped.reason);
    }
}

fn print_answer(answer: &Answer) {
    match answer {
        Answer::Answered { text, .. } => println!("\nResposta: {text}"),
        Answer::NoAnswer { reason, .. } => println!("\nSem resposta: {reason}"),
    }
    print_citations(answer.citations());
}

fn print_citations(citations: &[RetrievalHit]) {
    if citations.is_empty() {
        return;
    }
    println!("\nFontes:");
    for (position, hit) in citations.iter().enumerate() {
        println!(
            "[{}] {} (página {}) score={:.4}",
            position + 1,
            hit.chunk.source_path,
            hit.chunk.page,
            hit.score
        );
    }
}
