use crate::chunking::{build_chunks, ChunkingConfig};
use crate::embeddings::EmbeddingProvider;
use crate::error::{ConfigError, IngestError, QueryError};
use crate::index::{IndexRetriever, RetrieverConfig, SharedIndex, VectorIndex};
use crate::loader::DocumentLoader;
use crate::models::{Answer, Chunk, IngestionReport};
use crate::traits::{AnswerGenerator, Retriever};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct IngestionPipeline {
    loader: DocumentLoader,
    provider: EmbeddingProvider,
    chunking: ChunkingConfig,
    index: Arc<SharedIndex>,
    index_path: PathBuf,
}

impl IngestionPipeline {
    pub fn new(
        loader: DocumentLoader,
        provider: EmbeddingProvider,
        index_path: impl Into<PathBuf>,
    ) -> Result<Self, IngestError> {
        let chunking = ChunkingConfig::from(loader.options());
        chunking.validate()?;
        let index = Arc::new(SharedIndex::new(VectorIndex::new(
            provider.identity().clone(),
            chunking,
        )));

        Ok(Self {
            loader,
            provider,
            chunking,
            index,
            index_path: index_path.into(),
        })
    }

    /// The live index this pipeline publishes into.
    pub fn shared_index(&self) -> Arc<SharedIndex> {
        Arc::clone(&self.index)
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Loads, chunks and embeds the corpus under `root`, persists the new index
    /// and swaps it in. An embedding failure aborts before anything is written.
    pub async fn run(&self, root: &Path) -> Result<IngestionReport, IngestError> {
        let mut report = IngestionReport::default();
        let mut chunks: Vec<Chunk> = Vec::new();

        let mut documents = std::pin::pin!(self.loader.load_corpus(root)?);
        while let Some(loaded) = documents.next().await {
            let loaded = match loaded {
                Ok(loaded) => loaded,
                Err(skipped) => {
                    report.skipped_documents.push(skipped);
                    continue;
                }
            };

            report.documents += 1;
            report.pages += loaded.pages.len();
            report.page_failures.extend(loaded.failures);
            for page in &loaded.pages {
                chunks.extend(build_chunks(
                    &loaded.document.document_id,
                    &loaded.document.source_path,
                    page.number,
                    &page.text,
                    &self.chunking,
                )?);
            }
        }
        report.chunks = chunks.len();

        info!(
            documents = report.documents,
            pages = report.pages,
            chunks = report.chunks,
            failed_pages = report.page_failures.len(),
            skipped = report.skipped_documents.len(),
            "corpus chunked, embedding"
        );
        if chunks.is_empty() {
            warn!(root = %root.display(), "corpus produced no text to index");
        }

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
        let vectors = self.provider.embed_all(&texts).await?;

        let mut index = VectorIndex::new(self.provider.identity().clone(), self.chunking);
        index.add(chunks, vectors)?;
        index.save(&self.index_path).await?;
        self.index.replace(index).await;

        info!(path = %self.index_path.display(), entries = report.chunks, "index published");
        Ok(report)
    }

    /// Publishes the persisted index when it exists and was built by the
    /// configured provider; otherwise ingests `root`. A provider mismatch is
    /// fatal unless `rebuild` is set.
    pub async fn open_or_rebuild(
        &self,
        root: &Path,
        rebuild: bool,
    ) -> Result<Option<IngestionReport>, IngestError> {
        if rebuild || !tokio::fs::try_exists(&self.index_path).await? {
            return self.run(root).await.map(Some);
        }

        let index = VectorIndex::load(&self.index_path, self.provider.identity()).await?;
        info!(path = %self.index_path.display(), entries = index.len(), "using persisted index");
        self.index.replace(index).await;
        Ok(None)
    }
}

pub struct QueryPipeline {
    provider: EmbeddingProvider,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn AnswerGenerator>,
}

impl QueryPipeline {
    pub fn new(
        provider: EmbeddingProvider,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            provider,
            retriever,
            generator,
        }
    }

    /// Queries `index` with `config`. The index must have been built by the
    /// same provider that embeds the questions.
    pub async fn over_index(
        provider: EmbeddingProvider,
        index: Arc<SharedIndex>,
        config: RetrieverConfig,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Result<Self, QueryError> {
        config.validate()?;
        let stored = index.snapshot().await.identity().clone();
        if &stored != provider.identity() {
            return Err(ConfigError::ProviderMismatch {
                stored: stored.to_string(),
                configured: provider.identity().to_string(),
            }
            .into());
        }
        Ok(Self::new(
            provider,
            Arc::new(IndexRetriever::new(index, config)),
            generator,
        ))
    }

    pub async fn answer(&self, question: &str) -> Result<Answer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let vector = self.provider.embed_query(question).await?;
        let hits = self.retriever.retrieve(&vector).await?;
        if hits.is_empty() {
            return Ok(Answer::NoAnswer {
                reason: "no relevant passages were found".to_string(),
                citations: Vec::new(),
            });
        }

        match self.generator.generate(question, &hits).await {
            Ok(Some(text)) if !text.trim().is_empty() => Ok(Answer::Answered {
                text,
                citations: hits,
            }),
            Ok(_) => Ok(Answer::NoAnswer {
                reason: "the language model returned no content".to_string(),
                citations: hits,
            }),
            Err(error) => {
                warn!(error = %error, "answer generation failed");
                Ok(Answer::NoAnswer {
                    reason: error.to_string(),
                    citations: hits,
                })
            }
        }
    }
}
