use crate::chunking::ChunkingConfig;
use crate::error::{ConfigError, IndexError, IngestError};
use crate::models::{Chunk, IndexEntry, ProviderIdentity, RetrievalHit, RetrievalResult};
use crate::traits::Retriever;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub format_version: u32,
    pub identity: ProviderIdentity,
    pub chunking: ChunkingConfig,
    pub created_at: DateTime<Utc>,
    pub entry_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    header: IndexHeader,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(identity: ProviderIdentity, chunking: ChunkingConfig) -> Self {
        Self {
            header: IndexHeader {
                format_version: INDEX_FORMAT_VERSION,
                identity,
                chunking,
                created_at: Utc::now(),
                entry_count: 0,
            },
            entries: Vec::new(),
        }
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn identity(&self) -> &ProviderIdentity {
        &self.header.identity
    }

    pub fn dimensions(&self) -> usize {
        self.header.identity.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Appends `chunks` with their `vectors`. Nothing is added unless every
    /// vector has the index dimensionality.
    pub fn add(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<(), IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        if let Some((position, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, vector)| vector.len() != self.dimensions())
        {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions(),
                got: vector.len(),
                position,
            });
        }

        self.entries.extend(
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexEntry { chunk, vector }),
        );
        self.header.entry_count = self.entries.len();
        Ok(())
    }

    /// Top `k` entries by cosine similarity, best first. Equal scores keep
    /// insertion order.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<RetrievalResult, IndexError> {
        let mut ranked = self.rank(vector, None)?;
        ranked.truncate(k);
        Ok(ranked
            .into_iter()
            .map(|(position, score)| self.hit(position, score))
            .collect())
    }

    pub fn search(&self, vector: &[f32], config: &RetrieverConfig) -> Result<RetrievalResult, IndexError> {
        let filter = config.document_filter.as_deref();
        let positions = match config.search_type {
            SearchType::Similarity => {
                let mut ranked = self.rank(vector, filter)?;
                ranked.truncate(config.k);
                ranked
            }
            SearchType::SimilarityScoreThreshold => {
                let threshold = config.score_threshold.unwrap_or(f32::MIN);
                let mut ranked = self.rank(vector, filter)?;
                ranked.retain(|(_, score)| *score >= threshold);
                ranked.truncate(config.k);
                ranked
            }
            SearchType::Mmr => {
                let mut ranked = self.rank(vector, filter)?;
                ranked.truncate(config.fetch_k.max(config.k));
                self.maximal_marginal_relevance(ranked, config.k, config.lambda_mult)
            }
        };

        Ok(positions
            .into_iter()
            .map(|(position, score)| self.hit(position, score))
            .collect())
    }

    fn rank(&self, vector: &[f32], filter: Option<&str>) -> Result<Vec<(usize, f32)>, IndexError> {
        if vector.len() != self.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions(),
                got: vector.len(),
                position: 0,
            });
        }

        let mut ranked = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| filter.map_or(true, |needle| entry.chunk.source_path.contains(needle)))
            .map(|(position, entry)| (position, cosine_similarity(vector, &entry.vector)))
            .collect::<Vec<_>>();

        ranked.sort_by(|left, right| right.1.total_cmp(&left.1));
        Ok(ranked)
    }

    /// Greedy MMR over `candidates` (already ranked by query similarity).
    /// Reported scores stay the query similarity.
    fn maximal_marginal_relevance(
        &self,
        mut candidates: Vec<(usize, f32)>,
        k: usize,
        lambda: f32,
    ) -> Vec<(usize, f32)> {
        let mut selected: Vec<(usize, f32)> = Vec::with_capacity(k.min(candidates.len()));

        while selected.len() < k && !candidates.is_empty() {
            let mut best = 0;
            let mut best_score = f32::NEG_INFINITY;
            for (slot, (position, relevance)) in candidates.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|(chosen, _)| {
                        cosine_similarity(&self.entries[*position].vector, &self.entries[*chosen].vector)
                    })
                    .fold(f32::NEG_INFINITY, f32::max);
                let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
                let score = lambda * relevance - (1.0 - lambda) * redundancy;
                if score > best_score {
                    best = slot;
                    best_score = score;
                }
            }
            selected.push(candidates.remove(best));
        }

        selected
    }

    fn hit(&self, position: usize, score: f32) -> RetrievalHit {
        RetrievalHit {
            chunk: self.entries[position].chunk.clone(),
            score,
        }
    }

    /// Writes the index next to `path` and renames it into place, so a reader
    /// never sees a half-written file.
    pub async fn save(&self, path: &Path) -> Result<(), IndexError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;

        let bytes = serde_json::to_vec(self)?;
        let staging = staging_path(parent, path);

        let written = async {
            let mut file = tokio::fs::File::create(&staging).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&staging, path).await
        }
        .await;

        if let Err(error) = written {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(error.into());
        }

        info!(path = %path.display(), entries = self.len(), "index saved");
        Ok(())
    }

    /// Reads a saved index. The stored provider identity must equal `expected`.
    pub async fn load(path: &Path, expected: &ProviderIdentity) -> Result<Self, IngestError> {
        let bytes = tokio::fs::read(path).await?;
        let index: Self = serde_json::from_slice(&bytes).map_err(IndexError::from)?;

        if index.header.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::UnsupportedFormat {
                found: index.header.format_version,
                expected: INDEX_FORMAT_VERSION,
            }
            .into());
        }
        if &index.header.identity != expected {
            return Err(ConfigError::ProviderMismatch {
                stored: index.header.identity.to_string(),
                configured: expected.to_string(),
            }
            .into());
        }
        if let Some((position, entry)) = index
            .entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.vector.len() != index.dimensions())
        {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimensions(),
                got: entry.vector.len(),
                position,
            }
            .into());
        }

        debug!(path = %path.display(), entries = index.len(), "index loaded");
        Ok(index)
    }
}

fn staging_path(parent: &Path, target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "index.json".to_string());
    parent.join(format!(".{name}.{}.tmp", Uuid::new_v4()))
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let (mut dot, mut left_norm, mut right_norm) = (0f32, 0f32, 0f32);
    for (a, b) in left.iter().zip(right) {
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    Similarity,
    SimilarityScoreThreshold,
    Mmr,
}

/// Retrieval settings read from the `RETRIEVER_CONFIG` JSON object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrieverConfig {
    pub search_type: SearchType,
    pub k: usize,
    pub score_threshold: Option<f32>,
    pub fetch_k: usize,
    pub lambda_mult: f32,
    /// Keeps only chunks whose source path contains this text.
    #[serde(alias = "filter")]
    pub document_filter: Option<String>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            search_type: SearchType::Similarity,
            k: 5,
            score_threshold: None,
            fetch_k: 20,
            lambda_mult: 0.5,
            document_filter: None,
        }
    }
}

impl RetrieverConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| ConfigError::InvalidRetrieverConfig(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::InvalidRetrieverConfig(message.to_string()));
        if self.k == 0 {
            return invalid("k must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.lambda_mult) {
            return invalid("lambda_mult must be between 0.0 and 1.0");
        }
        if self.search_type == SearchType::SimilarityScoreThreshold && self.score_threshold.is_none() {
            return invalid("similarity_score_threshold requires score_threshold");
        }
        Ok(())
    }
}

/// The live index. Readers take an `Arc` snapshot; writers build a complete
/// replacement and swap it in.
pub struct SharedIndex {
    current: RwLock<Arc<VectorIndex>>,
    writer: Mutex<()>,
}

impl SharedIndex {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
            writer: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self) -> Arc<VectorIndex> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn replace(&self, index: VectorIndex) {
        let _writer = self.writer.lock().await;
        *self.current.write().await = Arc::new(index);
    }

    /// Copy-on-write append: queries keep the old snapshot until the new
    /// index is complete.
    pub async fn add(&self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<(), IndexError> {
        let _writer = self.writer.lock().await;
        let mut next = VectorIndex::clone(&*self.snapshot().await);
        next.add(chunks, vectors)?;
        *self.current.write().await = Arc::new(next);
        Ok(())
    }
}

/// A [`SharedIndex`] queried with fixed retrieval settings.
pub struct IndexRetriever {
    index: Arc<SharedIndex>,
    config: RetrieverConfig,
}

impl IndexRetriever {
    pub fn new(index: Arc<SharedIndex>, config: RetrieverConfig) -> Self {
        Self { index, config }
    }
}

#[async_trait]
impl Retriever for IndexRetriever {
    async fn retrieve(&self, query_vector: &[f32]) -> Result<RetrievalResult, IndexError> {
        let snapshot = self.index.snapshot().await;
        snapshot.search(query_vector, &self.config)
    }
}
