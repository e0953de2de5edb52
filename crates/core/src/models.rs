use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Text,
    Pdf,
    Image,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp" => Some(Self::Image),
            "txt" | "md" => Some(Self::Text),
            _ => None,
        }
    }
}

/// A corpus file as read from disk. Never mutated after discovery.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub document_id: String,
    pub source_path: String,
    pub title: String,
    pub kind: DocumentKind,
    pub checksum: String,
    pub bytes: Vec<u8>,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageOrigin {
    Direct,
    Ocr,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub document_id: String,
    pub number: u32,
    pub text: String,
    pub origin: PageOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_path: String,
    pub page: u32,
    pub chunk_index: u32,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Which backend and model produced a set of vectors. Two indexes are only
/// comparable when their identities are equal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProviderIdentity {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({} dims)", self.provider, self.model, self.dimensions)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalHit {
    pub chunk: Chunk,
    pub score: f32,
}

pub type RetrievalResult = Vec<RetrievalHit>;

/// Outcome of a question. A model that produces no content is reported as
/// [`Answer::NoAnswer`], never as an empty `Answered`.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Answered {
        text: String,
        citations: Vec<RetrievalHit>,
    },
    NoAnswer {
        reason: String,
        citations: Vec<RetrievalHit>,
    },
}

impl Answer {
    pub fn citations(&self) -> &[RetrievalHit] {
        match self {
            Self::Answered { citations, .. } | Self::NoAnswer { citations, .. } => citations,
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered { .. })
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub min_chunk_chars: usize,
    /// Pages whose extracted text is shorter than this are treated as scanned
    /// and sent through OCR.
    pub ocr_min_chars: usize,
    pub workers: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 4_000,
            chunk_overlap_chars: 200,
            min_chunk_chars: 200,
            ocr_min_chars: 40,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageFailure {
    pub source_path: String,
    pub page: u32,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub source_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub documents: usize,
    pub pages: usize,
    pub chunks: usize,
    pub page_failures: Vec<PageFailure>,
    pub skipped_documents: Vec<SkippedDocument>,
}
