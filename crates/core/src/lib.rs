pub mod answer;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod loader;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod retry;
pub mod traits;

pub use answer::{build_prompt, GeminiAnswerer};
pub use chunking::{build_chunks, chunk_text, normalize_whitespace, ChunkingConfig, TextNormalizer};
pub use config::{LlmConfig, RagConfig, RagSettings};
pub use embeddings::{
    CharacterNgramEmbedder, Credentials, EmbedTask, EmbeddingBackend, EmbeddingConfig, EmbeddingKwargs,
    EmbeddingProvider, ProviderKind,
};
pub use error::{
    AnswerError, ConfigError, EmbeddingError, IndexError, IngestError, OcrError, QueryError,
};
pub use index::{
    IndexHeader, IndexRetriever, RetrieverConfig, SearchType, SharedIndex, VectorIndex,
};
pub use loader::{
    discover_documents, read_source_document, DocumentLoader, LoadedDocument, LopdfExtractor,
    PdfExtractor,
};
pub use models::{
    Answer, Chunk, DocumentKind, IndexEntry, IngestionOptions, IngestionReport, Page, PageFailure,
    PageOrigin, ProviderIdentity, RetrievalHit, RetrievalResult, SkippedDocument, SourceDocument,
};
pub use ocr::{OcrBackend, OcrConfig, OcrEngine, PdfRasterizer};
pub use pipeline::{IngestionPipeline, QueryPipeline};
pub use retry::RetryPolicy;
pub use traits::{AnswerGenerator, Retriever};
