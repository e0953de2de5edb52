use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown embedding provider: {0} (expected one of google, openai, local, huggingface)")]
    UnknownProvider(String),

    #[error("the {provider} embedding provider requires {var} to be set")]
    MissingCredential {
        provider: &'static str,
        var: &'static str,
    },

    #[error("invalid EMBEDDING_KWARGS: {0}")]
    InvalidKwargs(String),

    #[error("invalid RETRIEVER_CONFIG: {0}")]
    InvalidRetrieverConfig(String),

    #[error("no known dimensionality for {provider} model {model}; set \"dimensions\" in EMBEDDING_KWARGS")]
    UnknownDimensions { provider: &'static str, model: String },

    #[error("unknown {provider} embedding model {model} (available: {available})")]
    UnknownModel {
        provider: &'static str,
        model: String,
        available: &'static str,
    },

    #[error("compute device {0} is not supported by the in-process provider")]
    UnsupportedDevice(String),

    #[error("persisted index was built with {stored} but {configured} is configured; rebuild the index")]
    ProviderMismatch { stored: String, configured: String },

    #[error("invalid chunking config: {0}")]
    InvalidChunking(String),

    #[error("unknown ocr backend: {0} (expected tesseract or http)")]
    UnknownOcrBackend(String),

    #[error("missing setting: {0}")]
    MissingSetting(&'static str),

    #[error("invalid url in {setting}: {source}")]
    InvalidUrl {
        setting: &'static str,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("ocr engine `{0}` was not found on PATH")]
    EngineNotFound(String),

    #[error("`{engine}` exited with {status}: {stderr}")]
    EngineFailed {
        engine: String,
        status: String,
        stderr: String,
    },

    #[error("image is empty or unreadable")]
    EmptyImage,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ocr endpoint failed: {0}")]
    Endpoint(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("ocr failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures from an embedding backend. [`EmbeddingError::is_transient`] decides
/// whether the retry loop may try again.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("{provider} rate limited the request: {message}")]
    RateLimited {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} is unavailable: {message}")]
    Unavailable {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} rejected the request with HTTP {status}: {message}")]
    Rejected {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} returned an unreadable response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    #[error("request to {provider} could not be sent: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned a {got}-dimensional vector, expected {expected}")]
    DimensionMismatch {
        provider: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{provider} returned {got} vectors for {expected} inputs")]
    CountMismatch {
        provider: &'static str,
        expected: usize,
        got: usize,
    },
}

impl EmbeddingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable { .. })
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector {position} has {got} dimensions, index expects {expected}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        position: usize,
    },

    #[error("{chunks} chunks were given with {vectors} vectors")]
    CountMismatch { chunks: usize, vectors: usize },

    #[error("unsupported index format version {found}, expected {expected}")]
    UnsupportedFormat { found: u32, expected: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("answer service rate limited the request: {0}")]
    RateLimited(String),

    #[error("answer service is unavailable: {0}")]
    Unavailable(String),

    #[error("answer service rejected the request with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("answer service returned an unreadable response: {0}")]
    Decode(String),
}

impl AnswerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Unavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_and_outages_are_transient() {
        let transient = EmbeddingError::Unavailable {
            provider: "openai",
            message: "503".to_string(),
        };
        let permanent = EmbeddingError::Rejected {
            provider: "openai",
            status: 401,
            message: "bad key".to_string(),
        };

        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
        assert!(AnswerError::RateLimited("slow down".to_string()).is_transient());
        assert!(!AnswerError::Decode("garbage".to_string()).is_transient());
    }
}
