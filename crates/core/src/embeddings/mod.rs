mod google;
pub(crate) mod http;
mod huggingface;
mod local;
mod openai;

pub use google::GoogleEmbedder;
pub use huggingface::HuggingFaceEmbedder;
pub use local::{CharacterNgramEmbedder, DEFAULT_LOCAL_DIMENSIONS, DEFAULT_NGRAM, LOCAL_MODEL_NAME};
pub use openai::OpenAiEmbedder;

use crate::error::{ConfigError, EmbeddingError};
use crate::models::ProviderIdentity;
use crate::retry::{with_backoff, RetryPolicy};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Google,
    OpenAi,
    Local,
    HuggingFace,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::OpenAi => "openai",
            Self::Local => "local",
            Self::HuggingFace => "huggingface",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Google => "models/embedding-001",
            Self::OpenAi => "text-embedding-3-small",
            Self::Local => LOCAL_MODEL_NAME,
            Self::HuggingFace => "intfloat/multilingual-e5-small",
        }
    }

    /// Environment variable holding the credential this provider cannot run without.
    pub fn required_credential(&self) -> Option<&'static str> {
        match self {
            Self::Google => Some("GOOGLE_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Local | Self::HuggingFace => None,
        }
    }

    fn known_dimensions(&self, model: &str) -> Option<usize> {
        let model = model.trim_start_matches("models/");
        match (self, model) {
            (Self::Google, "embedding-001" | "text-embedding-004") => Some(768),
            (Self::Google, "gemini-embedding-001") => Some(3072),
            (Self::OpenAi, "text-embedding-3-small" | "text-embedding-ada-002") => Some(1536),
            (Self::OpenAi, "text-embedding-3-large") => Some(3072),
            (
                Self::HuggingFace,
                "intfloat/multilingual-e5-small"
                | "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2"
                | "sentence-transformers/all-MiniLM-L6-v2",
            ) => Some(384),
            (Self::HuggingFace, "intfloat/multilingual-e5-base") => Some(768),
            (Self::Local, LOCAL_MODEL_NAME) => Some(DEFAULT_LOCAL_DIMENSIONS),
            _ => None,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAi),
            "local" => Ok(Self::Local),
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-specific tuning read from the `EMBEDDING_KWARGS` JSON object.
/// Unknown keys are rejected so typos surface at startup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingKwargs {
    pub batch_size: Option<usize>,
    pub normalize: Option<bool>,
    pub device: Option<String>,
    pub dimensions: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub base_url: Option<String>,
    pub task_type: Option<String>,
}

impl EmbeddingKwargs {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let kwargs: Self =
            serde_json::from_str(raw).map_err(|error| ConfigError::InvalidKwargs(error.to_string()))?;

        if kwargs.batch_size == Some(0) {
            return Err(ConfigError::InvalidKwargs("batch_size must be at least 1".to_string()));
        }
        if kwargs.max_concurrency == Some(0) {
            return Err(ConfigError::InvalidKwargs(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if kwargs.dimensions == Some(0) {
            return Err(ConfigError::InvalidKwargs("dimensions must be at least 1".to_string()));
        }
        if let Some(base_url) = &kwargs.base_url {
            url::Url::parse(base_url).map_err(|source| ConfigError::InvalidUrl {
                setting: "EMBEDDING_KWARGS.base_url",
                source,
            })?;
        }
        Ok(kwargs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub model_name: String,
    pub kwargs: EmbeddingKwargs,
}

impl EmbeddingConfig {
    pub fn new(provider: ProviderKind, model_name: Option<&str>, kwargs: EmbeddingKwargs) -> Self {
        let model_name = model_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| provider.default_model())
            .to_string();
        Self {
            provider,
            model_name,
            kwargs,
        }
    }

    /// Parses the raw `EMBEDDING_PROVIDER` / `EMBEDDING_MODEL` / `EMBEDDING_KWARGS` values.
    pub fn parse(
        provider: &str,
        model_name: Option<&str>,
        kwargs_json: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let provider = provider.parse::<ProviderKind>()?;
        let kwargs = kwargs_json.map(EmbeddingKwargs::from_json).transpose()?.unwrap_or_default();
        let config = Self::new(provider, model_name, kwargs);
        config.check_model()?;
        Ok(config)
    }

    /// The in-process provider ships a single model.
    fn check_model(&self) -> Result<(), ConfigError> {
        if self.provider == ProviderKind::Local && self.model_name != LOCAL_MODEL_NAME {
            return Err(ConfigError::UnknownModel {
                provider: self.provider.as_str(),
                model: self.model_name.clone(),
                available: LOCAL_MODEL_NAME,
            });
        }
        Ok(())
    }

    pub fn declared_dimensions(&self) -> Result<usize, ConfigError> {
        self.check_model()?;
        self.kwargs
            .dimensions
            .or_else(|| self.provider.known_dimensions(&self.model_name))
            .ok_or_else(|| ConfigError::UnknownDimensions {
                provider: self.provider.as_str(),
                model: self.model_name.clone(),
            })
    }

    pub fn identity(&self) -> Result<ProviderIdentity, ConfigError> {
        Ok(ProviderIdentity {
            provider: self.provider.as_str().to_string(),
            model: self.model_name.clone(),
            dimensions: self.declared_dimensions()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub hf_token: Option<String>,
}

impl Credentials {
    pub fn for_provider(&self, provider: ProviderKind) -> Option<&str> {
        let value = match provider {
            ProviderKind::Google => self.google_api_key.as_deref(),
            ProviderKind::OpenAi => self.openai_api_key.as_deref(),
            ProviderKind::HuggingFace => self.hf_token.as_deref(),
            ProviderKind::Local => None,
        };
        value.map(str::trim).filter(|key| !key.is_empty())
    }
}

/// What a text is embedded for. Backends that distinguish stored passages
/// from search queries use it to pick their task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    Document,
    Query,
}

#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    Google(GoogleEmbedder),
    OpenAi(OpenAiEmbedder),
    Local(CharacterNgramEmbedder),
    HuggingFace(HuggingFaceEmbedder),
}

/// The active embedding provider: one backend plus the batching, concurrency
/// and retry settings that wrap it.
#[derive(Debug, Clone)]
pub struct EmbeddingProvider {
    backend: EmbeddingBackend,
    identity: ProviderIdentity,
    batch_size: usize,
    max_concurrency: usize,
    retry: RetryPolicy,
}

impl EmbeddingProvider {
    /// Builds the configured backend. Missing credentials, unknown model
    /// dimensionality and unsupported devices are reported here, before any
    /// ingestion or query work starts.
    pub fn from_config(config: &EmbeddingConfig, credentials: &Credentials) -> Result<Self, ConfigError> {
        let identity = config.identity()?;
        let kwargs = &config.kwargs;
        let timeout = Duration::from_secs(kwargs.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let api_key = |provider: ProviderKind| -> Result<String, ConfigError> {
            match (credentials.for_provider(provider), provider.required_credential()) {
                (Some(key), _) => Ok(key.to_string()),
                (None, Some(var)) => Err(ConfigError::MissingCredential {
                    provider: provider.as_str(),
                    var,
                }),
                (None, None) => Ok(String::new()),
            }
        };

        let backend = match config.provider {
            ProviderKind::Google => EmbeddingBackend::Google(GoogleEmbedder::new(
                api_key(ProviderKind::Google)?,
                &config.model_name,
                kwargs.base_url.clone(),
                kwargs.task_type.clone(),
                kwargs.dimensions,
                timeout,
            )),
            ProviderKind::OpenAi => EmbeddingBackend::OpenAi(OpenAiEmbedder::new(
                api_key(ProviderKind::OpenAi)?,
                config.model_name.clone(),
                kwargs.base_url.clone(),
                kwargs.dimensions,
                timeout,
            )),
            ProviderKind::HuggingFace => EmbeddingBackend::HuggingFace(HuggingFaceEmbedder::new(
                credentials.for_provider(ProviderKind::HuggingFace).map(str::to_string),
                config.model_name.clone(),
                kwargs.base_url.clone(),
                kwargs.normalize.unwrap_or(false),
                timeout,
            )),
            ProviderKind::Local => {
                if let Some(device) = &kwargs.device {
                    if !device.eq_ignore_ascii_case("cpu") {
                        return Err(ConfigError::UnsupportedDevice(device.clone()));
                    }
                }
                EmbeddingBackend::Local(CharacterNgramEmbedder {
                    dimensions: identity.dimensions,
                    ngram: DEFAULT_NGRAM,
                    normalize: kwargs.normalize.unwrap_or(true),
                })
            }
        };

        info!(
            provider = %identity.provider,
            model = %identity.model,
            dimensions = identity.dimensions,
            "embedding provider ready"
        );

        Ok(Self {
            backend,
            identity,
            batch_size: kwargs.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            max_concurrency: kwargs.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    pub fn dimensions(&self) -> usize {
        self.identity.dimensions
    }

    pub fn backend(&self) -> &EmbeddingBackend {
        &self.backend
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_one(text, EmbedTask::Document).await
    }

    /// Embeds a search question.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_one(text, EmbedTask::Query).await
    }

    async fn embed_one(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_texts(&[text], task)
            .await?
            .pop()
            .ok_or(EmbeddingError::CountMismatch {
                provider: self.provider_name(),
                expected: 1,
                got: 0,
            })
    }

    /// Embeds one request-sized batch. Remote calls are retried on transient
    /// failures; the result is checked for count and dimensionality.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_texts(texts, EmbedTask::Document).await
    }

    async fn embed_texts(&self, texts: &[&str], task: EmbedTask) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = match &self.backend {
            EmbeddingBackend::Local(embedder) => texts.iter().map(|text| embedder.embed(text)).collect(),
            EmbeddingBackend::Google(embedder) => {
                with_backoff(&self.retry, "google.embed", || embedder.embed_batch(texts, task)).await?
            }
            EmbeddingBackend::OpenAi(embedder) => {
                with_backoff(&self.retry, "openai.embed", || embedder.embed_batch(texts)).await?
            }
            EmbeddingBackend::HuggingFace(embedder) => {
                with_backoff(&self.retry, "huggingface.embed", || embedder.embed_batch(texts)).await?
            }
        };

        self.check(texts.len(), vectors)
    }

    /// Embeds any number of texts in `batch_size` requests with at most
    /// `max_concurrency` in flight. Output order matches input order; the first
    /// failure aborts the whole call.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let batches: Vec<Vec<&str>> = texts
            .chunks(self.batch_size.max(1))
            .map(|batch| batch.iter().map(String::as_str).collect())
            .collect();

        debug!(
            provider = self.provider_name(),
            texts = texts.len(),
            batches = batches.len(),
            concurrency = self.max_concurrency,
            "embedding texts"
        );

        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches.iter())
            .map(|batch| self.embed_batch(batch))
            .buffered(self.max_concurrency.max(1))
            .try_collect()
            .await?;

        Ok(embedded.into_iter().flatten().collect())
    }

    fn provider_name(&self) -> &'static str {
        match self.backend {
            EmbeddingBackend::Google(_) => ProviderKind::Google.as_str(),
            EmbeddingBackend::OpenAi(_) => ProviderKind::OpenAi.as_str(),
            EmbeddingBackend::Local(_) => ProviderKind::Local.as_str(),
            EmbeddingBackend::HuggingFace(_) => ProviderKind::HuggingFace.as_str(),
        }
    }

    fn check(&self, expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let provider = self.provider_name();
        if vectors.len() != expected {
            return Err(EmbeddingError::CountMismatch {
                provider,
                expected,
                got: vectors.len(),
            });
        }
        if let Some(wrong) = vectors.iter().find(|vector| vector.len() != self.dimensions()) {
            return Err(EmbeddingError::DimensionMismatch {
                provider,
                expected: self.dimensions(),
                got: wrong.len(),
            });
        }
        Ok(vectors)
    }
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vector.iter_mut().for_each(|value| *value /= magnitude);
    }
}

#[cfg(test)]
mod tests {
    use super::http::test_server;
    use super::*;

    fn local(dimensions: usize) -> EmbeddingProvider {
        let config = EmbeddingConfig::parse(
            "local",
            None,
            Some(&format!(r#"{{"dimensions": {dimensions}, "batch_size": 2}}"#)),
        )
        .expect("valid config");
        EmbeddingProvider::from_config(&config, &Credentials::default()).expect("local needs no key")
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn provider_names_are_a_closed_set() {
        assert_eq!("OpenAI".parse::<ProviderKind>().ok(), Some(ProviderKind::OpenAi));
        assert_eq!("huggingface".parse::<ProviderKind>().ok(), Some(ProviderKind::HuggingFace));
        assert!(matches!(
            "cohere".parse::<ProviderKind>(),
            Err(ConfigError::UnknownProvider(name)) if name == "cohere"
        ));
    }

    #[test]
    fn default_models_follow_the_provider() {
        let config = EmbeddingConfig::parse("google", None, None).expect("valid");
        assert_eq!(config.model_name, "models/embedding-001");
        assert_eq!(config.declared_dimensions().ok(), Some(768));

        let config = EmbeddingConfig::parse("openai", Some("  "), None).expect("valid");
        assert_eq!(config.model_name, "text-embedding-3-small");
    }

    #[test]
    fn kwargs_are_validated() {
        assert!(EmbeddingKwargs::from_json("").expect("empty is fine") == EmbeddingKwargs::default());
        assert!(matches!(
            EmbeddingKwargs::from_json(r#"{"batch_size": 0}"#),
            Err(ConfigError::InvalidKwargs(_))
        ));
        assert!(matches!(
            EmbeddingKwargs::from_json(r#"{"show_progress": true}"#),
            Err(ConfigError::InvalidKwargs(_))
        ));
        assert!(matches!(
            EmbeddingKwargs::from_json("not json"),
            Err(ConfigError::InvalidKwargs(_))
        ));
        let kwargs = EmbeddingKwargs::from_json(r#"{"normalize": false, "device": "cpu"}"#)
            .expect("valid kwargs");
        assert_eq!(kwargs.normalize, Some(false));
    }

    #[test]
    fn remote_providers_require_a_credential() {
        let config = EmbeddingConfig::parse("openai", None, None).expect("valid");
        let error = EmbeddingProvider::from_config(&config, &Credentials::default())
            .expect_err("missing key must fail");
        assert!(matches!(
            error,
            ConfigError::MissingCredential {
                var: "OPENAI_API_KEY",
                ..
            }
        ));

        let config = EmbeddingConfig::parse("google", None, None).expect("valid");
        let credentials = Credentials {
            google_api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(EmbeddingProvider::from_config(&config, &credentials).is_err());
    }

    #[test]
    fn unknown_remote_models_need_declared_dimensions() {
        let config = EmbeddingConfig::parse("huggingface", Some("acme/custom-embedder"), None).expect("valid");
        assert!(matches!(
            EmbeddingProvider::from_config(&config, &Credentials::default()),
            Err(ConfigError::UnknownDimensions { .. })
        ));

        let config = EmbeddingConfig::parse(
            "huggingface",
            Some("acme/custom-embedder"),
            Some(r#"{"dimensions": 256}"#),
        )
        .expect("valid");
        let provider =
            EmbeddingProvider::from_config(&config, &Credentials::default()).expect("declared dimensions");
        assert_eq!(provider.dimensions(), 256);
    }

    #[test]
    fn local_provider_rejects_models_it_does_not_ship() {
        let error = EmbeddingConfig::parse("local", Some("paraphrase-multilingual-MiniLM-L12-v2"), None)
            .expect_err("only the trigram model runs in process");
        assert!(matches!(
            error,
            ConfigError::UnknownModel { provider: "local", ref model, .. }
                if model == "paraphrase-multilingual-MiniLM-L12-v2"
        ));

        let built = EmbeddingConfig::new(ProviderKind::Local, Some("all-MiniLM-L6-v2"), EmbeddingKwargs::default());
        assert!(matches!(
            EmbeddingProvider::from_config(&built, &Credentials::default()),
            Err(ConfigError::UnknownModel { .. })
        ));

        let config = EmbeddingConfig::parse("local", Some(" char-trigram "), None).expect("shipped model");
        assert_eq!(config.identity().expect("known").model, "char-trigram");
    }

    #[test]
    fn local_provider_only_runs_on_cpu() {
        let config = EmbeddingConfig::parse("local", None, Some(r#"{"device": "cuda"}"#)).expect("valid");
        assert!(matches!(
            EmbeddingProvider::from_config(&config, &Credentials::default()),
            Err(ConfigError::UnsupportedDevice(device)) if device == "cuda"
        ));
    }

    #[tokio::test]
    async fn all_vectors_share_the_declared_dimensionality() {
        let provider = local(64);
        let texts: Vec<String> = ["edital", "bolsa de estudos", "calendário acadêmico", "matrícula", "x"]
            .iter()
            .map(|text| text.to_string())
            .collect();

        let vectors = provider.embed_all(&texts).await.expect("local embedding");
        assert_eq!(vectors.len(), texts.len());
        assert!(vectors.iter().all(|vector| vector.len() == 64));

        let single = provider.embed("bolsa de estudos").await.expect("local embedding");
        assert_eq!(single, vectors[1]);
    }

    #[tokio::test]
    async fn transient_remote_failures_are_retried() {
        let ok = r#"{"data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]}"#;
        let (base_url, seen) = test_server::serve(vec![
            (503, r#"{"error": {"message": "overloaded"}}"#.to_string()),
            (200, ok.to_string()),
        ])
        .await;
        let config = EmbeddingConfig::parse(
            "openai",
            Some("text-embedding-3-small"),
            Some(&format!(r#"{{"dimensions": 3, "base_url": "{base_url}"}}"#)),
        )
        .expect("valid");
        let credentials = Credentials {
            openai_api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let provider = EmbeddingProvider::from_config(&config, &credentials)
            .expect("configured")
            .with_retry_policy(fast_retry());

        let vector = provider.embed("regimento").await.expect("second attempt succeeds");
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn embed_all_keeps_at_most_max_concurrency_batches_in_flight() {
        let (base_url, peak) = test_server::serve_slowly(
            r#"{"data": [{"index": 0, "embedding": [0.6, 0.8]}]}"#.to_string(),
            Duration::from_millis(50),
        )
        .await;
        let config = EmbeddingConfig::parse(
            "openai",
            None,
            Some(&format!(
                r#"{{"base_url": "{base_url}", "dimensions": 2, "batch_size": 1, "max_concurrency": 2}}"#
            )),
        )
        .expect("valid");
        let credentials = Credentials {
            openai_api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let provider = EmbeddingProvider::from_config(&config, &credentials).expect("configured");

        let texts = (1..=6).map(|n| format!("artigo {n}")).collect::<Vec<_>>();
        let vectors = provider.embed_all(&texts).await.expect("all batches succeed");

        assert_eq!(vectors.len(), 6);
        let peak = peak.load(std::sync::atomic::Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak in-flight batches: {peak}");
    }

    #[tokio::test]
    async fn permanent_remote_failures_abort_the_batch() {
        let (base_url, seen) = test_server::serve(vec![(
            401,
            r#"{"error": {"message": "invalid key"}}"#.to_string(),
        )])
        .await;
        let config = EmbeddingConfig::parse(
            "openai",
            None,
            Some(&format!(r#"{{"base_url": "{base_url}", "batch_size": 1}}"#)),
        )
        .expect("valid");
        let credentials = Credentials {
            openai_api_key: Some("sk-bad".to_string()),
            ..Default::default()
        };
        let provider = EmbeddingProvider::from_config(&config, &credentials)
            .expect("configured")
            .with_retry_policy(fast_retry());

        let error = provider
            .embed_all(&["a".to_string()])
            .await
            .expect_err("401 must abort");
        assert!(matches!(error, EmbeddingError::Rejected { status: 401, .. }));
        assert_eq!(seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn wrong_dimensionality_from_a_backend_is_rejected() {
        let (base_url, _) = test_server::serve(vec![(
            200,
            r#"{"data": [{"index": 0, "embedding": [0.1, 0.2]}]}"#.to_string(),
        )])
        .await;
        let config = EmbeddingConfig::parse(
            "openai",
            None,
            Some(&format!(r#"{{"base_url": "{base_url}"}}"#)),
        )
        .expect("valid");
        let credentials = Credentials {
            openai_api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let provider = EmbeddingProvider::from_config(&config, &credentials).expect("configured");

        let error = provider.embed("texto").await.expect_err("2 != 1536");
        assert!(matches!(
            error,
            EmbeddingError::DimensionMismatch {
                expected: 1536,
                got: 2,
                ..
            }
        ));
    }
}
