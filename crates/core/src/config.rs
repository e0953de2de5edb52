use crate::answer::{GeminiAnswerer, DEFAULT_LLM_MODEL, DEFAULT_TEMPERATURE};
use crate::chunking::ChunkingConfig;
use crate::embeddings::{Credentials, EmbeddingConfig, EmbeddingProvider};
use crate::error::{ConfigError, IngestError};
use crate::index::RetrieverConfig;
use crate::loader::DocumentLoader;
use crate::models::IngestionOptions;
use crate::ocr::{OcrBackend, OcrConfig, DEFAULT_OCR_LANGUAGE, DEFAULT_RASTER_DPI};
use crate::pipeline::IngestionPipeline;
use std::path::PathBuf;

pub const DEFAULT_CORPUS_DIR: &str = "dados/";
pub const DEFAULT_INDEX_PATH: &str = "dados/.index/index.json";

#[derive(Debug, Clone)]
pub struct RagSettings {
    pub embedding_provider: String,
    pub embedding_model: Option<String>,
    pub embedding_kwargs: Option<String>,
    pub retriever_config: Option<String>,
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub hf_token: Option<String>,
    pub ocr_backend: String,
    pub ocr_language: String,
    pub ocr_endpoint: Option<String>,
    pub ocr_api_key: Option<String>,
    pub ocr_min_chars: usize,
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub min_chunk_chars: usize,
    pub workers: usize,
    pub corpus_dir: PathBuf,
    pub index_path: PathBuf,
    pub llm_model: String,
}

impl Default for RagSettings {
    fn default() -> Self {
        let ingestion = IngestionOptions::default();
        Self {
            embedding_provider: "local".to_string(),
            embedding_model: None,
            embedding_kwargs: None,
            retriever_config: None,
            google_api_key: None,
            openai_api_key: None,
            hf_token: None,
            ocr_backend: "tesseract".to_string(),
            ocr_language: DEFAULT_OCR_LANGUAGE.to_string(),
            ocr_endpoint: None,
            ocr_api_key: None,
            ocr_min_chars: ingestion.ocr_min_chars,
            chunk_max_chars: ingestion.chunk_max_chars,
            chunk_overlap_chars: ingestion.chunk_overlap_chars,
            min_chunk_chars: ingestion.min_chunk_chars,
            workers: ingestion.workers,
            corpus_dir: PathBuf::from(DEFAULT_CORPUS_DIR),
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl LlmConfig {
    pub fn build_answerer(&self) -> Result<GeminiAnswerer, ConfigError> {
        let api_key = self.api_key.clone().ok_or(ConfigError::MissingCredential {
            provider: "gemini",
            var: "GOOGLE_API_KEY",
        })?;
        Ok(GeminiAnswerer::new(api_key, self.model.clone()).with_temperature(self.temperature))
    }
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub corpus_dir: PathBuf,
    pub index_path: PathBuf,
    pub embedding: EmbeddingConfig,
    pub credentials: Credentials,
    pub retriever: RetrieverConfig,
    pub ocr: OcrConfig,
    pub ingestion: IngestionOptions,
    pub llm: LlmConfig,
}

impl RagConfig {
    pub fn from_settings(settings: RagSettings) -> Result<Self, ConfigError> {
        let embedding = EmbeddingConfig::parse(
            &settings.embedding_provider,
            settings.embedding_model.as_deref(),
            settings.embedding_kwargs.as_deref(),
        )?;
        let retriever = settings
            .retriever_config
            .as_deref()
            .map(RetrieverConfig::from_json)
            .transpose()?
            .unwrap_or_default();

        let ocr = OcrConfig {
            backend: OcrBackend::parse(
                &settings.ocr_backend,
                settings.ocr_endpoint.as_deref(),
                non_blank(settings.ocr_api_key),
            )?,
            language: settings.ocr_language,
            dpi: DEFAULT_RASTER_DPI,
        };

        let ingestion = IngestionOptions {
            chunk_max_chars: settings.chunk_max_chars,
            chunk_overlap_chars: settings.chunk_overlap_chars,
            min_chunk_chars: settings.min_chunk_chars,
            ocr_min_chars: settings.ocr_min_chars,
            workers: settings.workers.max(1),
        };
        ChunkingConfig::from(&ingestion).validate()?;

        let credentials = Credentials {
            google_api_key: non_blank(settings.google_api_key),
            openai_api_key: non_blank(settings.openai_api_key),
            hf_token: non_blank(settings.hf_token),
        };
        let llm = LlmConfig {
            model: settings.llm_model,
            api_key: credentials.google_api_key.clone(),
            temperature: DEFAULT_TEMPERATURE,
        };

        Ok(Self {
            corpus_dir: settings.corpus_dir,
            index_path: settings.index_path,
            embedding,
            credentials,
            retriever,
            ocr,
            ingestion,
            llm,
        })
    }

    pub fn embedding_provider(&self) -> Result<EmbeddingProvider, ConfigError> {
        EmbeddingProvider::from_config(&self.embedding, &self.credentials)
    }

    pub fn ingestion_pipeline(&self) -> Result<IngestionPipeline, IngestError> {
        let loader = DocumentLoader::new(&self.ocr, self.ingestion.clone())?;
        IngestionPipeline::new(loader, self.embedding_provider()?, self.index_path.clone())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::ProviderKind;
    use crate::index::SearchType;

    #[test]
    fn defaults_follow_the_documented_values() {
        let config = RagConfig::from_settings(RagSettings::default()).expect("defaults are valid");

        assert_eq!(config.embedding.provider, ProviderKind::Local);
        assert_eq!(config.embedding.model_name, "char-trigram");
        assert_eq!(config.retriever.k, 5);
        assert_eq!(config.ocr.language, "por");
        assert_eq!(config.ingestion.chunk_max_chars, 4_000);
        assert_eq!(config.ingestion.chunk_overlap_chars, 200);
        assert_eq!(config.ingestion.min_chunk_chars, 200);
        assert_eq!(config.corpus_dir, PathBuf::from("dados/"));
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert!(config.embedding_provider().is_ok());
    }

    #[test]
    fn missing_google_key_is_reported_before_any_work() {
        let settings = RagSettings {
            embedding_provider: "google".to_string(),
            ..RagSettings::default()
        };
        let config = RagConfig::from_settings(settings).expect("valid settings");
        assert!(matches!(
            config.embedding_provider(),
            Err(ConfigError::MissingCredential {
                var: "GOOGLE_API_KEY",
                ..
            })
        ));
        assert!(config.llm.build_answerer().is_err());
        assert!(matches!(
            config.ingestion_pipeline().map(|_| ()),
            Err(IngestError::Config(ConfigError::MissingCredential { .. }))
        ));
    }

    #[test]
    fn json_settings_are_parsed() {
        let settings = RagSettings {
            embedding_provider: "local".to_string(),
            embedding_kwargs: Some(r#"{"dimensions": 128}"#.to_string()),
            retriever_config: Some(r#"{"search_type": "mmr", "k": 3, "fetch_k": 10}"#.to_string()),
            google_api_key: Some("  ".to_string()),
            ..RagSettings::default()
        };
        let config = RagConfig::from_settings(settings).expect("valid settings");

        assert_eq!(config.retriever.search_type, SearchType::Mmr);
        assert_eq!(config.retriever.fetch_k, 10);
        assert_eq!(config.credentials.google_api_key, None);
        assert_eq!(config.embedding_provider().expect("local").dimensions(), 128);
    }

    #[test]
    fn chunk_window_is_configurable() {
        let settings = RagSettings {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 100,
            min_chunk_chars: 50,
            ..RagSettings::default()
        };
        let config = RagConfig::from_settings(settings).expect("valid window");
        let chunking = ChunkingConfig::from(&config.ingestion);
        assert_eq!(
            (chunking.max_chars, chunking.overlap_chars, chunking.min_chars),
            (1_000, 100, 50)
        );

        let overlapping = RagSettings {
            chunk_max_chars: 100,
            chunk_overlap_chars: 100,
            ..RagSettings::default()
        };
        assert!(matches!(
            RagConfig::from_settings(overlapping),
            Err(ConfigError::InvalidChunking(_))
        ));
    }

    #[test]
    fn bad_settings_fail_fast() {
        let unknown = RagSettings {
            embedding_provider: "cohere".to_string(),
            ..RagSettings::default()
        };
        assert!(matches!(
            RagConfig::from_settings(unknown),
            Err(ConfigError::UnknownProvider(_))
        ));

        let http_without_endpoint = RagSettings {
            ocr_backend: "http".to_string(),
            ..RagSettings::default()
        };
        assert!(matches!(
            RagConfig::from_settings(http_without_endpoint),
            Err(ConfigError::MissingSetting("OCR_ENDPOINT"))
        ));

        let bad_retriever = RagSettings {
            retriever_config: Some("{not json".to_string()),
            ..RagSettings::default()
        };
        assert!(matches!(
            RagConfig::from_settings(bad_retriever),
            Err(ConfigError::InvalidRetrieverConfig(_))
        ));
    }
}
