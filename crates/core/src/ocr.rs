use crate::error::{ConfigError, OcrError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use url::Url;

pub const DEFAULT_OCR_LANGUAGE: &str = "por";
pub const DEFAULT_RASTER_DPI: u32 = 300;

#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recognize(&self, image: &[u8], language: &str) -> Result<String, OcrError>;
}

#[async_trait]
pub trait PdfRasterizer: Send + Sync {
    async fn page_count(&self, pdf: &Path) -> Result<u32, OcrError>;

    /// Renders one 1-based page to PNG bytes.
    async fn render_page(&self, pdf: &Path, page: u32) -> Result<Vec<u8>, OcrError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrBackend {
    Tesseract { binary: String },
    Http { endpoint: Url, api_key: Option<String> },
}

impl OcrBackend {
    pub fn parse(
        name: &str,
        endpoint: Option<&str>,
        api_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(Self::Tesseract {
                binary: "tesseract".to_string(),
            }),
            "http" => {
                let endpoint = endpoint
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .ok_or(ConfigError::MissingSetting("OCR_ENDPOINT"))?;
                let endpoint = Url::parse(endpoint).map_err(|source| ConfigError::InvalidUrl {
                    setting: "OCR_ENDPOINT",
                    source,
                })?;
                let api_key = api_key.filter(|key| !key.trim().is_empty());
                Ok(Self::Http { endpoint, api_key })
            }
            other => Err(ConfigError::UnknownOcrBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub backend: OcrBackend,
    pub language: String,
    pub dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackend::Tesseract {
                binary: "tesseract".to_string(),
            },
            language: DEFAULT_OCR_LANGUAGE.to_string(),
            dpi: DEFAULT_RASTER_DPI,
        }
    }
}

impl OcrConfig {
    pub fn build_engine(&self) -> Arc<dyn OcrEngine> {
        match &self.backend {
            OcrBackend::Tesseract { binary } => Arc::new(TesseractOcr::new(binary.clone())),
            OcrBackend::Http { endpoint, api_key } => {
                Arc::new(HttpOcr::new(endpoint.clone(), api_key.clone()))
            }
        }
    }

    pub fn build_rasterizer(&self) -> Arc<dyn PdfRasterizer> {
        Arc::new(PopplerRasterizer::new(self.dpi))
    }
}

pub struct TesseractOcr {
    binary: String,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn recognize(&self, image: &[u8], language: &str) -> Result<String, OcrError> {
        if image.is_empty() {
            return Err(OcrError::EmptyImage);
        }

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| spawn_error(&self.binary, error))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(OcrError::EngineFailed {
                engine: self.binary.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        debug!(engine = "tesseract", language, chars = text.len(), "page recognized");
        Ok(text)
    }
}

#[derive(Debug, Clone, Serialize)]
struct HttpOcrRequest<'a> {
    image_base64: String,
    language: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpOcrResponse {
    #[serde(default)]
    pages: Option<Vec<HttpOcrPage>>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpOcrPage {
    #[serde(default)]
    text: Option<String>,
}

pub struct HttpOcr {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpOcr {
    pub fn new(endpoint: Url, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl OcrEngine for HttpOcr {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn recognize(&self, image: &[u8], language: &str) -> Result<String, OcrError> {
        if image.is_empty() {
            return Err(OcrError::EmptyImage);
        }

        let payload = HttpOcrRequest {
            image_base64: STANDARD.encode(image),
            language,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(OcrError::Endpoint(format!(
                "OCR request to {} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let payload: HttpOcrResponse = response.json().await?;
        payload_to_text(&payload)
    }
}

fn payload_to_text(payload: &HttpOcrResponse) -> Result<String, OcrError> {
    if let Some(pages) = &payload.pages {
        let joined = pages
            .iter()
            .filter_map(|page| page.text.as_deref().map(str::trim))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !joined.is_empty() {
            return Ok(joined);
        }
    }

    match payload.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(OcrError::Endpoint(
            "OCR response contained no text".to_string(),
        )),
    }
}

/// Renders PDF pages with poppler's `pdftoppm` and counts them with `pdfinfo`.
pub struct PopplerRasterizer {
    dpi: u32,
    pdftoppm: String,
    pdfinfo: String,
}

impl PopplerRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self {
            dpi,
            pdftoppm: "pdftoppm".to_string(),
            pdfinfo: "pdfinfo".to_string(),
        }
    }

    fn scratch_prefix() -> PathBuf {
        std::env::temp_dir().join(format!("campus-rag-page-{}", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl PdfRasterizer for PopplerRasterizer {
    async fn page_count(&self, pdf: &Path) -> Result<u32, OcrError> {
        let output = Command::new(&self.pdfinfo)
            .arg(pdf)
            .output()
            .await
            .map_err(|error| spawn_error(&self.pdfinfo, error))?;

        if !output.status.success() {
            return Err(OcrError::EngineFailed {
                engine: self.pdfinfo.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_page_count(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            OcrError::EngineFailed {
                engine: self.pdfinfo.clone(),
                status: output.status.to_string(),
                stderr: "no `Pages:` line in output".to_string(),
            }
        })
    }

    async fn render_page(&self, pdf: &Path, page: u32) -> Result<Vec<u8>, OcrError> {
        let prefix = Self::scratch_prefix();
        let page_arg = page.to_string();
        let dpi_arg = self.dpi.to_string();
        let output = Command::new(&self.pdftoppm)
            .args(["-f", page_arg.as_str(), "-l", page_arg.as_str(), "-r", dpi_arg.as_str()])
            .args(["-png", "-singlefile"])
            .arg(pdf)
            .arg(&prefix)
            .output()
            .await
            .map_err(|error| spawn_error(&self.pdftoppm, error))?;

        if !output.status.success() {
            return Err(OcrError::EngineFailed {
                engine: self.pdftoppm.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let image_path = prefix.with_extension("png");
        let image = tokio::fs::read(&image_path).await;
        let _ = tokio::fs::remove_file(&image_path).await;
        let image = image?;
        if image.is_empty() {
            return Err(OcrError::EmptyImage);
        }
        Ok(image)
    }
}

fn parse_page_count(pdfinfo_output: &str) -> Option<u32> {
    pdfinfo_output
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|value| value.trim().parse().ok())
}

fn spawn_error(binary: &str, error: std::io::Error) -> OcrError {
    if error.kind() == ErrorKind::NotFound {
        OcrError::EngineNotFound(binary.to_string())
    } else {
        OcrError::Io(error)
    }
}
