use crate::chunking::TextNormalizer;
use crate::error::IngestError;
use crate::models::{
    DocumentKind, IngestionOptions, Page, PageFailure, PageOrigin, SkippedDocument, SourceDocument,
};
use crate::ocr::{OcrConfig, OcrEngine, PdfRasterizer};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use lopdf::Document;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Text layer access for PDFs. Returns one entry per page in page order;
/// pages without a text layer come back as empty strings.
pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, pdf: &[u8]) -> Result<Vec<String>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, pdf: &[u8]) -> Result<Vec<String>, IngestError> {
        let document = Document::load_mem(pdf).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let pages = document
            .get_pages()
            .into_keys()
            .map(|page_no| document.extract_text(&[page_no]).unwrap_or_default())
            .collect::<Vec<_>>();

        if pages.is_empty() {
            return Err(IngestError::PdfParse("pdf has no pages".to_string()));
        }
        Ok(pages)
    }
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: SourceDocument,
    pub pages: Vec<Page>,
    pub failures: Vec<PageFailure>,
}

pub fn discover_documents(root: &Path) -> Vec<PathBuf> {
    let mut files = WalkDir::new(root)
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| DocumentKind::from_path(entry.path()).is_some())
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();

    files.sort_unstable();
    files
}

pub async fn read_source_document(root: &Path, path: &Path) -> Result<SourceDocument, IngestError> {
    let kind = DocumentKind::from_path(path).ok_or_else(|| {
        IngestError::InvalidArgument(format!("unsupported document type: {}", path.display()))
    })?;
    let title = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();

    let relative = path.strip_prefix(root).unwrap_or(path);
    let source_path = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let bytes = tokio::fs::read(path).await?;

    Ok(SourceDocument {
        document_id: sha256_hex(source_path.as_bytes()),
        checksum: sha256_hex(&bytes),
        source_path,
        title,
        kind,
        bytes,
        discovered_at: Utc::now(),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub struct DocumentLoader {
    extractor: Arc<dyn PdfExtractor>,
    ocr: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PdfRasterizer>,
    normalizer: TextNormalizer,
    language: String,
    options: IngestionOptions,
    ocr_slots: Semaphore,
}

impl DocumentLoader {
    pub fn new(ocr: &OcrConfig, options: IngestionOptions) -> Result<Self, IngestError> {
        Self::with_components(
            Arc::new(LopdfExtractor),
            ocr.build_engine(),
            ocr.build_rasterizer(),
            ocr.language.clone(),
            options,
        )
    }

    pub fn with_components(
        extractor: Arc<dyn PdfExtractor>,
        ocr: Arc<dyn OcrEngine>,
        rasterizer: Arc<dyn PdfRasterizer>,
        language: impl Into<String>,
        options: IngestionOptions,
    ) -> Result<Self, IngestError> {
        if options.workers == 0 {
            return Err(IngestError::InvalidArgument(
                "workers must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            extractor,
            ocr,
            rasterizer,
            normalizer: TextNormalizer::new()?,
            language: language.into(),
            ocr_slots: Semaphore::new(options.workers),
            options,
        })
    }

    pub fn options(&self) -> &IngestionOptions {
        &self.options
    }

    /// Streams the corpus under `root` in path order, loading up to
    /// `workers` documents at a time. Rasterization and OCR share one pool of
    /// `workers` slots across all documents. Documents that cannot be read at
    /// all are yielded as `Err(SkippedDocument)`.
    pub fn load_corpus<'a>(
        &'a self,
        root: &'a Path,
    ) -> Result<impl Stream<Item = Result<LoadedDocument, SkippedDocument>> + 'a, IngestError> {
        if !root.is_dir() {
            return Err(IngestError::InvalidArgument(format!(
                "corpus directory does not exist: {}",
                root.display()
            )));
        }

        let files = discover_documents(root);
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no supported documents found in {}",
                root.display()
            )));
        }

        info!(root = %root.display(), documents = files.len(), "loading corpus");
        Ok(stream::iter(files)
            .map(move |path| self.load_document(root, path))
            .buffered(self.options.workers))
    }

    pub async fn load_document(
        &self,
        root: &Path,
        path: PathBuf,
    ) -> Result<LoadedDocument, SkippedDocument> {
        let skipped = |reason: String| {
            warn!(path = %path.display(), %reason, "document skipped");
            SkippedDocument {
                source_path: path.display().to_string(),
                reason,
            }
        };

        let document = read_source_document(root, &path)
            .await
            .map_err(|error| skipped(error.to_string()))?;

        let outcomes = match document.kind {
            DocumentKind::Text => {
                let text = self
                    .normalizer
                    .normalize(&String::from_utf8_lossy(&document.bytes));
                vec![(direct_page(&document, 1, text), None)]
            }
            DocumentKind::Image => vec![self.recognize_image(&document, 1).await],
            DocumentKind::Pdf => self.pdf_pages(&document, &path).await.map_err(skipped)?,
        };

        let mut pages = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (page, failure) in outcomes {
            pages.push(page);
            failures.extend(failure);
        }

        debug!(
            source = %document.source_path,
            pages = pages.len(),
            failed = failures.len(),
            "document loaded"
        );
        Ok(LoadedDocument {
            document,
            pages,
            failures,
        })
    }

    async fn pdf_pages(
        &self,
        document: &SourceDocument,
        path: &Path,
    ) -> Result<Vec<(Page, Option<PageFailure>)>, String> {
        let extractor = Arc::clone(&self.extractor);
        let bytes = document.bytes.clone();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract_pages(&bytes))
            .await
            .map_err(IngestError::from)
            .and_then(|pages| pages);

        let texts = match extracted {
            Ok(texts) => texts.into_iter().map(Some).collect::<Vec<_>>(),
            Err(parse_error) => {
                warn!(
                    source = %document.source_path,
                    error = %parse_error,
                    "pdf text layer unreadable, recognizing every page"
                );
                let count = self
                    .rasterizer
                    .page_count(path)
                    .await
                    .map_err(|ocr_error| format!("{parse_error}; page count failed: {ocr_error}"))?;
                vec![None; count as usize]
            }
        };

        if texts.is_empty() {
            return Err("pdf has no pages".to_string());
        }

        Ok(stream::iter(texts.into_iter().enumerate())
            .map(|(index, text)| self.pdf_page(document, path, index as u32 + 1, text))
            .buffered(self.options.workers)
            .collect::<Vec<_>>()
            .await)
    }

    async fn pdf_page(
        &self,
        document: &SourceDocument,
        path: &Path,
        number: u32,
        text: Option<String>,
    ) -> (Page, Option<PageFailure>) {
        let direct = text
            .map(|text| self.normalizer.normalize(&text))
            .unwrap_or_default();
        if direct.chars().count() >= self.options.ocr_min_chars {
            return (direct_page(document, number, direct), None);
        }

        let _slot = match self.ocr_slots.acquire().await {
            Ok(slot) => slot,
            Err(error) => return failed_page(document, number, format!("ocr pool closed: {error}")),
        };
        match self.rasterizer.render_page(path, number).await {
            Ok(image) => self.ocr_image(document, number, &image).await,
            Err(error) => failed_page(document, number, format!("rasterization failed: {error}")),
        }
    }

    async fn recognize_image(&self, document: &SourceDocument, number: u32) -> (Page, Option<PageFailure>) {
        let _slot = match self.ocr_slots.acquire().await {
            Ok(slot) => slot,
            Err(error) => return failed_page(document, number, format!("ocr pool closed: {error}")),
        };
        self.ocr_image(document, number, &document.bytes).await
    }

    /// Callers hold an OCR slot.
    async fn ocr_image(
        &self,
        document: &SourceDocument,
        number: u32,
        image: &[u8],
    ) -> (Page, Option<PageFailure>) {
        match self.ocr.recognize(image, &self.language).await {
            Ok(text) => {
                let page = Page {
                    document_id: document.document_id.clone(),
                    number,
                    text: self.normalizer.normalize(&text),
                    origin: PageOrigin::Ocr,
                };
                (page, None)
            }
            Err(error) => failed_page(
                document,
                number,
                format!("{} ocr failed: {error}", self.ocr.name()),
            ),
        }
    }
}

fn direct_page(document: &SourceDocument, number: u32, text: String) -> Page {
    Page {
        document_id: document.document_id.clone(),
        number,
        text,
        origin: PageOrigin::Direct,
    }
}

fn failed_page(document: &SourceDocument, number: u32, reason: String) -> (Page, Option<PageFailure>) {
    warn!(source = %document.source_path, page = number, %reason, "page failed");
    let page = Page {
        document_id: document.document_id.clone(),
        number,
        text: String::new(),
        origin: PageOrigin::Failed,
    };
    let failure = PageFailure {
        source_path: document.source_path.clone(),
        page: number,
        reason,
    };
    (page, Some(failure))
}
