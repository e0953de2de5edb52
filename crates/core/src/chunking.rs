use crate::error::ConfigError;
use crate::models::{Chunk, IngestionOptions};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chars == 0 {
            return Err(ConfigError::InvalidChunking(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(ConfigError::InvalidChunking(format!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        if self.min_chars > self.max_chars {
            return Err(ConfigError::InvalidChunking(format!(
                "min_chars ({}) must not exceed max_chars ({})",
                self.min_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
            min_chars: value.min_chunk_chars,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Cleans OCR and extraction output before chunking: words hyphenated across a
/// line break are rejoined, then whitespace is collapsed.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    hyphenated_break: Regex,
}

impl TextNormalizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            hyphenated_break: Regex::new(r"(\w)-[ \t]*\r?\n\s*(\w)")?,
        })
    }

    pub fn normalize(&self, text: &str) -> String {
        let joined = self.hyphenated_break.replace_all(text, "$1$2");
        normalize_whitespace(&joined)
    }
}

/// A slice of the input text, addressed in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Splits `text` into overlapping windows of at most `max_chars` characters.
///
/// Windows end on whitespace when one is available late enough in the window,
/// and consecutive windows share `overlap_chars` characters. A tail that would
/// be shorter than `min_chars` is absorbed by anchoring the last window at the
/// end of the text. Whitespace-only input yields no windows.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextWindow>, ConfigError> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut windows = Vec::new();

    if len <= config.max_chars {
        push_window(&mut windows, &chars, 0, len);
        return Ok(windows);
    }

    let shortest = config.min_chars.max(config.overlap_chars + 1);
    let mut start = 0;
    loop {
        let hard_end = start + config.max_chars;
        if hard_end >= len {
            push_window(&mut windows, &chars, start, len);
            break;
        }

        let end = (start + shortest..=hard_end)
            .rev()
            .find(|&candidate| chars[candidate].is_whitespace())
            .unwrap_or(hard_end);
        push_window(&mut windows, &chars, start, end);

        let next_start = end - config.overlap_chars;
        let tail = len - next_start;
        if tail <= config.max_chars && tail < config.min_chars {
            push_window(&mut windows, &chars, len - config.max_chars, len);
            break;
        }
        start = next_start;
    }

    Ok(windows)
}

fn push_window(windows: &mut Vec<TextWindow>, chars: &[char], start: usize, end: usize) {
    let text: String = chars[start..end].iter().collect();
    if text.trim().is_empty() {
        return;
    }
    windows.push(TextWindow {
        text,
        char_start: start,
        char_end: end,
    });
}

pub fn build_chunks(
    document_id: &str,
    source_path: &str,
    page: u32,
    page_text: &str,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, ConfigError> {
    let chunks = chunk_text(page_text, config)?
        .into_iter()
        .enumerate()
        .map(|(index, window)| {
            let chunk_index = index as u32;
            Chunk {
                chunk_id: make_chunk_id(document_id, page, chunk_index, &window.text),
                document_id: document_id.to_string(),
                source_path: source_path.to_string(),
                page,
                chunk_index,
                text: window.text,
                char_start: window.char_start,
                char_end: window.char_end,
            }
        })
        .collect();

    Ok(chunks)
}

fn make_chunk_id(document_id: &str, page: u32, index: u32, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
