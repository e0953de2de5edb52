//! In-process embedding model: hashed character n-grams.

pub const LOCAL_MODEL_NAME: &str = "char-trigram";
pub const DEFAULT_LOCAL_DIMENSIONS: usize = 512;
pub const DEFAULT_NGRAM: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
    pub ngram: usize,
    pub normalize: bool,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_LOCAL_DIMENSIONS,
            ngram: DEFAULT_NGRAM,
            normalize: true,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let padded = format!(" {} ", text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" "));
        let chars: Vec<char> = padded.chars().collect();

        if chars.len() <= 2 {
            return vector;
        }

        for window in chars.windows(self.ngram.max(1).min(chars.len())) {
            let mut hash = 1469598103934665603u64;
            let mut buffer = [0u8; 4];
            for character in window {
                for byte in character.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        if self.normalize {
            super::l2_normalize(&mut vector);
        }

        vector
    }
}
