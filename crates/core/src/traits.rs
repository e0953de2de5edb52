use crate::error::{AnswerError, IndexError};
use crate::models::{RetrievalHit, RetrievalResult};
use async_trait::async_trait;

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query_vector: &[f32]) -> Result<RetrievalResult, IndexError>;
}

/// The language-model side of question answering. `Ok(None)` means the model
/// answered with no usable content.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        context: &[RetrievalHit],
    ) -> Result<Option<String>, AnswerError>;
}
