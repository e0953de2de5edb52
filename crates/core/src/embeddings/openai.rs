//! OpenAI `/v1/embeddings` backend.

use super::http::send_json;
use crate::error::EmbeddingError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const PROVIDER: &str = "openai";

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    /// Sent only when the caller overrides the dimensionality (v3 models).
    request_dimensions: Option<usize>,
    timeout: Duration,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<String>,
        request_dimensions: Option<usize>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            model: model.into(),
            request_dimensions,
            timeout,
        }
    }

    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions,
        };
        let request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body);

        let response: EmbeddingResponse = send_json(PROVIDER, request).await?;
        let mut data = response.data;
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::http::test_server;

    fn embedder(base_url: String) -> OpenAiEmbedder {
        OpenAiEmbedder::new(
            "sk-test",
            "text-embedding-3-small",
            Some(base_url),
            None,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn vectors_are_returned_in_input_order() {
        let body = r#"{"data": [
            {"index": 1, "embedding": [0.0, 1.0]},
            {"index": 0, "embedding": [1.0, 0.0]}
        ]}"#;
        let (base_url, seen) = test_server::serve(vec![(200, body.to_string())]).await;

        let vectors = embedder(base_url)
            .embed_batch(&["primeiro", "segundo"])
            .await
            .expect("embedding should succeed");

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let request = seen.lock().await[0].clone();
        assert!(request.contains("\"model\":\"text-embedding-3-small\""));
        assert!(request.contains("\"input\":[\"primeiro\",\"segundo\"]"));
        assert!(!request.contains("dimensions"));
    }

    #[tokio::test]
    async fn invalid_key_is_a_permanent_rejection() {
        let body = r#"{"error": {"message": "Incorrect API key provided"}}"#;
        let (base_url, _) = test_server::serve(vec![(401, body.to_string())]).await;

        let error = embedder(base_url)
            .embed_batch(&["texto"])
            .await
            .expect_err("401 must fail");

        assert!(matches!(error, EmbeddingError::Rejected { status: 401, .. }));
        assert!(!error.is_transient());
    }

    #[tokio::test]
    async fn rate_limits_are_transient() {
        let (base_url, _) =
            test_server::serve(vec![(429, r#"{"error": {"message": "slow down"}}"#.to_string())]).await;

        let error = embedder(base_url)
            .embed_batch(&["texto"])
            .await
            .expect_err("429 must fail");

        assert!(matches!(error, EmbeddingError::RateLimited { .. }));
        assert!(error.is_transient());
    }
}
