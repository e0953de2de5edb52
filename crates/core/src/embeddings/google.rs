//! Google Generative Language `batchEmbedContents` backend.

use super::http::send_json;
use super::EmbedTask;
use crate::error::EmbeddingError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER: &str = "google";

#[derive(Debug, Clone)]
pub struct GoogleEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    /// Always carries the `models/` prefix the API expects.
    model: String,
    /// Overrides the per-call task type when set.
    task_type: Option<String>,
    output_dimensionality: Option<usize>,
    timeout: Duration,
}

impl GoogleEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        model: &str,
        base_url: Option<String>,
        task_type: Option<String>,
        output_dimensionality: Option<usize>,
        timeout: Duration,
    ) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };

        Self {
            client: Client::new(),
            base_url: base_url
                .unwrap_or_else(|| GOOGLE_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            model,
            task_type: task_type.map(|value| value.to_ascii_uppercase()),
            output_dimensionality,
            timeout,
        }
    }

    pub async fn embed_batch(&self, texts: &[&str], task: EmbedTask) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let task_type = self.task_type.as_deref().unwrap_or(match task {
            EmbedTask::Document => "RETRIEVAL_DOCUMENT",
            EmbedTask::Query => "RETRIEVAL_QUERY",
        });
        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, task_type, "embedding batch");

        let requests = texts
            .iter()
            .map(|&text| EmbedContentRequest {
                model: &self.model,
                content: Content {
                    parts: vec![Part { text }],
                },
                task_type,
                output_dimensionality: self.output_dimensionality,
            })
            .collect();

        let request = self
            .client
            .post(format!("{}/{}:batchEmbedContents", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&BatchEmbedRequest { requests });

        let response: BatchEmbedResponse = send_json(PROVIDER, request).await?;
        Ok(response
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::http::test_server;

    #[tokio::test]
    async fn batch_request_targets_the_model_and_parses_values() {
        let body = r#"{"embeddings": [{"values": [0.5, 0.5, 0.0]}, {"values": [0.0, 0.0, 1.0]}]}"#;
        let (base_url, seen) = test_server::serve(vec![(200, body.to_string())]).await;

        let embedder = GoogleEmbedder::new(
            "key",
            "embedding-001",
            Some(base_url),
            None,
            None,
            Duration::from_secs(5),
        );
        let vectors = embedder
            .embed_batch(&["edital", "calendário"], EmbedTask::Document)
            .await
            .expect("embedding should succeed");

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.0, 0.0, 1.0]);
        let request = seen.lock().await[0].clone();
        assert!(request.contains("\"model\":\"models/embedding-001\""));
        assert!(request.contains("\"taskType\":\"RETRIEVAL_DOCUMENT\""));
        assert!(request.contains("\"text\":\"calendário\""));
    }

    #[tokio::test]
    async fn questions_use_the_query_task_unless_overridden() {
        let body = r#"{"embeddings": [{"values": [1.0]}]}"#;
        let (base_url, seen) =
            test_server::serve(vec![(200, body.to_string()), (200, body.to_string())]).await;

        let embedder = GoogleEmbedder::new(
            "key",
            "embedding-001",
            Some(base_url.clone()),
            None,
            None,
            Duration::from_secs(5),
        );
        embedder
            .embed_batch(&["qual o prazo?"], EmbedTask::Query)
            .await
            .expect("embedding should succeed");

        let pinned = GoogleEmbedder::new(
            "key",
            "embedding-001",
            Some(base_url),
            Some("semantic_similarity".to_string()),
            None,
            Duration::from_secs(5),
        );
        pinned
            .embed_batch(&["qual o prazo?"], EmbedTask::Query)
            .await
            .expect("embedding should succeed");

        let requests = seen.lock().await.clone();
        assert!(requests[0].contains("\"taskType\":\"RETRIEVAL_QUERY\""));
        assert!(requests[1].contains("\"taskType\":\"SEMANTIC_SIMILARITY\""));
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let (base_url, _) = test_server::serve(vec![(503, "{}".to_string())]).await;
        let embedder = GoogleEmbedder::new(
            "key",
            "models/embedding-001",
            Some(base_url),
            None,
            None,
            Duration::from_secs(5),
        );

        let error = embedder.embed_batch(&["edital"], EmbedTask::Document).await.expect_err("503 must fail");
        assert!(matches!(error, EmbeddingError::Unavailable { .. }));
    }
}
