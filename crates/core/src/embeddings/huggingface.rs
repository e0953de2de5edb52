//! Hugging Face hosted feature-extraction backend (Inference API or a
//! text-embeddings-inference server).

use super::http::send_json;
use super::l2_normalize;
use crate::error::EmbeddingError;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const HUGGINGFACE_BASE_URL: &str = "https://api-inference.huggingface.co";
const PROVIDER: &str = "huggingface";

#[derive(Debug, Clone)]
pub struct HuggingFaceEmbedder {
    client: Client,
    base_url: String,
    token: Option<String>,
    model: String,
    normalize: bool,
    timeout: Duration,
}

impl HuggingFaceEmbedder {
    pub fn new(
        token: Option<String>,
        model: impl Into<String>,
        base_url: Option<String>,
        normalize: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url
                .unwrap_or_else(|| HUGGINGFACE_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            token,
            model: model.into(),
            normalize,
            timeout,
        }
    }

    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let mut request = self
            .client
            .post(format!(
                "{}/pipeline/feature-extraction/{}",
                self.base_url, self.model
            ))
            .timeout(self.timeout)
            .json(&FeatureExtractionRequest {
                inputs: texts,
                options: RequestOptions {
                    wait_for_model: true,
                },
            });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let payload: Value = send_json(PROVIDER, request).await?;
        let mut vectors = parse_feature_vectors(&payload)?;
        if self.normalize {
            vectors.iter_mut().for_each(|vector| l2_normalize(vector));
        }
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [&'a str],
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

/// Accepts pooled output (`[[f32]]`, one vector per input) or token-level
/// output (`[[[f32]]]`), which is mean-pooled per input.
fn parse_feature_vectors(payload: &Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let decode = |message: &str| EmbeddingError::Decode {
        provider: PROVIDER,
        message: message.to_string(),
    };

    let rows = payload
        .as_array()
        .ok_or_else(|| decode("expected a JSON array of vectors"))?;

    rows.iter()
        .map(|row| {
            let items = row.as_array().ok_or_else(|| decode("expected one array per input"))?;
            match items.first() {
                Some(Value::Array(_)) => {
                    let tokens = items
                        .iter()
                        .map(|token| number_row(token).ok_or_else(|| decode("non-numeric token vector")))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(mean_pool(&tokens))
                }
                _ => number_row(row).ok_or_else(|| decode("non-numeric vector")),
            }
        })
        .collect()
}

fn number_row(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|number| number.as_f64().map(|number| number as f32))
        .collect()
}

fn mean_pool(tokens: &[Vec<f32>]) -> Vec<f32> {
    let width = tokens.first().map(Vec::len).unwrap_or(0);
    let mut pooled = vec![0f32; width];
    for token in tokens {
        for (slot, value) in pooled.iter_mut().zip(token) {
            *slot += value;
        }
    }
    if !tokens.is_empty() {
        let count = tokens.len() as f32;
        pooled.iter_mut().for_each(|value| *value /= count);
    }
    pooled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::http::test_server;
    use serde_json::json;

    #[test]
    fn pooled_vectors_are_taken_as_is() {
        let vectors = parse_feature_vectors(&json!([[1.0, 2.0], [3.0, 4.0]])).expect("parse");
        assert_eq!(vectors, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn token_vectors_are_mean_pooled() {
        let vectors =
            parse_feature_vectors(&json!([[[1.0, 0.0], [3.0, 2.0]]])).expect("parse");
        assert_eq!(vectors, vec![vec![2.0, 1.0]]);
    }

    #[test]
    fn unexpected_shapes_are_decode_errors() {
        assert!(matches!(
            parse_feature_vectors(&json!({"error": "loading"})),
            Err(EmbeddingError::Decode { .. })
        ));
        assert!(matches!(
            parse_feature_vectors(&json!([["a", "b"]])),
            Err(EmbeddingError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn token_is_optional_and_vectors_are_normalized() {
        let (base_url, seen) = test_server::serve(vec![(200, "[[3.0, 4.0]]".to_string())]).await;
        let embedder = HuggingFaceEmbedder::new(
            None,
            "intfloat/multilingual-e5-small",
            Some(base_url),
            true,
            Duration::from_secs(5),
        );

        let vectors = embedder.embed_batch(&["bolsa"]).await.expect("embedding should succeed");
        assert_eq!(vectors, vec![vec![0.6, 0.8]]);
        assert!(seen.lock().await[0].contains("\"wait_for_model\":true"));
    }
}
