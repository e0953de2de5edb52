use crate::embeddings::http::error_message;
use crate::error::AnswerError;
use crate::models::RetrievalHit;
use crate::retry::{classify_status, is_transient_transport, with_backoff, RetryPolicy, StatusClass};
use crate::traits::AnswerGenerator;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

const INSTRUCTION: &str = "Você é um assistente especialista em análise de documentos. \
Responda à pergunta do usuário com base apenas no contexto fornecido. \
Cada trecho do contexto indica o documento e a página de origem.";

/// Renders the retrieved chunks as numbered context blocks followed by the
/// question.
pub fn build_prompt(question: &str, context: &[RetrievalHit]) -> String {
    let blocks = context
        .iter()
        .enumerate()
        .map(|(position, hit)| {
            format!(
                "[{}] {} (página {})\n{}",
                position + 1,
                hit.chunk.source_path,
                hit.chunk.page,
                hit.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{INSTRUCTION}\n\nContexto:\n{blocks}\n\nPergunta: {}", question.trim())
}

#[derive(Debug, Clone)]
pub struct GeminiAnswerer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GeminiAnswerer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into().trim_start_matches("models/").to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn generate_once(&self, prompt: &str) -> Result<Option<String>, AnswerError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if is_transient_transport(&error) {
                    AnswerError::Unavailable(error.to_string())
                } else {
                    AnswerError::Rejected {
                        status: 0,
                        message: error.to_string(),
                    }
                }
            })?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => {
                let payload: GenerateResponse = response
                    .json()
                    .await
                    .map_err(|error| AnswerError::Decode(error.to_string()))?;
                Ok(payload.text())
            }
            class => {
                let message = error_message(&response.text().await.unwrap_or_default());
                error!(model = %self.model, %status, "generation failed");
                Err(match class {
                    StatusClass::RateLimited => AnswerError::RateLimited(message),
                    StatusClass::Unavailable => AnswerError::Unavailable(message),
                    _ => AnswerError::Rejected {
                        status: status.as_u16(),
                        message,
                    },
                })
            }
        }
    }
}

#[async_trait]
impl AnswerGenerator for GeminiAnswerer {
    async fn generate(
        &self,
        question: &str,
        context: &[RetrievalHit],
    ) -> Result<Option<String>, AnswerError> {
        let prompt = build_prompt(question, context);
        debug!(model = %self.model, chunks = context.len(), prompt_chars = prompt.len(), "generating answer");
        with_backoff(&self.retry, "gemini.generate", || self.generate_once(&prompt)).await
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let text = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<String>();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::http::test_server;
    use crate::models::Chunk;

    fn hit(source_path: &str, page: u32, text: &str) -> RetrievalHit {
        RetrievalHit {
            chunk: Chunk {
                chunk_id: format!("{source_path}-{page}"),
                document_id: "doc".to_string(),
                source_path: source_path.to_string(),
                page,
                chunk_index: 0,
                text: text.to_string(),
                char_start: 0,
                char_end: text.chars().count(),
            },
            score: 0.9,
        }
    }

    fn answerer(base_url: String) -> GeminiAnswerer {
        GeminiAnswerer::new("key", "gemini-2.0-flash")
            .with_base_url(base_url)
            .with_retry_policy(RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            })
    }

    #[test]
    fn prompt_numbers_context_blocks_and_ends_with_the_question() {
        let prompt = build_prompt(
            "  Qual a carga horária? ",
            &[
                hit("estagio.pdf", 2, "Duração mínima de 400 horas."),
                hit("edital.pdf", 1, "Inscrições abertas."),
            ],
        );

        assert!(prompt.starts_with("Você é um assistente especialista"));
        assert!(prompt.contains("[1] estagio.pdf (página 2)\nDuração mínima de 400 horas."));
        assert!(prompt.contains("[2] edital.pdf (página 1)"));
        assert!(prompt.ends_with("Pergunta: Qual a carga horária?"));
        assert!(!prompt.contains("HTML"));
    }

    #[tokio::test]
    async fn candidate_parts_are_joined() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "São "}, {"text": "400 horas."}]}}]}"#;
        let (base_url, seen) = test_server::serve(vec![(200, body.to_string())]).await;

        let answer = answerer(base_url)
            .generate("Qual a carga horária?", &[hit("estagio.pdf", 2, "400 horas")])
            .await
            .expect("generation succeeds");

        assert_eq!(answer.as_deref(), Some("São 400 horas."));
        let request = seen.lock().await[0].clone();
        assert!(request.contains("\"generationConfig\":{\"temperature\":0.1}"));
    }

    #[tokio::test]
    async fn blank_output_is_none() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "  "}]}, "finishReason": "SAFETY"}]}"#;
        let (base_url, _) = test_server::serve(vec![(200, body.to_string())]).await;

        let answer = answerer(base_url).generate("?", &[]).await.expect("request succeeds");
        assert_eq!(answer, None);
    }

    #[tokio::test]
    async fn overload_is_retried() {
        let ok = r#"{"candidates": [{"content": {"parts": [{"text": "Sim."}]}}]}"#;
        let (base_url, seen) = test_server::serve(vec![
            (503, r#"{"error": {"message": "overloaded"}}"#.to_string()),
            (200, ok.to_string()),
        ])
        .await;

        let answer = answerer(base_url).generate("?", &[]).await.expect("second attempt");
        assert_eq!(answer.as_deref(), Some("Sim."));
        assert_eq!(seen.lock().await.len(), 2);
    }
}
