
use std::io::{BufRead, BufReader};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use url::Url;

use super::{AnswerStream, LanguageModel};
use crate::config::OllamaConfig;
use crate::{RagError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Client for a local Ollama server, covering both the embedding and the
/// generation endpoints.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    model: String,
    #[serde(rename = "input")]
    inputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            batch_size: config.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Config(format!("Failed to build URL for {}: {}", path, e)))
    }

    fn post_json(&self, url: &Url, body: &str) -> Result<String> {
        self.request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 || *status == 429 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(RagError::Network(format!("HTTP {}", status)));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(RagError::Network(error.to_string()));
                    }

                    last_error = Some(RagError::Network(error.to_string()));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);
        Err(last_error
            .unwrap_or_else(|| RagError::Network("Request failed after retries".to_string())))
    }
}

impl LanguageModel for OllamaClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: self.embedding_model.clone(),
            prompt: text.to_string(),
        };

        let url = self.endpoint("/api/embed")?;
        let body = serde_json::to_string(&request)
            .map_err(|e| RagError::Embedding(format!("Failed to serialize request: {}", e)))?;

        let response_text = self.post_json(&url, &body)?;

        let embed_response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Failed to parse response: {}", e)))?;

        debug!(
            "Generated embedding with {} dimensions",
            embed_response.embedding.len()
        );
        Ok(embed_response.embedding)
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let url = self.endpoint("/api/embed")?;
        let mut results = Vec::with_capacity(texts.len());

        // Process in batches to avoid overwhelming the server
        for chunk in texts.chunks(self.batch_size as usize) {
            if chunk.len() == 1 {
                results.push(self.embed(&chunk[0])?);
                continue;
            }

            let request = BatchEmbedRequest {
                model: self.embedding_model.clone(),
                inputs: chunk.to_vec(),
            };

            let body = serde_json::to_string(&request).map_err(|e| {
                RagError::Embedding(format!("Failed to serialize batch request: {}", e))
            })?;

            let response_text = self.post_json(&url, &body)?;

            let batch_response: BatchEmbedResponse = serde_json::from_str(&response_text)
                .map_err(|e| RagError::Embedding(format!("Failed to parse response: {}", e)))?;

            if batch_response.embeddings.len() != chunk.len() {
                return Err(RagError::Embedding(format!(
                    "Mismatch between request and response counts: {} vs {}",
                    chunk.len(),
                    batch_response.embeddings.len()
                )));
            }

            results.extend(batch_response.embeddings);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Generating answer (prompt length: {})", prompt.len());

        let request = GenerateRequest {
            model: self.generation_model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let url = self.endpoint("/api/generate")?;
        let body = serde_json::to_string(&request)
            .map_err(|e| RagError::Generation(format!("Failed to serialize request: {}", e)))?;

        let response_text = self.post_json(&url, &body)?;

        let generate_response: GenerateResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Generation(format!("Failed to parse response: {}", e)))?;

        Ok(generate_response.response)
    }

    #[inline]
    fn generate_stream(&self, prompt: &str) -> AnswerStream {
        let (sender, stream) = AnswerStream::channel(STREAM_CHANNEL_CAPACITY);

        let request = GenerateRequest {
            model: self.generation_model.clone(),
            prompt: prompt.to_string(),
            stream: true,
        };
        let agent = self.agent.clone();
        let url = match self.endpoint("/api/generate") {
            Ok(url) => url,
            Err(e) => {
                // Deliver the failure through the stream so the caller sees a
                // terminal error rather than a silent empty answer.
                let _ = sender.try_send(Err(e));
                return stream;
            }
        };

        std::thread::spawn(move || {
            let body = match serde_json::to_string(&request) {
                Ok(body) => body,
                Err(e) => {
                    let _ = sender.blocking_send(Err(RagError::Generation(format!(
                        "Failed to serialize request: {}",
                        e
                    ))));
                    return;
                }
            };

            let response = agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&body);

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    let _ = sender.blocking_send(Err(RagError::Network(e.to_string())));
                    return;
                }
            };

            // Ollama streams newline-delimited JSON objects, one fragment per
            // line, with `done: true` on the final object.
            let reader = BufReader::new(response.into_body().into_reader());
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        let _ = sender.blocking_send(Err(RagError::Network(e.to_string())));
                        return;
                    }
                };

                if line.trim().is_empty() {
                    continue;
                }

                let fragment: GenerateResponse = match serde_json::from_str(&line) {
                    Ok(fragment) => fragment,
                    Err(e) => {
                        let _ = sender.blocking_send(Err(RagError::Generation(format!(
                            "Failed to parse stream fragment: {}",
                            e
                        ))));
                        return;
                    }
                };

                if !fragment.response.is_empty()
                    && sender.blocking_send(Ok(fragment.response)).is_err()
                {
                    // Consumer disconnected; stop producing.
                    debug!("Answer stream consumer gone, stopping generation read");
                    return;
                }

                if fragment.done {
                    return;
                }
            }
        });

        stream
    }
}
