/// Ollama embedding provider
///
/// Calls the Ollama /api/embed endpoint, which accepts a list of inputs.
/// No API key required; a key is sent as a bearer token when configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EmbeddingError, EmbeddingProvider};

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OllamaEmbeddingProvider {
    /// # Arguments
    /// * `base_url` - Ollama server base URL (default "http://localhost:11434")
    /// * `model` - Model name (e.g., "nomic-embed-text")
    pub fn new(base_url: Option<String>, api_key: Option<String>, model: String) -> Self {
        OllamaEmbeddingProvider {
            client: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Generation("Ollama returned no embeddings".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OllamaEmbedRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EmbeddingError::Api { status, message: body });
        }

        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("Failed to parse Ollama response: {}", e)))?;

        if parsed.embeddings.is_empty() {
            return Err(EmbeddingError::Generation("Ollama returned no embeddings".to_string()));
        }
        Ok(parsed.embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_blank_key() {
        let provider = OllamaEmbeddingProvider::new(None, Some(" ".into()), "nomic-embed-text".into());
        assert_eq!(provider.base_url, DEFAULT_OLLAMA_BASE_URL);
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn test_response_without_embeddings_field_parses() {
        let parsed: OllamaEmbedResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.embeddings.is_empty());
    }
}
