//! API-based embedders for OpenAI-compatible and HuggingFace inference endpoints.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use memory_types::{EmbeddingProvider, EmbeddingSettings};

use crate::error::EmbeddingError;
use crate::model::{truncate_chars, Embedding, EmbeddingModel, ModelInfo};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const HUGGINGFACE_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Remote API flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `POST {base}/embeddings` with `{"model", "input"}`
    OpenAi,
    /// `POST {base}/models/{model}` with `{"inputs"}`
    HuggingFace,
}

/// Configuration for API-based embedder.
#[derive(Debug, Clone)]
pub struct ApiEmbedderConfig {
    pub flavor: ApiFlavor,

    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Model to use
    pub model: String,

    /// API key; HuggingFace accepts anonymous requests
    pub api_key: Option<SecretString>,

    /// Expected embedding dimension
    pub dimension: usize,

    /// Inputs are truncated to this many characters
    pub max_length: usize,

    /// Request timeout
    pub timeout: Duration,

    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: u32,
}

impl ApiEmbedderConfig {
    /// Create config for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            flavor: ApiFlavor::OpenAi,
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
            api_key: Some(SecretString::from(api_key.into())),
            dimension,
            max_length: 512,
            timeout: Duration::from_secs(30),
            max_retries: 0,
        }
    }

    /// Create config for the HuggingFace inference API.
    pub fn huggingface(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            flavor: ApiFlavor::HuggingFace,
            base_url: HUGGINGFACE_BASE_URL.to_string(),
            model: model.into(),
            api_key: None,
            dimension,
            max_length: 512,
            timeout: Duration::from_secs(30),
            max_retries: 0,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Build from settings. Fails for the hash provider.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self, EmbeddingError> {
        let mut config = match settings.provider {
            EmbeddingProvider::OpenAi => {
                let key = settings.api_key.clone().ok_or_else(|| {
                    EmbeddingError::Config("api_key is required for openai".to_string())
                })?;
                Self::openai(key, settings.model.clone(), settings.dimension)
            }
            EmbeddingProvider::HuggingFace => {
                let config = Self::huggingface(settings.model.clone(), settings.dimension);
                match &settings.api_key {
                    Some(key) => config.with_api_key(key.clone()),
                    None => config,
                }
            }
            EmbeddingProvider::Hash => {
                return Err(EmbeddingError::Config(
                    "hash provider has no API configuration".to_string(),
                ))
            }
        };
        if let Some(url) = &settings.api_base_url {
            config = config.with_base_url(url.clone());
        }
        config.max_length = settings.max_length;
        config.timeout = Duration::from_millis(settings.timeout_ms);
        config.max_retries = settings.max_retries;
        Ok(config)
    }
}

/// API-based embedder implementation.
pub struct ApiEmbedder {
    client: Client,
    config: ApiEmbedderConfig,
    info: ModelInfo,
}

impl ApiEmbedder {
    pub fn new(config: ApiEmbedderConfig) -> Result<Self, EmbeddingError> {
        if config.dimension == 0 {
            return Err(EmbeddingError::Config("dimension must be > 0".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Config(e.to_string()))?;

        let info = ModelInfo {
            name: config.model.clone(),
            dimension: config.dimension,
            max_input_chars: config.max_length,
        };
        Ok(Self {
            client,
            config,
            info,
        })
    }

    /// Call the API with retry logic.
    async fn call_api(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, inputs = texts.len(), "Calling embedding API");

            let result = match self.config.flavor {
                ApiFlavor::OpenAi => self.make_openai_request(texts).await,
                ApiFlavor::HuggingFace => self.make_huggingface_request(texts).await,
            };

            match result {
                Ok(vectors) => return Ok(vectors),
                Err(e) if !e.is_transient() || attempts > self.config.max_retries => {
                    if self.config.max_retries > 0 {
                        error!(error = %e, attempts, "Embedding request failed");
                    }
                    return Err(e);
                }
                Err(e) => match backoff.next_backoff() {
                    Some(duration) => {
                        warn!(
                            error = %e,
                            retry_in_ms = duration.as_millis(),
                            "Embedding request failed, retrying"
                        );
                        tokio::time::sleep(duration).await;
                    }
                    None => {
                        error!(error = %e, "Backoff exhausted");
                        return Err(e);
                    }
                },
            }
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header(
                "Authorization",
                format!("Bearer {}", key.expose_secret()),
            ),
            None => request,
        }
    }

    /// Make OpenAI-compatible embeddings request.
    async fn make_openai_request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        #[derive(Serialize)]
        struct OpenAIRequest<'a> {
            model: &'a str,
            input: &'a [&'a str],
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            data: Vec<OpenAIEmbedding>,
        }

        #[derive(Deserialize)]
        struct OpenAIEmbedding {
            #[serde(default)]
            index: usize,
            embedding: Vec<f32>,
        }

        let request = OpenAIRequest {
            model: &self.config.model,
            input: texts,
        };
        let url = format!("{}/embeddings", self.config.base_url);

        let response = self
            .authorize(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error(self.config.timeout))?;
        let response = check_status(response).await?;

        let mut body: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;

        if body.data.len() != texts.len() {
            return Err(EmbeddingError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Make HuggingFace inference request, one input per call.
    async fn make_huggingface_request(
        &self,
        texts: &[&str],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        #[derive(Serialize)]
        struct HuggingFaceRequest<'a> {
            inputs: &'a str,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum HuggingFaceResponse {
            Nested(Vec<Vec<f32>>),
            Flat(Vec<f32>),
        }

        let url = format!("{}/models/{}", self.config.base_url, self.config.model);
        let mut vectors = Vec::with_capacity(texts.len());

        for text in texts {
            let response = self
                .authorize(self.client.post(&url))
                .json(&HuggingFaceRequest { inputs: text })
                .send()
                .await
                .map_err(map_transport_error(self.config.timeout))?;
            let response = check_status(response).await?;

            let body: HuggingFaceResponse = response
                .json()
                .await
                .map_err(|e| EmbeddingError::Parse(e.to_string()))?;
            let vector = match body {
                HuggingFaceResponse::Flat(v) => v,
                HuggingFaceResponse::Nested(mut rows) if !rows.is_empty() => rows.swap_remove(0),
                HuggingFaceResponse::Nested(_) => Vec::new(),
            };
            vectors.push(vector);
        }
        Ok(vectors)
    }

    fn finish(&self, vector: Vec<f32>) -> Result<Embedding, EmbeddingError> {
        if vector.is_empty() {
            return Err(EmbeddingError::Parse("empty embedding response".to_string()));
        }
        if vector.len() != self.config.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(Embedding::new(vector))
    }
}

fn map_transport_error(timeout: Duration) -> impl Fn(reqwest::Error) -> EmbeddingError {
    move |e| {
        if e.is_timeout() {
            EmbeddingError::Timeout(timeout)
        } else {
            EmbeddingError::Request(e.to_string())
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, EmbeddingError> {
    let status = response.status();
    if status == 429 {
        return Err(EmbeddingError::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[async_trait]
impl EmbeddingModel for ApiEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }
        let input = truncate_chars(text, self.config.max_length);
        let mut vectors = self.call_api(&[input]).await?;
        let vector = vectors.pop().unwrap_or_default();
        debug!(
            text_length = input.len(),
            embedding_dimension = vector.len(),
            "Generated embedding"
        );
        self.finish(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "batch contains empty text".to_string(),
            ));
        }
        let inputs: Vec<&str> = texts
            .iter()
            .map(|t| truncate_chars(t, self.config.max_length))
            .collect();
        let vectors = self.call_api(&inputs).await?;
        vectors.into_iter().map(|v| self.finish(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn openai_config(server: &MockServer, dimension: usize) -> ApiEmbedderConfig {
        ApiEmbedderConfig::openai("test-key", "text-embedding-3-small", dimension)
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_openai_batch_sorted_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "text-embedding-3-small"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 2.0]},
                    {"index": 0, "embedding": [3.0, 4.0]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = ApiEmbedder::new(openai_config(&server, 2)).unwrap();
        let out = embedder
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert!((out[0].values[0] - 0.6).abs() < 1e-6);
        assert!((out[1].values[1] - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_huggingface_nested_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/bge-small"))
            .and(body_partial_json(json!({"inputs": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([[1.0, 0.0, 0.0]])))
            .mount(&server)
            .await;

        let config = ApiEmbedderConfig::huggingface("bge-small", 3).with_base_url(server.uri());
        let embedder = ApiEmbedder::new(config).unwrap();
        let emb = embedder.embed("hello").await.unwrap();
        assert_eq!(emb.values, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_server_error_not_retried_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = ApiEmbedder::new(openai_config(&server, 2)).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Api { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [1.0, 1.0]}]
            })))
            .mount(&server)
            .await;

        let embedder = ApiEmbedder::new(openai_config(&server, 2).with_max_retries(2)).unwrap();
        let emb = embedder.embed("hello").await.unwrap();
        assert_eq!(emb.dimension(), 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [1.0, 1.0, 1.0]}]
            })))
            .mount(&server)
            .await;

        let embedder = ApiEmbedder::new(openai_config(&server, 2)).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let embedder = ApiEmbedder::new(openai_config(&server, 2)).unwrap();
        assert!(matches!(
            embedder.embed("hello").await,
            Err(EmbeddingError::RateLimited)
        ));
    }

    #[test]
    fn test_from_settings_requires_openai_key() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProvider::OpenAi,
            ..Default::default()
        };
        assert!(ApiEmbedderConfig::from_settings(&settings).is_err());

        let settings = EmbeddingSettings {
            provider: EmbeddingProvider::HuggingFace,
            api_base_url: Some("http://localhost:8080/".to_string()),
            max_retries: 2,
            ..Default::default()
        };
        let config = ApiEmbedderConfig::from_settings(&settings).unwrap();
        assert_eq!(config.flavor, ApiFlavor::HuggingFace);
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.dimension, 768);
    }
}
