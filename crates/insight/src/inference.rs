//! Inference service abstraction.
//!
//! The pipeline only needs `complete(model, prompt) -> text`. The real
//! implementation talks to an Ollama-compatible `/api/generate` endpoint;
//! tests use `FakeInferenceService` with a scripted responder.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Inference errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    #[error("Inference timed out after {0} ms")]
    Timeout(u64),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Inference returned an empty response")]
    EmptyResponse,

    #[error("Inference is disabled")]
    Disabled,
}

/// Text completion backend
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Complete `prompt` with `model`.
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, InferenceError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Run one completion under a hard timeout.
pub async fn complete_with_timeout(
    service: &dyn InferenceService,
    model: &str,
    prompt: &str,
    timeout: Duration,
) -> Result<String, InferenceError> {
    debug!("{}: {} chars to {}", service.name(), prompt.len(), model);
    match tokio::time::timeout(timeout, service.complete(model, prompt)).await {
        Ok(Ok(text)) if text.trim().is_empty() => Err(InferenceError::EmptyResponse),
        Ok(result) => result,
        Err(_) => {
            let ms = timeout.as_millis() as u64;
            warn!("{}: {} timed out after {} ms", service.name(), model, ms);
            Err(InferenceError::Timeout(ms))
        }
    }
}

/// Ollama-compatible HTTP backend
pub struct OllamaService {
    endpoint: String,
    client: reqwest::Client,
}

impl OllamaService {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| InferenceError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Check if the endpoint answers at all
    pub async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.endpoint))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl InferenceService for OllamaService {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, InferenceError> {
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InferenceError::Http(format!(
                "Ollama request failed: {}",
                response.status()
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InferenceError::Http(e.to_string()))?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .to_string();

        if text.trim().is_empty() {
            return Err(InferenceError::EmptyResponse);
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Backend used when inference is switched off; every call fails.
pub struct DisabledService;

#[async_trait]
impl InferenceService for DisabledService {
    async fn complete(&self, _model: &str, _prompt: &str) -> Result<String, InferenceError> {
        Err(InferenceError::Disabled)
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// One recorded call to the fake service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCall {
    pub model: String,
    pub prompt: String,
}

type Responder = dyn Fn(&str, &str) -> Result<String, InferenceError> + Send + Sync;

/// Scripted backend for tests: a responder closure decides each reply
pub struct FakeInferenceService {
    responder: Arc<Responder>,
    calls: Mutex<Vec<FakeCall>>,
    delay: Option<Duration>,
}

impl FakeInferenceService {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, InferenceError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Same reply to every call
    pub fn always(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_, _| Ok(reply.clone()))
    }

    /// Same error to every call
    pub fn always_error(error: InferenceError) -> Self {
        Self::new(move |_, _| Err(error.clone()))
    }

    /// Sleep before every reply (for timeout tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl InferenceService for FakeInferenceService {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, InferenceError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FakeCall {
                model: model.to_string(),
                prompt: prompt.to_string(),
            });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(model, prompt)
    }

    fn name(&self) -> &str {
        "fake"
    }
}
