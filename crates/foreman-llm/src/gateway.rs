use crate::config::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use foreman_core::{ForemanError, ForemanResult};
use std::time::Duration;
use tracing::debug;

/// One generation call: a prompt, an optional system preamble, and
/// optional per-call model and provider overrides.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System preamble, sent as the first message when present.
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
    /// Model override for this call.
    pub model: Option<String>,
    /// Provider override for this call.
    pub provider: Option<LlmProvider>,
}

impl GenerationRequest {
    /// Creates a request carrying only a prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            model: None,
            provider: None,
        }
    }

    /// Sets the system preamble.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Overrides the model for this call.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Overrides the provider for this call.
    pub fn with_provider(mut self, provider: LlmProvider) -> Self {
        self.provider = Some(provider);
        self
    }
}

/// The generation seam. Everything that needs model output depends on this
/// trait, so tests swap in a mock and never touch the network.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Generates text for the request. Errors cover network failures,
    /// non-success statuses, and responses without usable content.
    async fn generate(&self, request: &GenerationRequest) -> ForemanResult<String>;
}

/// OpenAI-compatible chat completions backend.
///
/// Works with OpenAI, OpenRouter, Groq, and any server implementing the
/// same API.
pub struct HttpGateway {
    config: ModelConfig,
    http: reqwest::Client,
}

impl HttpGateway {
    /// Creates a gateway over the given model configuration.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GenerationGateway for HttpGateway {
    async fn generate(&self, request: &GenerationRequest) -> ForemanResult<String> {
        let config = self
            .config
            .with_overrides(request.model.as_deref(), request.provider);
        let url = format!("{}/v1/chat/completions", config.base_url());

        let mut messages: Vec<serde_json::Value> = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));

        let body = serde_json::json!({
            "model": config.model_id,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "messages": messages,
        });

        debug!(model = %config.model_id, provider = %config.provider, "generation request");

        let mut http_request = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(config.timeout_secs))
            .header("Authorization", format!("Bearer {}", config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter wants an application identifier
        if matches!(config.provider, LlmProvider::OpenRouter) {
            http_request = http_request.header("X-Title", "Foreman");
        }

        let resp = http_request
            .json(&body)
            .send()
            .await
            .map_err(|e| ForemanError::Gateway(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ForemanError::Gateway(e.to_string()))?;

        if !status.is_success() {
            return Err(ForemanError::Gateway(format!(
                "API error {status}: {resp_body}"
            )));
        }

        resp_body["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.to_string())
            .ok_or_else(|| ForemanError::Gateway("no content in response".to_string()))
    }
}
