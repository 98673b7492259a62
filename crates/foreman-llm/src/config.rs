use foreman_core::ForemanError;
use serde::{Deserialize, Serialize};

/// Supported generation providers. All speak the OpenAI chat dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// api.openai.com
    OpenAi,
    /// openrouter.ai aggregator.
    OpenRouter,
    /// Groq cloud inference; OpenAI-compatible API.
    Groq,
    /// Any other OpenAI-compatible server; set `api_base_url`.
    Custom,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::OpenRouter => write!(f, "openrouter"),
            LlmProvider::Groq => write!(f, "groq"),
            LlmProvider::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ForemanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "openrouter" => Ok(LlmProvider::OpenRouter),
            "groq" => Ok(LlmProvider::Groq),
            "custom" => Ok(LlmProvider::Custom),
            other => Err(ForemanError::Validation(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// Model selection and request defaults for the HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Which provider to talk to.
    pub provider: LlmProvider,
    /// Model identifier sent in the request body.
    pub model_id: String,
    /// Bearer token for the provider.
    #[serde(default)]
    pub api_key: String,
    /// Overrides the provider's default base URL when set.
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    60
}

impl ModelConfig {
    /// Resolved base URL: the explicit override, or the provider default.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Groq => "https://api.groq.com/openai",
                LlmProvider::Custom => "http://localhost:11434",
            }
        }
    }

    /// Returns a copy with per-call model and provider overrides applied.
    ///
    /// Switching provider drops a stale `api_base_url` so the new
    /// provider's default takes effect.
    pub fn with_overrides(
        &self,
        model: Option<&str>,
        provider: Option<LlmProvider>,
    ) -> ModelConfig {
        let mut config = self.clone();
        if let Some(model) = model {
            config.model_id = model.to_string();
        }
        if let Some(provider) = provider {
            if provider != config.provider {
                config.api_base_url = None;
            }
            config.provider = provider;
        }
        config
    }
}
