use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{Result, WayfarerError};
use crate::llm::api::LlmApiClient;
use crate::llm::{TextGenerator, TextStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    OpenRouter,
    Ollama,
    LmStudio,
    OpenAICompatible { base_url: String },
    Unavailable { reason: String },
}

/// Text-generation provider selected from configuration. The API client is
/// built once; an unconfigured provider, an unrecognised model prefix or a
/// client that cannot be built all yield [`LlmBackend::Unavailable`], whose
/// every call fails with [`WayfarerError::LlmUnavailable`].
#[derive(Clone)]
pub struct LlmProvider {
    backend: LlmBackend,
    config: Option<Arc<LlmConfig>>,
    client: Option<LlmApiClient>,
}

impl std::fmt::Debug for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProvider")
            .field("backend", &self.backend)
            .field("model", &self.config.as_ref().map(|c| c.model.as_str()))
            .finish()
    }
}

fn select_backend(config: &LlmConfig) -> LlmBackend {
    let (provider, _model) = parse_llm_provider_model(&config.model);
    match provider.to_lowercase().as_str() {
        "openai" => LlmBackend::OpenAI,
        "openrouter" => LlmBackend::OpenRouter,
        "ollama" => LlmBackend::Ollama,
        "lmstudio" => LlmBackend::LmStudio,
        _ => match &config.base_url {
            Some(base_url) => LlmBackend::OpenAICompatible {
                base_url: base_url.clone(),
            },
            None => LlmBackend::Unavailable {
                reason: format!("Unknown provider in model: {}", config.model),
            },
        },
    }
}

impl LlmProvider {
    pub fn new(config: Option<&LlmConfig>) -> Self {
        let Some(config) = config else {
            return Self::unavailable("No LLM configuration provided");
        };

        let mut backend = select_backend(config);
        let mut client = None;
        if !matches!(backend, LlmBackend::Unavailable { .. }) {
            match LlmApiClient::new(config) {
                Ok(built) => client = Some(built),
                Err(e) => {
                    tracing::warn!(model = %config.model, error = %e, "LLM client unavailable");
                    backend = LlmBackend::Unavailable {
                        reason: e.to_string(),
                    };
                }
            }
        }

        Self {
            backend,
            config: Some(Arc::new(config.clone())),
            client,
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            backend: LlmBackend::Unavailable {
                reason: reason.to_string(),
            },
            config: None,
            client: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub fn backend(&self) -> &LlmBackend {
        &self.backend
    }

    pub fn config(&self) -> Option<&LlmConfig> {
        self.config.as_deref()
    }
}

#[async_trait]
impl TextGenerator for LlmProvider {
    async fn generate_stream(&self, prompt: &str) -> Result<TextStream> {
        match &self.client {
            Some(client) => client.complete_stream(prompt).await,
            None => {
                let reason = match &self.backend {
                    LlmBackend::Unavailable { reason } => reason.clone(),
                    _ => "LLM configuration missing".to_string(),
                };
                Err(WayfarerError::LlmUnavailable(reason))
            }
        }
    }
}
