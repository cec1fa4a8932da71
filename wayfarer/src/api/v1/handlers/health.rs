use axum::extract::State;
use serde::Serialize;

use crate::api::state::AppState;
use crate::api::v1::response::ApiResponse;
use crate::config::IntentClassifierKind;
use crate::llm::{LlmBackend, LlmProvider};

/// Health data returned inside the v1 envelope.
#[derive(Debug, Clone, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub database: ComponentStatus,
    pub embeddings: EmbeddingsStatus,
    pub llm: LlmStatus,
    pub chat: ChatStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingsStatus {
    pub status: &'static str,
    pub model: String,
    pub dimensions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatStatus {
    pub intent_classifier: &'static str,
    pub cached_parts: usize,
    pub session_ttl_secs: u64,
}

fn llm_status(llm: &LlmProvider) -> LlmStatus {
    let provider = match llm.backend() {
        LlmBackend::OpenAI => "openai",
        LlmBackend::OpenRouter => "openrouter",
        LlmBackend::Ollama => "ollama",
        LlmBackend::LmStudio => "lmstudio",
        LlmBackend::OpenAICompatible { .. } => "openai-compatible",
        LlmBackend::Unavailable { .. } => {
            return LlmStatus {
                status: "unavailable",
                provider: None,
                model: None,
            }
        }
    };
    LlmStatus {
        status: "available",
        provider: Some(provider),
        model: llm.config().map(|c| c.model.clone()),
    }
}

/// `GET /api/v1/health`
///
/// Always 200; a failing database is reported in the body.
pub async fn health_check(State(state): State<AppState>) -> ApiResponse<HealthData> {
    let database = match state.db.sync().await {
        Ok(()) => ComponentStatus { status: "ok" },
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            ComponentStatus { status: "error" }
        }
    };

    let chat = ChatStatus {
        intent_classifier: match state.config.chat.intent_classifier {
            IntentClassifierKind::Heuristic => "heuristic",
            IntentClassifierKind::Llm => "llm",
        },
        cached_parts: state.chat.cached_parts(),
        session_ttl_secs: state.config.chat.session_ttl_secs,
    };

    ApiResponse::success(HealthData {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        embeddings: EmbeddingsStatus {
            status: "ok",
            model: state.config.embeddings.model.clone(),
            dimensions: state.embedder.dimensions(),
        },
        llm: llm_status(&state.llm),
        chat,
    })
}
