use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embeddings: EmbeddingsConfig,
    pub llm: Option<LlmConfig>,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// LLM configuration for the streaming text-generation provider
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub temperature: Option<f32>,
}

/// Which intent classifier implementation continuation turns use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntentClassifierKind {
    #[default]
    Heuristic,
    Llm,
}

impl std::str::FromStr for IntentClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "llm" => Ok(Self::Llm),
            _ => Err(format!("Unknown intent classifier: {s}")),
        }
    }
}

/// Tunables for chat turns: session lifetime, content cache, replay pacing,
/// event delivery budget and recommendation blending.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub session_ttl_secs: u64,
    pub content_cache_ttl_secs: u64,
    pub content_cache_capacity: usize,
    pub replay_chunk_size: usize,
    pub replay_chunk_delay_ms: u64,
    pub event_channel_capacity: usize,
    pub send_timeout_ms: u64,
    pub send_max_attempts: u32,
    pub dead_letter_capacity: usize,
    pub semantic_weight: f32,
    pub recommendation_limit: usize,
    pub intent_classifier: IntentClassifierKind,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 86400,
            content_cache_ttl_secs: 3600,
            content_cache_capacity: 1024,
            replay_chunk_size: 64,
            replay_chunk_delay_ms: 10,
            event_channel_capacity: 128,
            send_timeout_ms: 2000,
            send_max_attempts: 3,
            dead_letter_capacity: 256,
            semantic_weight: 0.6,
            recommendation_limit: 5,
            intent_classifier: IntentClassifierKind::Heuristic,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let chat_defaults = ChatConfig::default();

        Self {
            server: ServerConfig {
                host: env::var("WAYFARER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("WAYFARER_PORT", 3000),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:wayfarer.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
            },
            embeddings: EmbeddingsConfig {
                model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "BAAI/bge-small-en-v1.5".to_string()),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 384),
                batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", 256),
                api_key: env::var("EMBEDDING_API_KEY").ok(),
                base_url: env::var("EMBEDDING_BASE_URL").ok(),
                timeout_secs: parse_env_or("EMBEDDING_TIMEOUT", 30),
                max_retries: parse_env_or("EMBEDDING_MAX_RETRIES", 3),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 60),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
                temperature: parse_env_opt("LLM_TEMPERATURE"),
            }),
            chat: ChatConfig {
                session_ttl_secs: parse_env_or("SESSION_TTL_SECS", chat_defaults.session_ttl_secs),
                content_cache_ttl_secs: parse_env_or(
                    "CONTENT_CACHE_TTL_SECS",
                    chat_defaults.content_cache_ttl_secs,
                ),
                content_cache_capacity: parse_env_or(
                    "CONTENT_CACHE_CAPACITY",
                    chat_defaults.content_cache_capacity,
                ),
                replay_chunk_size: parse_env_or(
                    "REPLAY_CHUNK_SIZE",
                    chat_defaults.replay_chunk_size,
                ),
                replay_chunk_delay_ms: parse_env_or(
                    "REPLAY_CHUNK_DELAY_MS",
                    chat_defaults.replay_chunk_delay_ms,
                ),
                event_channel_capacity: parse_env_or(
                    "EVENT_CHANNEL_CAPACITY",
                    chat_defaults.event_channel_capacity,
                ),
                send_timeout_ms: parse_env_or("EVENT_SEND_TIMEOUT_MS", chat_defaults.send_timeout_ms),
                send_max_attempts: parse_env_or(
                    "EVENT_SEND_ATTEMPTS",
                    chat_defaults.send_max_attempts,
                ),
                dead_letter_capacity: parse_env_or(
                    "DEAD_LETTER_CAPACITY",
                    chat_defaults.dead_letter_capacity,
                ),
                semantic_weight: parse_semantic_weight(),
                recommendation_limit: parse_env_or(
                    "RECOMMENDATION_LIMIT",
                    chat_defaults.recommendation_limit,
                ),
                intent_classifier: parse_env_or(
                    "INTENT_CLASSIFIER",
                    chat_defaults.intent_classifier,
                ),
            },
        }
    }
}

/// `SEMANTIC_WEIGHT` must lie in `[0, 1]`; out-of-range values fall back to the default.
fn parse_semantic_weight() -> f32 {
    let default = ChatConfig::default().semantic_weight;
    let weight: f32 = parse_env_or("SEMANTIC_WEIGHT", default);
    if (0.0..=1.0).contains(&weight) {
        weight
    } else {
        tracing::warn!(
            "SEMANTIC_WEIGHT {} is outside [0, 1]. Using default {}.",
            weight,
            default
        );
        default
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known embedding providers that use OpenAI-compatible APIs
const KNOWN_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio", "local"];

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse a model name into (provider, model) tuple.
pub fn parse_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("local", model)
}

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("local", model)
}
