use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionStreamResponse,
    },
    Client,
};
use futures::{stream, StreamExt};

use crate::{
    config::{parse_llm_provider_model, LlmConfig},
    error::{Result, WayfarerError},
    llm::TextStream,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";

#[derive(Debug, Clone)]
struct ApiConfig {
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
    temperature: Option<f32>,
}

/// Streaming chat-completions client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct LlmApiClient {
    client: Client<OpenAIConfig>,
    config: ApiConfig,
}

impl LlmApiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_config = ApiConfig::from_llm_config(config);

        let (provider, _) = parse_llm_provider_model(&config.model);
        let needs_api_key = !matches!(
            provider.to_lowercase().as_str(),
            "ollama" | "local" | "lmstudio"
        );

        if needs_api_key && api_config.api_key.is_none() {
            return Err(WayfarerError::LlmUnavailable(
                "API key required for this provider".to_string(),
            ));
        }

        let openai_config = OpenAIConfig::new()
            .with_api_base(api_config.base_url.clone())
            .with_api_key(api_config.api_key.clone().unwrap_or_default());

        // No overall request timeout: a streamed generation may legitimately
        // run longer than `timeout_secs`. Only connecting is bounded.
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(api_config.timeout_secs))
            .build()
            .map_err(|error| {
                WayfarerError::LlmUnavailable(format!("Failed to create LLM HTTP client: {error}"))
            })?;

        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(api_config.timeout_secs)),
            ..Default::default()
        };

        let client = Client::with_config(openai_config)
            .with_http_client(http_client)
            .with_backoff(backoff);

        Ok(Self {
            client,
            config: api_config,
        })
    }

    /// Opens a streamed completion for `prompt`.
    ///
    /// The first event is awaited before returning so that connection,
    /// authentication and rate-limit failures surface here rather than as a
    /// stream item. Retryable opening failures are retried up to
    /// `max_retries` times with exponential delay.
    pub async fn complete_stream(&self, prompt: &str) -> Result<TextStream> {
        if prompt.trim().is_empty() {
            return Err(WayfarerError::Validation("Prompt cannot be empty".to_string()));
        }

        let mut last_error: Option<WayfarerError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay_ms = 100 * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let request = self.build_stream_request(prompt)?;

            let error = match self.client.chat().create_stream(request).await {
                Ok(mut upstream) => match upstream.next().await {
                    Some(Ok(first)) => {
                        let head = stream::iter(Some(Ok(first)));
                        let text = head
                            .chain(upstream)
                            .filter_map(|item| async move {
                                match item {
                                    Ok(response) => {
                                        let delta = Self::delta_text(response);
                                        (!delta.is_empty()).then_some(Ok(delta))
                                    }
                                    Err(error) => Some(Err(Self::map_openai_error(error))),
                                }
                            })
                            .boxed();
                        return Ok(text);
                    }
                    Some(Err(error)) => error,
                    None => return Ok(stream::empty().boxed()),
                },
                Err(error) => error,
            };

            if let Some(rate_limit_error) = Self::rate_limit_error(&error) {
                return Err(rate_limit_error);
            }

            if let Some(auth_error) = Self::auth_error(&error) {
                return Err(auth_error);
            }

            let retryable = Self::is_retryable(&error);
            let mapped_error = Self::map_openai_error(error);

            if retryable && attempt < self.config.max_retries {
                tracing::debug!(attempt, error = %mapped_error, "Retrying LLM stream");
                last_error = Some(mapped_error);
                continue;
            }

            return Err(mapped_error);
        }

        Err(last_error.unwrap_or_else(|| {
            WayfarerError::Llm("LLM stream failed after retries".to_string())
        }))
    }

    fn build_stream_request(&self, prompt: &str) -> Result<CreateChatCompletionRequest> {
        let messages = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|error| WayfarerError::Validation(format!("Invalid user prompt: {error}")))?
            .into()];

        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(self.config.model.clone())
            .messages(messages)
            .stream(true);

        if let Some(temperature) = self.config.temperature {
            request.temperature(temperature);
        }

        request.build().map_err(|error| {
            WayfarerError::Validation(format!("Invalid LLM stream request: {error}"))
        })
    }

    fn delta_text(response: CreateChatCompletionStreamResponse) -> String {
        response
            .choices
            .into_iter()
            .filter_map(|choice| choice.delta.content)
            .collect()
    }

    /// Status code carried by an event-source failure message, e.g.
    /// `Invalid status code: 503 Service Unavailable`.
    fn stream_status(message: &str) -> Option<u16> {
        let (_, rest) = message.split_once("status code: ")?;
        rest.get(..3)?.parse().ok()
    }

    fn is_retryable(error: &OpenAIError) -> bool {
        match error {
            OpenAIError::ApiError(api_error) => {
                api_error.r#type.is_none() && api_error.code.is_none()
            }
            OpenAIError::Reqwest(reqwest_error) => reqwest_error
                .status()
                .map(|status| status.is_server_error())
                .unwrap_or(true),
            OpenAIError::StreamError(message) => Self::stream_status(message)
                .map(|status| status >= 500)
                .unwrap_or(true),
            _ => false,
        }
    }

    fn rate_limit_error(error: &OpenAIError) -> Option<WayfarerError> {
        match error {
            OpenAIError::Reqwest(reqwest_error)
                if reqwest_error.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) =>
            {
                Some(WayfarerError::LlmRateLimit { retry_after: None })
            }
            OpenAIError::StreamError(message) if Self::stream_status(message) == Some(429) => {
                Some(WayfarerError::LlmRateLimit { retry_after: None })
            }
            OpenAIError::ApiError(api_error) if Self::is_rate_limit_api_error(api_error) => {
                Some(WayfarerError::LlmRateLimit { retry_after: None })
            }
            _ => None,
        }
    }

    fn auth_error(error: &OpenAIError) -> Option<WayfarerError> {
        match error {
            OpenAIError::Reqwest(reqwest_error)
                if reqwest_error.status() == Some(reqwest::StatusCode::UNAUTHORIZED)
                    || reqwest_error.status() == Some(reqwest::StatusCode::FORBIDDEN) =>
            {
                Some(WayfarerError::LlmUnavailable(format!(
                    "LLM authentication failed: {reqwest_error}"
                )))
            }
            OpenAIError::StreamError(message)
                if matches!(Self::stream_status(message), Some(401) | Some(403)) =>
            {
                Some(WayfarerError::LlmUnavailable(format!(
                    "LLM authentication failed: {message}"
                )))
            }
            OpenAIError::ApiError(api_error) if Self::is_auth_api_error(api_error) => Some(
                WayfarerError::LlmUnavailable(format!("LLM authentication failed: {api_error}")),
            ),
            _ => None,
        }
    }

    fn is_rate_limit_api_error(api_error: &ApiError) -> bool {
        let message = api_error.message.to_lowercase();
        let error_type = api_error.r#type.clone().unwrap_or_default().to_lowercase();
        let code = api_error.code.clone().unwrap_or_default().to_lowercase();

        message.contains("rate limit")
            || message.contains("too many requests")
            || error_type.contains("rate_limit")
            || code.contains("rate_limit")
            || code == "insufficient_quota"
    }

    fn is_auth_api_error(api_error: &ApiError) -> bool {
        let message = api_error.message.to_lowercase();
        let error_type = api_error.r#type.clone().unwrap_or_default().to_lowercase();
        let code = api_error.code.clone().unwrap_or_default().to_lowercase();

        message.contains("unauthorized")
            || message.contains("invalid api key")
            || code.contains("invalid_api_key")
            || error_type.contains("authentication")
    }

    fn map_openai_error(error: OpenAIError) -> WayfarerError {
        match error {
            OpenAIError::Reqwest(reqwest_error) => {
                WayfarerError::Llm(format!("LLM request failed: {reqwest_error}"))
            }
            OpenAIError::ApiError(api_error) => {
                WayfarerError::Llm(format!("LLM API error: {api_error}"))
            }
            OpenAIError::JSONDeserialize(err) => {
                WayfarerError::Llm(format!("Failed to parse LLM stream event: {err}"))
            }
            OpenAIError::StreamError(message) => {
                WayfarerError::Llm(format!("LLM stream failed: {message}"))
            }
            OpenAIError::InvalidArgument(message) => WayfarerError::Validation(message),
            other => WayfarerError::Llm(other.to_string()),
        }
    }
}

impl ApiConfig {
    fn from_llm_config(config: &LlmConfig) -> Self {
        let (provider, model) = parse_llm_provider_model(&config.model);

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        let normalized_model = if provider.eq_ignore_ascii_case("local") {
            config.model.clone()
        } else {
            model.to_string()
        };

        Self {
            base_url,
            api_key: config.api_key.clone(),
            model: normalized_model,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            temperature: config.temperature,
        }
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openai" => OPENAI_BASE_URL,
        "openrouter" => OPENROUTER_BASE_URL,
        "ollama" => OLLAMA_BASE_URL,
        "lmstudio" => LMSTUDIO_BASE_URL,
        _ => OPENAI_BASE_URL,
    }
}
