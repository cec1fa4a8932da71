use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, WayfarerError};

/// Provider-specific default base URLs
pub fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openai" => "https://api.openai.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "lmstudio" => "http://localhost:1234/v1",
        _ => "https://api.openai.com/v1",
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Outcome of a single POST to the embeddings endpoint.
enum Attempt {
    Done(Vec<Vec<f32>>),
    Retry(WayfarerError),
    Fail(WayfarerError),
}

/// Client for OpenAI-compatible `/embeddings` endpoints. Rate limits, server
/// errors and transport failures are retried with exponential backoff;
/// authentication failures are not.
#[derive(Clone)]
pub struct EmbeddingApiClient {
    client: Client,
    headers: HeaderMap,
    url: String,
    config: ApiConfig,
}

impl EmbeddingApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WayfarerError::Embedding(format!("Failed to create HTTP client: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| WayfarerError::Embedding(format!("Invalid API key header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let url = format!("{}/embeddings", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            headers,
            url,
            config,
        })
    }

    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts.to_vec(),
        };

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 << (attempt - 1).min(10))).await;
            }

            match self.post(&request, texts.len()).await {
                Attempt::Done(vectors) => return Ok(vectors),
                Attempt::Fail(e) => return Err(e),
                Attempt::Retry(e) => {
                    tracing::debug!(attempt, error = %e, "Embedding request failed, retrying");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| WayfarerError::Embedding("Unknown error".to_string())))
    }

    async fn post(&self, request: &EmbeddingRequest<'_>, expected: usize) -> Attempt {
        let resp = match self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return Attempt::Retry(WayfarerError::Embedding(format!("Request failed: {e}"))),
        };

        let status = resp.status();
        if status.is_success() {
            return match resp.json::<EmbeddingResponse>().await {
                Ok(body) => match order_vectors(body.data, expected) {
                    Ok(vectors) => Attempt::Done(vectors),
                    Err(e) => Attempt::Fail(e),
                },
                Err(e) => Attempt::Fail(WayfarerError::Embedding(format!(
                    "Failed to parse response: {e}"
                ))),
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Attempt::Retry(WayfarerError::ApiRateLimit { retry_after });
        }

        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Attempt::Fail(WayfarerError::ApiAuth(body))
            }
            s if s.is_server_error() => {
                Attempt::Retry(WayfarerError::Embedding(format!("Server error {s}: {body}")))
            }
            s => Attempt::Fail(WayfarerError::Embedding(format!("API error {s}: {body}"))),
        }
    }
}

/// Restores input order when the server reports indices, and rejects
/// responses that do not carry one vector per input.
fn order_vectors(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(WayfarerError::Embedding(format!(
            "Expected {expected} embeddings, got {}",
            data.len()
        )));
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_config(base_url: String, max_retries: u32) -> ApiConfig {
        ApiConfig {
            base_url,
            api_key: Some("test-key".to_string()),
            model: "text-embedding-3-small".to_string(),
            timeout_secs: 5,
            max_retries,
        }
    }

    #[tokio::test]
    async fn test_embed_parses_vectors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}, {"embedding": [0.4, 0.5, 0.6]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = EmbeddingApiClient::new(api_config(server.uri(), 0)).unwrap();
        let vectors = client.embed(&["a", "b"]).await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.4, 0.5, 0.6]);
    }

    #[tokio::test]
    async fn test_embed_restores_input_order_and_checks_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [2.0]},
                    {"index": 0, "embedding": [1.0]}
                ]
            })))
            .mount(&server)
            .await;

        let client = EmbeddingApiClient::new(api_config(server.uri(), 0)).unwrap();
        assert_eq!(
            client.embed(&["first", "second"]).await.unwrap(),
            vec![vec![1.0], vec![2.0]]
        );

        let result = client.embed(&["a", "b", "c"]).await;
        assert!(matches!(result, Err(WayfarerError::Embedding(msg)) if msg.contains("Expected 3")));
    }

    #[tokio::test]
    async fn test_embed_auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = EmbeddingApiClient::new(api_config(server.uri(), 3)).unwrap();
        let result = client.embed(&["a"]).await;

        assert!(matches!(result, Err(WayfarerError::ApiAuth(body)) if body == "bad key"));
    }

    #[tokio::test]
    async fn test_embed_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = EmbeddingApiClient::new(api_config(server.uri(), 2)).unwrap();
        let result = client.embed(&["a"]).await;

        assert!(matches!(result, Err(WayfarerError::Embedding(_))));
    }
}
