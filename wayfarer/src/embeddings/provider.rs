use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

use crate::config::{parse_provider_model, EmbeddingsConfig};
use crate::embeddings::api::{default_base_url, ApiConfig, EmbeddingApiClient};
use crate::embeddings::Embedder;
use crate::error::{Result, WayfarerError};

#[derive(Clone)]
enum EmbeddingBackend {
    Local {
        model: Arc<Mutex<TextEmbedding>>,
        batch_size: usize,
    },
    Api(EmbeddingApiClient),
}

/// Embedding provider backed by a local fastembed model or by an
/// OpenAI-compatible HTTP API, selected by the `EMBEDDING_MODEL` prefix.
#[derive(Clone)]
pub struct EmbeddingProvider {
    backend: EmbeddingBackend,
    dimensions: usize,
}

impl EmbeddingProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let (provider, model_name) = parse_provider_model(&config.model);

        if provider == "local" {
            return Self::new_local(config, model_name);
        }

        let api_config = ApiConfig {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url(provider).to_string()),
            api_key: config.api_key.clone(),
            model: model_name.to_string(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        };

        tracing::info!(provider, model = model_name, "Using API embeddings");

        Ok(Self {
            backend: EmbeddingBackend::Api(EmbeddingApiClient::new(api_config)?),
            dimensions: config.dimensions,
        })
    }

    fn new_local(config: &EmbeddingsConfig, model_name: &str) -> Result<Self> {
        let embedding_model = resolve_embedding_model(model_name);
        let model = TextEmbedding::try_new(
            InitOptions::new(embedding_model).with_show_download_progress(true),
        )
        .map_err(|e| WayfarerError::Embedding(e.to_string()))?;

        Ok(Self {
            backend: EmbeddingBackend::Local {
                model: Arc::new(Mutex::new(model)),
                batch_size: config.batch_size.max(1),
            },
            dimensions: config.dimensions,
        })
    }

    async fn embed_single(&self, text: String) -> Result<Vec<f32>> {
        let embeddings = match &self.backend {
            EmbeddingBackend::Local { model, batch_size } => {
                let model = Arc::clone(model);
                let batch_size = *batch_size;
                tokio::task::spawn_blocking(move || {
                    let mut model = model.lock().map_err(|e| {
                        WayfarerError::Embedding(format!("Embedding model lock poisoned: {e}"))
                    })?;
                    model
                        .embed(vec![text], Some(batch_size))
                        .map_err(|e| WayfarerError::Embedding(e.to_string()))
                })
                .await
                .map_err(|e| WayfarerError::Embedding(format!("Embedding worker failed: {e}")))??
            }
            EmbeddingBackend::Api(client) => client.embed(&[text.as_str()]).await?,
        };

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| WayfarerError::Embedding("No embedding generated".to_string()))
    }

    fn is_local(&self) -> bool {
        matches!(self.backend, EmbeddingBackend::Local { .. })
    }
}

#[async_trait]
impl Embedder for EmbeddingProvider {
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        // Local models use query: prefix
        let text = if self.is_local() {
            format!("query: {query}")
        } else {
            query.to_string()
        };
        self.embed_single(text).await
    }

    async fn embed_passage(&self, passage: &str) -> Result<Vec<f32>> {
        let text = if self.is_local() {
            format!("passage: {passage}")
        } else {
            passage.to_string()
        };
        self.embed_single(text).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn resolve_embedding_model(model_name: &str) -> EmbeddingModel {
    match model_name {
        "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "BAAI/bge-large-en-v1.5" | "bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
        "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            EmbeddingModel::AllMiniLML6V2
        }
        "nomic-embed-text-v1.5" | "nomic-ai/nomic-embed-text-v1.5" => {
            EmbeddingModel::NomicEmbedTextV15
        }
        other => {
            tracing::warn!(model = other, "Unknown local embedding model, using bge-small-en-v1.5");
            EmbeddingModel::BGESmallENV15
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_embeddings_config(base_url: String) -> EmbeddingsConfig {
        EmbeddingsConfig {
            model: "openai/text-embedding-3-small".to_string(),
            dimensions: 3,
            batch_size: 8,
            api_key: Some("key".to_string()),
            base_url: Some(base_url),
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn test_resolve_embedding_model() {
        assert!(matches!(
            resolve_embedding_model("BAAI/bge-base-en-v1.5"),
            EmbeddingModel::BGEBaseENV15
        ));
        assert!(matches!(
            resolve_embedding_model("mystery-model"),
            EmbeddingModel::BGESmallENV15
        ));
    }

    #[tokio::test]
    async fn test_api_backend_sends_unprefixed_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({
                "model": "text-embedding-3-small",
                "input": ["Louvre Museum"]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"embedding": [1.0, 0.0, 0.0]}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = EmbeddingProvider::new(&api_embeddings_config(server.uri())).unwrap();
        let vector = provider.embed_query("Louvre Museum").await.unwrap();

        assert_eq!(vector, vec![1.0, 0.0, 0.0]);
        assert_eq!(provider.dimensions(), 3);
    }
}
