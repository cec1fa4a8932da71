mod api;
mod provider;

use async_trait::async_trait;

use crate::error::Result;

pub use api::{ApiConfig, EmbeddingApiClient};
pub use provider::EmbeddingProvider;

/// Text-embedding provider. Queries and stored passages may be embedded
/// differently, so callers pick the side explicitly.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>>;

    async fn embed_passage(&self, passage: &str) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;
}
