mod api;
pub mod prompts;
mod provider;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::Result;

pub use api::LlmApiClient;
pub use provider::{LlmBackend, LlmProvider};

/// Incremental text chunks of one generation, in generation order.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Streaming text-generation provider.
///
/// `generate_stream` fails only when the stream cannot be opened; errors that
/// occur after the first chunk surface as `Err` items of the stream.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_stream(&self, prompt: &str) -> Result<TextStream>;

    /// Collects a whole generation into one string.
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut stream = self.generate_stream(prompt).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}
