//! Fan-out/fan-in generation of a turn's content parts.
//!
//! Each part runs as its own task. A part first consults the content cache:
//! a hit is replayed as paced chunk events, a miss streams live from the
//! provider and is cached once the provider stream finishes cleanly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{ContentCache, Fingerprint};
use crate::config::ChatConfig;
use crate::error::{Result, WayfarerError};
use crate::llm::prompts::{self, PromptContext};
use crate::llm::TextGenerator;
use crate::models::{Domain, StreamEvent};
use crate::services::delivery::EventSink;

pub const PART_CITY_DATA: &str = "city_data";
pub const PART_GENERAL_POIS: &str = "general_pois";
pub const PART_ITINERARY: &str = "itinerary";
pub const PART_HOTELS: &str = "hotels";
pub const PART_RESTAURANTS: &str = "restaurants";
pub const PART_ACTIVITIES: &str = "activities";
pub const PART_POI_DETAIL: &str = "poi_detail";

/// Full text of every part that completed, keyed by part name.
pub type PartTexts = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct ContentPart {
    pub name: &'static str,
    pub prompt: String,
}

/// Three parts for itinerary and general turns, one for the rest.
pub fn parts_for(domain: Domain, ctx: &PromptContext<'_>) -> Vec<ContentPart> {
    let part = |name: &'static str, prompt: String| ContentPart { name, prompt };
    match domain {
        Domain::Itinerary | Domain::General => vec![
            part(PART_CITY_DATA, prompts::city_data_prompt(ctx)),
            part(PART_GENERAL_POIS, prompts::general_pois_prompt(ctx)),
            part(PART_ITINERARY, prompts::itinerary_prompt(ctx)),
        ],
        Domain::Accommodation => vec![part(PART_HOTELS, prompts::hotels_prompt(ctx))],
        Domain::Dining => vec![part(PART_RESTAURANTS, prompts::restaurants_prompt(ctx))],
        Domain::Activities => vec![part(PART_ACTIVITIES, prompts::activities_prompt(ctx))],
    }
}

/// Scoping parameters of one turn; everything but the part name of a cache
/// fingerprint.
#[derive(Debug, Clone)]
pub struct TurnScope {
    pub user_id: String,
    pub profile_id: Option<String>,
    pub city: String,
    pub message: String,
    pub domain: Domain,
    pub preferences: Vec<String>,
}

impl TurnScope {
    pub fn cache_key(&self, part: &str) -> String {
        Fingerprint {
            user_id: &self.user_id,
            profile_id: self.profile_id.as_deref(),
            city: &self.city,
            message: &self.message,
            domain: self.domain,
            preferences: &self.preferences,
            part,
        }
        .key()
    }
}

#[derive(Clone)]
pub struct GenerationOrchestrator {
    generator: Arc<dyn TextGenerator>,
    cache: ContentCache,
    cache_ttl: Duration,
    replay_chunk_size: usize,
    replay_delay: Duration,
}

impl GenerationOrchestrator {
    pub fn new(generator: Arc<dyn TextGenerator>, cache: ContentCache, config: &ChatConfig) -> Self {
        Self {
            generator,
            cache,
            cache_ttl: Duration::from_secs(config.content_cache_ttl_secs),
            replay_chunk_size: config.replay_chunk_size.max(1),
            replay_delay: Duration::from_millis(config.replay_chunk_delay_ms),
        }
    }

    /// Number of part texts currently held by the content cache.
    pub fn cached_parts(&self) -> usize {
        self.cache.len()
    }

    /// Runs every part concurrently and joins them.
    ///
    /// A part whose provider stream cannot be opened aborts the whole turn. A
    /// part that fails mid-stream is dropped. The turn fails if no part
    /// produced any text.
    pub async fn run(
        &self,
        scope: &TurnScope,
        parts: Vec<ContentPart>,
        sink: &EventSink,
    ) -> Result<PartTexts> {
        let mut workers = JoinSet::new();
        for part in parts {
            let worker = self.clone();
            let sink = sink.clone();
            let key = scope.cache_key(part.name);
            workers.spawn(async move {
                let text = worker.stream_part(&key, part.name, &part.prompt, &sink).await;
                (part.name, text)
            });
        }

        let mut texts = PartTexts::new();
        while let Some(joined) = workers.join_next().await {
            let (name, outcome) = joined
                .map_err(|e| WayfarerError::Internal(format!("generation worker panicked: {e}")))?;
            match outcome {
                Ok(Some(text)) => {
                    texts.insert(name.to_string(), text);
                }
                Ok(None) => debug!(part = name, "Part produced no text"),
                Err(e) => {
                    workers.abort_all();
                    return Err(e);
                }
            }
        }

        if texts.is_empty() {
            return Err(WayfarerError::Generation(
                "no content part produced any text".to_string(),
            ));
        }

        info!(
            city = %scope.city,
            domain = %scope.domain,
            parts = texts.len(),
            "Generation joined"
        );
        Ok(texts)
    }

    /// Streams one part as chunk events and returns its full text.
    ///
    /// `Err` means the provider stream could not be opened. `Ok(None)` means
    /// the part was abandoned mid-stream, by a provider error or by
    /// cancellation; nothing is cached in that case.
    pub async fn stream_part(
        &self,
        key: &str,
        part: &str,
        prompt: &str,
        sink: &EventSink,
    ) -> Result<Option<String>> {
        if let Some(cached) = self.cache.get(key) {
            debug!(part, "Content cache hit");
            self.replay(part, &cached, sink).await;
            return Ok(Some(cached));
        }

        let mut stream = self.generator.generate_stream(prompt).await?;
        let mut text = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(part, error = %e, "Generation failed mid-stream, dropping part");
                    return Ok(None);
                }
            };
            if chunk.is_empty() {
                continue;
            }
            text.push_str(&chunk);
            sink.send(StreamEvent::chunk(part, &chunk)).await;

            if sink.is_cancelled() {
                debug!(part, "Turn cancelled, abandoning part");
                return Ok(None);
            }
        }

        if text.is_empty() {
            return Ok(None);
        }

        self.cache.set(key.to_string(), &text, self.cache_ttl);
        Ok(Some(text))
    }

    async fn replay(&self, part: &str, text: &str, sink: &EventSink) {
        let chars: Vec<char> = text.chars().collect();
        let mut pieces = chars.chunks(self.replay_chunk_size).peekable();

        while let Some(piece) = pieces.next() {
            let piece: String = piece.iter().collect();
            sink.send(StreamEvent::chunk(part, &piece)).await;
            if sink.is_cancelled() {
                return;
            }
            if pieces.peek().is_some() && !self.replay_delay.is_zero() {
                tokio::time::sleep(self.replay_delay).await;
            }
        }
    }
}
