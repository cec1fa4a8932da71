//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use wayfarer::config::ChatConfig;
use wayfarer::db::{CityStore, DatabaseBackend, PoiStore, SessionStore};
use wayfarer::embeddings::Embedder;
use wayfarer::error::{Result, WayfarerError};
use wayfarer::intelligence::geo::haversine_km;
use wayfarer::intelligence::{HeuristicIntentClassifier, IntentClassifier};
use wayfarer::llm::{TextGenerator, TextStream};
use wayfarer::models::{
    ChatSession, City, CityData, ConversationMessage, Domain, EventType, GeneratedItinerary,
    Interaction, Intent, Location, PoiDistance, PoiIdBackfill, PoiSearchHit, PointOfInterest, StoredPoi,
    StreamEvent,
};
use wayfarer::services::{ChatService, DeadLetter, DeadLetterQueue};

// ---------------------------------------------------------------------------
// In-memory storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBackend {
    pub cities: Mutex<Vec<City>>,
    pub pois: Mutex<Vec<StoredPoi>>,
    pub sessions: Mutex<HashMap<String, ChatSession>>,
    pub interactions: Mutex<Vec<Interaction>>,
    pub fail_add_message: AtomicBool,
    /// Delays every POI upsert, holding a start turn's persistence open.
    pub upsert_delay_ms: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_city(&self, name: &str, country: &str) -> City {
        let city = City {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            country: country.to_string(),
            state_province: String::new(),
            description: String::new(),
            center_latitude: 0.0,
            center_longitude: 0.0,
        };
        self.cities.lock().unwrap().push(city.clone());
        city
    }

    pub fn seed_poi(&self, poi: PointOfInterest, city_id: &str, embedding: Option<Vec<f32>>) -> String {
        let id = Uuid::new_v4().to_string();
        let mut poi = poi;
        poi.id = Some(id.clone());
        poi.city_id = Some(city_id.to_string());
        self.pois.lock().unwrap().push(StoredPoi { poi, embedding });
        id
    }

    pub fn insert_session(&self, session: ChatSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    pub fn session(&self, id: &str) -> Option<ChatSession> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    pub fn interaction_count(&self) -> usize {
        self.interactions.lock().unwrap().len()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl CityStore for MemoryBackend {
    async fn find_city_by_name(&self, name: &str, country: Option<&str>) -> Result<Option<City>> {
        let cities = self.cities.lock().unwrap();
        Ok(cities
            .iter()
            .find(|c| {
                c.name.eq_ignore_ascii_case(name.trim())
                    && country.map_or(true, |country| c.country.eq_ignore_ascii_case(country))
            })
            .cloned())
    }

    async fn find_city_fuzzy(&self, name: &str) -> Result<Option<City>> {
        let needle = name.trim().to_lowercase();
        let cities = self.cities.lock().unwrap();
        Ok(cities
            .iter()
            .filter(|c| {
                let candidate = c.name.to_lowercase();
                candidate.contains(&needle) || needle.contains(&candidate)
            })
            .min_by_key(|c| c.name.len().abs_diff(needle.len()))
            .cloned())
    }

    async fn upsert_city(&self, data: &CityData) -> Result<City> {
        let mut cities = self.cities.lock().unwrap();
        if let Some(existing) = cities.iter_mut().find(|c| {
            c.name.eq_ignore_ascii_case(&data.name) && c.country.eq_ignore_ascii_case(&data.country)
        }) {
            existing.description = data.description.clone();
            return Ok(existing.clone());
        }
        let city = City {
            id: Uuid::new_v4().to_string(),
            name: data.name.clone(),
            country: data.country.clone(),
            state_province: data.state_province.clone(),
            description: data.description.clone(),
            center_latitude: data.center_latitude,
            center_longitude: data.center_longitude,
        };
        cities.push(city.clone());
        Ok(city)
    }
}

#[async_trait]
impl PoiStore for MemoryBackend {
    async fn upsert_poi(
        &self,
        poi: &PointOfInterest,
        city_id: &str,
        source_interaction_id: Option<&str>,
    ) -> Result<String> {
        let delay = self.upsert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let mut pois = self.pois.lock().unwrap();
        if let Some(existing) = pois.iter_mut().find(|stored| {
            stored.poi.city_id.as_deref() == Some(city_id)
                && stored.poi.has_name(&poi.name)
                && haversine_km(stored.poi.location(), poi.location()) <= 0.2
        }) {
            existing.poi.description = poi.description.clone();
            existing.poi.category = poi.category.clone();
            if let Some(source) = source_interaction_id {
                existing.poi.source_interaction_id = Some(source.to_string());
            }
            return Ok(existing.poi.id.clone().unwrap_or_default());
        }

        let id = Uuid::new_v4().to_string();
        let mut stored = poi.clone();
        stored.id = Some(id.clone());
        stored.city_id = Some(city_id.to_string());
        stored.source_interaction_id = source_interaction_id.map(str::to_string);
        pois.push(StoredPoi {
            poi: stored,
            embedding: None,
        });
        Ok(id)
    }

    async fn get_city_pois(&self, city_id: &str, limit: usize) -> Result<Vec<StoredPoi>> {
        let pois = self.pois.lock().unwrap();
        Ok(pois
            .iter()
            .filter(|stored| stored.poi.city_id.as_deref() == Some(city_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn search_similar_pois(
        &self,
        embedding: &[f32],
        city_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PoiSearchHit>> {
        let pois = self.pois.lock().unwrap();
        let mut hits: Vec<PoiSearchHit> = pois
            .iter()
            .filter(|stored| city_id.map_or(true, |id| stored.poi.city_id.as_deref() == Some(id)))
            .filter_map(|stored| {
                let candidate = stored.embedding.as_ref()?;
                Some(PoiSearchHit {
                    poi: stored.poi.clone(),
                    similarity: cosine(embedding, candidate),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn update_poi_embedding(&self, poi_id: &str, embedding: &[f32]) -> Result<()> {
        let mut pois = self.pois.lock().unwrap();
        if let Some(stored) = pois
            .iter_mut()
            .find(|stored| stored.poi.id.as_deref() == Some(poi_id))
        {
            stored.embedding = Some(embedding.to_vec());
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryBackend {
    async fn create_session(&self, session: &ChatSession) -> Result<()> {
        self.insert_session(session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<ChatSession>> {
        Ok(self.session(id))
    }

    async fn update_session(&self, session: &ChatSession) -> Result<()> {
        self.insert_session(session.clone());
        Ok(())
    }

    async fn add_message(&self, session_id: &str, message: &ConversationMessage) -> Result<()> {
        if self.fail_add_message.load(Ordering::SeqCst) {
            return Err(WayfarerError::Internal("message store offline".to_string()));
        }
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| WayfarerError::NotFound(format!("session {session_id}")))?;
        session.push_message(message.clone());
        Ok(())
    }

    async fn backfill_poi_ids(&self, session_id: &str, backfill: &PoiIdBackfill) -> Result<usize> {
        let mut sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .get_mut(session_id)
            .and_then(|session| session.current_itinerary.as_mut())
            .map(|itinerary| itinerary.fill_poi_ids(backfill))
            .unwrap_or(0))
    }

    async fn save_interaction(&self, interaction: &Interaction) -> Result<String> {
        self.interactions.lock().unwrap().push(interaction.clone());
        Ok(interaction.id.clone())
    }

    async fn sort_pois_by_distance(
        &self,
        ids: &[String],
        location: Location,
    ) -> Result<Vec<PoiDistance>> {
        let pois = self.pois.lock().unwrap();
        let mut sorted: Vec<PoiDistance> = ids
            .iter()
            .filter_map(|id| {
                let stored = pois.iter().find(|s| s.poi.id.as_deref() == Some(id))?;
                Some(PoiDistance {
                    id: id.clone(),
                    distance_km: haversine_km(location, stored.poi.location()),
                })
            })
            .collect();
        sorted.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        Ok(sorted)
    }
}

#[async_trait]
impl DatabaseBackend for MemoryBackend {
    async fn sync(&self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Answers prompts from a list of `(needle, response)` rules; the first rule
/// whose needle occurs in the prompt wins.
pub struct ScriptedGenerator {
    rules: Vec<(String, String)>,
    fallback: Option<String>,
    chunk_chars: usize,
    fail_open: bool,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: None,
            chunk_chars: 7,
            fail_open: false,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(mut self, needle: &str, response: &str) -> Self {
        self.rules.push((needle.to_string(), response.to_string()));
        self
    }

    pub fn fallback(mut self, response: &str) -> Self {
        self.fallback = Some(response.to_string());
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_stream(&self, prompt: &str) -> Result<TextStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_open {
            return Err(WayfarerError::LlmUnavailable("scripted outage".to_string()));
        }

        let response = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .or_else(|| self.fallback.clone())
            .unwrap_or_default();

        let chars: Vec<char> = response.chars().collect();
        let chunks: Vec<Result<String>> = chars
            .chunks(self.chunk_chars)
            .map(|c| Ok(c.iter().collect::<String>()))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// Bag-of-words embedder: every word adds weight to one of eight buckets.
#[derive(Default)]
pub struct WordEmbedder {
    pub calls: AtomicUsize,
}

impl WordEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 8];
        for word in text.to_lowercase().split_whitespace() {
            let bucket = word.bytes().map(usize::from).sum::<usize>() % v.len();
            v[bucket] += 1.0;
        }
        v
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for WordEmbedder {
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(query))
    }

    async fn embed_passage(&self, passage: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(passage))
    }

    fn dimensions(&self) -> usize {
        8
    }
}

pub struct FailingClassifier;

#[async_trait]
impl IntentClassifier for FailingClassifier {
    async fn classify(&self, _message: &str) -> Result<Intent> {
        Err(WayfarerError::Classifier("classifier offline".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub const CITY_JSON: &str =
    r#"{"city": "Paris", "country": "France", "center_latitude": 48.8566, "center_longitude": 2.3522}"#;
pub const GENERAL_POIS_JSON: &str =
    r#"{"points_of_interest": [{"name": "Louvre", "latitude": 48.8606, "longitude": 2.3376}]}"#;
pub const ITINERARY_JSON: &str = r#"Here is your plan: {"itinerary_name": "Paris highlights", "overall_description": "Two days", "points_of_interest": [{"name": "Eiffel Tower", "latitude": 48.8584, "longitude": 2.2945, "category": "Landmark"}, {"name": "Musée d'Orsay", "latitude": 48.86, "longitude": 2.3266, "category": "Museum"}]}"#;

/// A generator answering every start-turn part for Paris.
pub fn paris_generator() -> ScriptedGenerator {
    ScriptedGenerator::new()
        .respond("Describe the city of", CITY_JSON)
        .respond("List the most notable", GENERAL_POIS_JSON)
        .respond("Create a personalized itinerary", ITINERARY_JSON)
        .respond(
            "Recommend restaurants",
            r#"{"points_of_interest": [{"name": "Le Comptoir", "category": "Bistro"}]}"#,
        )
}

pub fn test_chat_config() -> ChatConfig {
    ChatConfig {
        replay_chunk_size: 5,
        replay_chunk_delay_ms: 0,
        send_timeout_ms: 200,
        send_max_attempts: 2,
        ..ChatConfig::default()
    }
}

pub struct Harness {
    pub service: ChatService,
    pub db: Arc<MemoryBackend>,
    pub generator: Arc<ScriptedGenerator>,
    pub embedder: Arc<WordEmbedder>,
    pub dead_letters: mpsc::Receiver<DeadLetter>,
}

impl Harness {
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self::with_classifier(generator, Arc::new(HeuristicIntentClassifier::new()))
    }

    pub fn with_classifier(
        generator: ScriptedGenerator,
        classifier: Arc<dyn IntentClassifier>,
    ) -> Self {
        Self::build(generator, classifier, test_chat_config())
    }

    pub fn build(
        generator: ScriptedGenerator,
        classifier: Arc<dyn IntentClassifier>,
        config: ChatConfig,
    ) -> Self {
        let db = MemoryBackend::new();
        let generator = Arc::new(generator);
        let embedder = WordEmbedder::new();
        let (queue, dead_letters) = DeadLetterQueue::new(config.dead_letter_capacity);

        let service = ChatService::new(
            db.clone(),
            generator.clone(),
            embedder.clone(),
            classifier,
            queue,
            config,
        );

        Self {
            service,
            db,
            generator,
            embedder,
            dead_letters,
        }
    }

    /// Stores an active Paris session whose itinerary holds `names`.
    pub fn seed_session(&self, names: &[&str]) -> String {
        let city = self.db.seed_city("Paris", "France");
        let mut session = ChatSession::new(
            "user-1",
            None,
            city.name.as_str(),
            chrono::Duration::hours(1),
        );

        let mut itinerary = GeneratedItinerary::empty(&session.id, Domain::Itinerary);
        itinerary.city = Some(CityData {
            name: city.name.clone(),
            country: city.country.clone(),
            ..Default::default()
        });
        itinerary.points_of_interest = names
            .iter()
            .enumerate()
            .map(|(i, name)| PointOfInterest {
                latitude: 48.85 + i as f64 * 0.01,
                longitude: 2.35,
                category: "Sight".to_string(),
                ..PointOfInterest::named(*name)
            })
            .collect();
        session.current_itinerary = Some(itinerary);

        let id = session.id.clone();
        self.db.insert_session(session);
        id
    }
}

/// Reads a turn's events until the channel closes.
pub async fn collect(mut events: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.recv().await {
        out.push(event);
    }
    out
}

pub fn terminal_count(events: &[StreamEvent]) -> usize {
    events.iter().filter(|e| e.event_type.is_terminal()).count()
}

pub fn event_types(events: &[StreamEvent]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type).collect()
}

/// Concatenated chunk text per part.
pub fn chunk_texts(events: &[StreamEvent]) -> HashMap<String, String> {
    let mut texts: HashMap<String, String> = HashMap::new();
    for event in events {
        if let (Some(part), Some(text)) = (event.chunk_part(), event.chunk_text()) {
            texts.entry(part.to_string()).or_default().push_str(text);
        }
    }
    texts
}

/// Polls `check` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
