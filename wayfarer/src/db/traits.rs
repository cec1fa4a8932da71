use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    ChatSession, City, CityData, ConversationMessage, Interaction, Location, PoiDistance,
    PoiIdBackfill, PoiSearchHit, PointOfInterest, StoredPoi,
};

/// Lookup and upsert of cities.
#[async_trait]
pub trait CityStore: Send + Sync {
    /// Case-insensitive exact match on name, and on country when given.
    async fn find_city_by_name(&self, name: &str, country: Option<&str>) -> Result<Option<City>>;
    /// Case-insensitive containment match in either direction. The candidate
    /// closest in length to `name` wins.
    async fn find_city_fuzzy(&self, name: &str) -> Result<Option<City>>;
    async fn upsert_city(&self, city: &CityData) -> Result<City>;
}

/// Persistence and similarity search for points of interest.
#[async_trait]
pub trait PoiStore: Send + Sync {
    /// Inserts `poi` or updates the row with the same name in the same city
    /// within 0.2 km. Returns the persisted id.
    async fn upsert_poi(
        &self,
        poi: &PointOfInterest,
        city_id: &str,
        source_interaction_id: Option<&str>,
    ) -> Result<String>;
    async fn get_city_pois(&self, city_id: &str, limit: usize) -> Result<Vec<StoredPoi>>;
    async fn search_similar_pois(
        &self,
        embedding: &[f32],
        city_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PoiSearchHit>>;
    async fn update_poi_embedding(&self, poi_id: &str, embedding: &[f32]) -> Result<()>;
}

/// Sessions, their messages and interaction records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &ChatSession) -> Result<()>;
    async fn get_session(&self, id: &str) -> Result<Option<ChatSession>>;
    /// Persists status, itinerary and timestamps, and appends any history
    /// entries not yet stored.
    async fn update_session(&self, session: &ChatSession) -> Result<()>;
    async fn add_message(&self, session_id: &str, message: &ConversationMessage) -> Result<()>;
    /// Patches persisted POI ids into the stored itinerary without touching
    /// anything else on the session. Returns the number of entries filled;
    /// `0` when the session or its itinerary is gone.
    async fn backfill_poi_ids(&self, session_id: &str, backfill: &PoiIdBackfill) -> Result<usize>;
    async fn save_interaction(&self, interaction: &Interaction) -> Result<String>;
    /// Stored POIs among `ids`, nearest to `location` first. Unknown ids are
    /// omitted.
    async fn sort_pois_by_distance(
        &self,
        ids: &[String],
        location: Location,
    ) -> Result<Vec<PoiDistance>>;
}

/// Unified storage backend used by the chat services.
#[async_trait]
pub trait DatabaseBackend: CityStore + PoiStore + SessionStore {
    /// Sync with remote (e.g. Turso replication). No-op for local-only backends.
    async fn sync(&self) -> Result<()>;
}
