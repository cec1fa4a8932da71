use async_trait::async_trait;

use crate::db::connection::Database;
use crate::db::repository::{CityRepository, PoiRepository, SessionRepository};
use crate::db::traits::{CityStore, DatabaseBackend, PoiStore, SessionStore};
use crate::error::Result;
use crate::models::{
    ChatSession, City, CityData, ConversationMessage, Interaction, Location, PoiDistance,
    PoiIdBackfill, PoiSearchHit, PointOfInterest, StoredPoi,
};

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CityStore for LibSqlBackend {
    async fn find_city_by_name(&self, name: &str, country: Option<&str>) -> Result<Option<City>> {
        let conn = self.db.connect()?;
        CityRepository::find_by_name(&conn, name, country).await
    }
    async fn find_city_fuzzy(&self, name: &str) -> Result<Option<City>> {
        let conn = self.db.connect()?;
        CityRepository::find_fuzzy(&conn, name).await
    }
    async fn upsert_city(&self, city: &CityData) -> Result<City> {
        let conn = self.db.connect()?;
        CityRepository::upsert(&conn, city).await
    }
}

#[async_trait]
impl PoiStore for LibSqlBackend {
    async fn upsert_poi(
        &self,
        poi: &PointOfInterest,
        city_id: &str,
        source_interaction_id: Option<&str>,
    ) -> Result<String> {
        let conn = self.db.connect()?;
        PoiRepository::upsert(&conn, poi, city_id, source_interaction_id).await
    }
    async fn get_city_pois(&self, city_id: &str, limit: usize) -> Result<Vec<StoredPoi>> {
        let conn = self.db.connect()?;
        PoiRepository::get_by_city(&conn, city_id, limit).await
    }
    async fn search_similar_pois(
        &self,
        embedding: &[f32],
        city_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PoiSearchHit>> {
        let conn = self.db.connect()?;
        PoiRepository::search_similar(&conn, embedding, city_id, limit).await
    }
    async fn update_poi_embedding(&self, poi_id: &str, embedding: &[f32]) -> Result<()> {
        let conn = self.db.connect()?;
        PoiRepository::update_embedding(&conn, poi_id, embedding).await
    }
}

#[async_trait]
impl SessionStore for LibSqlBackend {
    async fn create_session(&self, session: &ChatSession) -> Result<()> {
        let conn = self.db.connect()?;
        SessionRepository::create(&conn, session).await
    }
    async fn get_session(&self, id: &str) -> Result<Option<ChatSession>> {
        let conn = self.db.connect()?;
        SessionRepository::get_by_id(&conn, id).await
    }
    async fn update_session(&self, session: &ChatSession) -> Result<()> {
        let conn = self.db.connect()?;
        SessionRepository::update(&conn, session).await
    }
    async fn add_message(&self, session_id: &str, message: &ConversationMessage) -> Result<()> {
        let conn = self.db.connect()?;
        SessionRepository::add_message(&conn, session_id, message).await
    }
    async fn backfill_poi_ids(&self, session_id: &str, backfill: &PoiIdBackfill) -> Result<usize> {
        let conn = self.db.connect()?;
        SessionRepository::backfill_poi_ids(&conn, session_id, backfill).await
    }
    async fn save_interaction(&self, interaction: &Interaction) -> Result<String> {
        let conn = self.db.connect()?;
        SessionRepository::save_interaction(&conn, interaction).await
    }
    async fn sort_pois_by_distance(
        &self,
        ids: &[String],
        location: Location,
    ) -> Result<Vec<PoiDistance>> {
        let conn = self.db.connect()?;
        PoiRepository::sort_by_distance(&conn, ids, location).await
    }
}

#[async_trait]
impl DatabaseBackend for LibSqlBackend {
    async fn sync(&self) -> Result<()> {
        self.db.sync().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::models::{ChatSession, Domain, GeneratedItinerary, SessionStatus};
    use chrono::Utc;
    use tempfile::TempDir;

    async fn backend() -> (LibSqlBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wayfarer-test.db");
        let config = DatabaseConfig {
            url: format!("file:{}", path.display()),
            auth_token: None,
            local_path: None,
        };
        let db = Database::new(&config, 3).await.unwrap();
        (LibSqlBackend::new(db), dir)
    }

    #[tokio::test]
    async fn test_backend_persists_across_connections() {
        let (backend, _dir) = backend().await;

        let city = backend
            .upsert_city(&CityData {
                name: "Seville".to_string(),
                country: "Spain".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let poi_id = backend
            .upsert_poi(&PointOfInterest::named("Real Alcázar"), &city.id, None)
            .await
            .unwrap();

        let session = ChatSession::new("user-1", None, "Seville", chrono::Duration::hours(1));
        backend.create_session(&session).await.unwrap();

        let interaction = Interaction {
            id: "int-1".to_string(),
            session_id: session.id.clone(),
            user_id: "user-1".to_string(),
            profile_id: None,
            city_id: Some(city.id.clone()),
            domain: Domain::Itinerary,
            prompt: "Plan Seville".to_string(),
            response: "{}".to_string(),
            poi_ids: vec![poi_id.clone()],
            created_at: Utc::now(),
        };
        assert_eq!(backend.save_interaction(&interaction).await.unwrap(), "int-1");

        let mut stored = backend.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Active);

        stored.current_itinerary = Some(GeneratedItinerary::empty(&session.id, Domain::Itinerary));
        backend.update_session(&stored).await.unwrap();
        assert!(backend
            .get_session(&session.id)
            .await
            .unwrap()
            .unwrap()
            .current_itinerary
            .is_some());

        assert!(backend
            .find_city_fuzzy("sevill")
            .await
            .unwrap()
            .is_some());
    }
}
