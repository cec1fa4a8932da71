//! Turning joined part texts into a snapshot, and persisting it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::DatabaseBackend;
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::intelligence::json_extract::parse_json_object;
use crate::models::{
    CityData, Domain, GeneratedItinerary, Interaction, PoiIdBackfill, PointOfInterest,
};
use crate::services::generation::{
    PartTexts, PART_ACTIVITIES, PART_CITY_DATA, PART_GENERAL_POIS, PART_HOTELS, PART_ITINERARY,
    PART_RESTAURANTS,
};

#[derive(Debug, Deserialize)]
struct PoiListPart {
    #[serde(default, alias = "pois")]
    points_of_interest: Vec<PointOfInterest>,
}

#[derive(Debug, Deserialize)]
struct ItineraryPart {
    #[serde(default)]
    itinerary_name: Option<String>,
    #[serde(default)]
    overall_description: Option<String>,
    #[serde(
        default,
        alias = "pois",
        alias = "hotels",
        alias = "restaurants",
        alias = "activities"
    )]
    points_of_interest: Vec<PointOfInterest>,
}

fn named_only(pois: Vec<PointOfInterest>) -> Vec<PointOfInterest> {
    pois.into_iter()
        .filter(|poi| !poi.name.trim().is_empty())
        .collect()
}

/// Builds the snapshot of a start turn. Parts that cannot be salvaged are
/// dropped without affecting the others.
pub fn assemble_snapshot(
    session_id: &str,
    domain: Domain,
    city_name: &str,
    texts: &PartTexts,
) -> GeneratedItinerary {
    let mut snapshot = GeneratedItinerary::empty(session_id, domain);

    for (part, text) in texts {
        match part.as_str() {
            PART_CITY_DATA => match parse_json_object::<CityData>(text) {
                Some(mut city) => {
                    if city.name.trim().is_empty() {
                        city.name = city_name.to_string();
                    }
                    snapshot.city = Some(city);
                }
                None => warn!(part = %part, "Dropping unparseable part"),
            },
            PART_GENERAL_POIS => match parse_json_object::<PoiListPart>(text) {
                Some(list) => snapshot.general_pois = named_only(list.points_of_interest),
                None => warn!(part = %part, "Dropping unparseable part"),
            },
            PART_ITINERARY | PART_HOTELS | PART_RESTAURANTS | PART_ACTIVITIES => {
                match parse_json_object::<ItineraryPart>(text) {
                    Some(itinerary) => {
                        snapshot.itinerary_name = itinerary.itinerary_name;
                        snapshot.overall_description = itinerary.overall_description;
                        snapshot.points_of_interest = named_only(itinerary.points_of_interest);
                    }
                    None => warn!(part = %part, "Dropping unparseable part"),
                }
            }
            other => debug!(part = other, "Ignoring unknown part"),
        }
    }

    snapshot
}

/// Salvages a single generated POI. Falls back to `requested`, borrowing the
/// replaced entry's coordinates and category when there is one.
pub fn single_poi_from(
    text: Option<&str>,
    requested: &str,
    replacing: Option<&PointOfInterest>,
) -> PointOfInterest {
    let mut poi = text
        .and_then(parse_json_object::<PointOfInterest>)
        .unwrap_or_else(|| {
            debug!(requested, "Using requested name for single POI");
            PointOfInterest::named(requested)
        });

    if poi.name.trim().is_empty() {
        poi.name = requested.to_string();
    }
    poi.id = None;
    poi.distance = None;

    if let Some(old) = replacing {
        if poi.latitude == 0.0 && poi.longitude == 0.0 {
            poi.latitude = old.latitude;
            poi.longitude = old.longitude;
        }
        if poi.category.trim().is_empty() {
            poi.category = old.category.clone();
        }
    }

    poi
}

/// Everything the persistence pass of one start turn needs.
#[derive(Debug, Clone)]
pub struct PersistJob {
    pub session_id: String,
    pub user_id: String,
    pub profile_id: Option<String>,
    pub city_name: String,
    pub domain: Domain,
    pub prompt: String,
    pub texts: PartTexts,
    pub snapshot: GeneratedItinerary,
}

#[derive(Debug, Clone)]
pub struct PersistOutcome {
    pub city_id: String,
    pub interaction_id: String,
    /// Persisted id per lowercased POI name.
    pub poi_ids: HashMap<String, String>,
}

#[derive(Clone)]
pub struct CompletionPipeline {
    db: Arc<dyn DatabaseBackend>,
    embedder: Arc<dyn Embedder>,
}

impl CompletionPipeline {
    pub fn new(db: Arc<dyn DatabaseBackend>, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }

    /// Runs [`Self::persist`] in the background and logs the outcome.
    pub fn spawn(&self, job: PersistJob) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            match pipeline.persist(&job).await {
                Ok(outcome) => info!(
                    session_id = %job.session_id,
                    city_id = %outcome.city_id,
                    interaction_id = %outcome.interaction_id,
                    pois = outcome.poi_ids.len(),
                    "Turn persisted"
                ),
                Err(error) => warn!(
                    session_id = %job.session_id,
                    error = %error,
                    "Failed to persist turn"
                ),
            }
        })
    }

    /// Upserts the city and every POI, records the interaction and back-fills
    /// the persisted ids into the stored session. Idempotent: POIs are keyed by
    /// name, city and proximity.
    pub async fn persist(&self, job: &PersistJob) -> Result<PersistOutcome> {
        let mut city_data = job.snapshot.city.clone().unwrap_or_else(|| CityData {
            name: job.city_name.clone(),
            ..Default::default()
        });
        if city_data.name.trim().is_empty() {
            city_data.name = job.city_name.clone();
        }
        let city = self.db.upsert_city(&city_data).await?;

        let interaction_id = Uuid::new_v4().to_string();
        let mut poi_ids: HashMap<String, String> = HashMap::new();

        let pois = job
            .snapshot
            .points_of_interest
            .iter()
            .chain(job.snapshot.general_pois.iter());
        for poi in pois {
            let key = poi.name.trim().to_lowercase();
            if poi_ids.contains_key(&key) {
                continue;
            }
            match self
                .db
                .upsert_poi(poi, &city.id, Some(&interaction_id))
                .await
            {
                Ok(id) => {
                    self.embed_poi(&id, poi).await;
                    poi_ids.insert(key, id);
                }
                Err(error) => warn!(poi = %poi.name, error = %error, "Failed to upsert POI"),
            }
        }

        let interaction = Interaction {
            id: interaction_id.clone(),
            session_id: job.session_id.clone(),
            user_id: job.user_id.clone(),
            profile_id: job.profile_id.clone(),
            city_id: Some(city.id.clone()),
            domain: job.domain,
            prompt: job.prompt.clone(),
            response: serde_json::to_string(&job.texts)?,
            poi_ids: poi_ids.values().cloned().collect(),
            created_at: Utc::now(),
        };
        self.db.save_interaction(&interaction).await?;

        let backfill = PoiIdBackfill {
            city_id: city.id,
            interaction_id,
            ids: poi_ids,
        };
        self.backfill_session(&job.session_id, &backfill).await?;

        Ok(PersistOutcome {
            city_id: backfill.city_id,
            interaction_id: backfill.interaction_id,
            poi_ids: backfill.ids,
        })
    }

    /// Gives every POI without an id a persisted identity, or a fresh UUID when
    /// it cannot be stored.
    pub async fn ensure_identities(&self, pois: &mut [PointOfInterest], city_id: &str) {
        for poi in pois.iter_mut().filter(|poi| poi.id.is_none()) {
            let id = self.assign_identity(poi, city_id).await;
            poi.id = Some(id);
        }
    }

    /// Upserts one POI and returns its id, falling back to a fresh UUID.
    pub async fn assign_identity(&self, poi: &mut PointOfInterest, city_id: &str) -> String {
        match self.db.upsert_poi(poi, city_id, None).await {
            Ok(id) => {
                poi.city_id = Some(city_id.to_string());
                self.embed_poi(&id, poi).await;
                id
            }
            Err(error) => {
                let id = Uuid::new_v4().to_string();
                warn!(poi = %poi.name, %id, error = %error, "Failed to persist POI, using transient id");
                id
            }
        }
    }

    async fn embed_poi(&self, poi_id: &str, poi: &PointOfInterest) {
        let embedding = match self.embedder.embed_passage(&poi.embedding_text()).await {
            Ok(embedding) => embedding,
            Err(error) => {
                warn!(poi_id, error = %error, "Failed to embed POI");
                return;
            }
        };
        if let Err(error) = self.db.update_poi_embedding(poi_id, &embedding).await {
            warn!(poi_id, error = %error, "Failed to store POI embedding");
        }
    }

    async fn backfill_session(&self, session_id: &str, backfill: &PoiIdBackfill) -> Result<()> {
        let filled = self.db.backfill_poi_ids(session_id, backfill).await?;
        if filled > 0 {
            debug!(session_id, filled, "Back-filled POI ids into session");
        }
        Ok(())
    }
}
