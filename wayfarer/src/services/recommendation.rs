use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::DatabaseBackend;
use crate::embeddings::Embedder;
use crate::error::{Result, WayfarerError};
use crate::intelligence::geo::haversine_km;
use crate::models::{Location, PointOfInterest, StoredPoi};

/// How many stored POIs of a city are scored when a location is known.
const HYBRID_CANDIDATE_POOL: usize = 200;

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Ranks a city's stored POIs against a free-text query, optionally blending
/// in proximity to the traveler.
#[derive(Clone)]
pub struct RecommendationEngine {
    db: Arc<dyn DatabaseBackend>,
    embedder: Arc<dyn Embedder>,
    limit: usize,
}

impl RecommendationEngine {
    pub fn new(db: Arc<dyn DatabaseBackend>, embedder: Arc<dyn Embedder>, limit: usize) -> Self {
        Self {
            db,
            embedder,
            limit: limit.max(1),
        }
    }

    /// With a location the score is
    /// `(1 - w) * normalized_inverse_distance + w * cosine`, where the inverse
    /// distance `1 / (1 + km)` is normalized by the best candidate. Without one,
    /// POIs are ranked by cosine similarity alone.
    ///
    /// `semantic_weight` outside `[0, 1]` is rejected before any provider call.
    pub async fn recommend(
        &self,
        query: &str,
        city_id: &str,
        location: Option<Location>,
        semantic_weight: f32,
    ) -> Result<Vec<PointOfInterest>> {
        if !(0.0..=1.0).contains(&semantic_weight) {
            return Err(WayfarerError::Validation(format!(
                "semantic weight must be within [0, 1], got {semantic_weight}"
            )));
        }

        let query_embedding = self.embedder.embed_query(query).await?;

        let Some(location) = location else {
            let hits = self
                .db
                .search_similar_pois(&query_embedding, Some(city_id), self.limit)
                .await?;
            debug!(city_id, hits = hits.len(), "Semantic recommendations");
            return Ok(hits.into_iter().map(|hit| hit.poi).collect());
        };

        let candidates = self.db.get_city_pois(city_id, HYBRID_CANDIDATE_POOL).await?;
        let ranked = rank_hybrid(candidates, &query_embedding, location, semantic_weight, self.limit);

        let missing: Vec<PointOfInterest> = ranked
            .iter()
            .filter(|(_, has_embedding)| !has_embedding)
            .map(|(poi, _)| poi.clone())
            .collect();
        if !missing.is_empty() {
            self.backfill_embeddings(missing);
        }

        debug!(city_id, results = ranked.len(), "Hybrid recommendations");
        Ok(ranked.into_iter().map(|(poi, _)| poi).collect())
    }

    fn backfill_embeddings(&self, pois: Vec<PointOfInterest>) {
        let db = self.db.clone();
        let embedder = self.embedder.clone();

        tokio::spawn(async move {
            for poi in pois {
                let Some(poi_id) = poi.id.as_deref() else {
                    continue;
                };
                let embedding = match embedder.embed_passage(&poi.embedding_text()).await {
                    Ok(embedding) => embedding,
                    Err(error) => {
                        warn!(poi_id, error = %error, "Failed to embed POI for backfill");
                        continue;
                    }
                };
                if let Err(error) = db.update_poi_embedding(poi_id, &embedding).await {
                    warn!(poi_id, error = %error, "Failed to store backfilled POI embedding");
                }
            }
        });
    }
}

/// Returns the top `limit` candidates with their distance set, each paired
/// with whether it already had an embedding.
fn rank_hybrid(
    candidates: Vec<StoredPoi>,
    query_embedding: &[f32],
    location: Location,
    semantic_weight: f32,
    limit: usize,
) -> Vec<(PointOfInterest, bool)> {
    let scored: Vec<(StoredPoi, f64, f32)> = candidates
        .into_iter()
        .map(|stored| {
            let distance_km = haversine_km(location, stored.poi.location());
            let similarity = stored
                .embedding
                .as_deref()
                .map(|embedding| cosine_similarity(query_embedding, embedding))
                .unwrap_or(0.0);
            (stored, distance_km, similarity)
        })
        .collect();

    let best_inverse = scored
        .iter()
        .map(|(_, distance_km, _)| 1.0 / (1.0 + distance_km))
        .fold(0.0_f64, f64::max);

    let w = f64::from(semantic_weight);
    let mut ranked: Vec<(f64, PointOfInterest, bool)> = scored
        .into_iter()
        .map(|(stored, distance_km, similarity)| {
            let proximity = if best_inverse > 0.0 {
                (1.0 / (1.0 + distance_km)) / best_inverse
            } else {
                0.0
            };
            let score = (1.0 - w) * proximity + w * f64::from(similarity);
            let mut poi = stored.poi;
            poi.distance = Some(distance_km);
            (score, poi, stored.embedding.is_some())
        })
        .collect();

    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, poi, has_embedding)| (poi, has_embedding))
        .collect()
}
