use chrono::Utc;
use libsql::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::intelligence::geo::haversine_km;
use crate::models::{Location, PoiDistance, PoiSearchHit, PointOfInterest, StoredPoi};

/// Same-name rows closer than this are the same place.
const SAME_PLACE_RADIUS_KM: f64 = 0.2;

const POI_COLUMNS: &str =
    "p.id, p.name, p.latitude, p.longitude, p.category, p.description, p.city_id, p.source_interaction_id";

pub struct PoiRepository;

impl PoiRepository {
    pub async fn upsert(
        conn: &Connection,
        poi: &PointOfInterest,
        city_id: &str,
        source_interaction_id: Option<&str>,
    ) -> Result<String> {
        let now = Utc::now().to_rfc3339();

        if let Some(existing_id) = Self::find_same_place(conn, poi, city_id).await? {
            conn.execute(
                r#"
                UPDATE pois SET
                    category = CASE WHEN ?2 = '' THEN category ELSE ?2 END,
                    description = CASE WHEN ?3 = '' THEN description ELSE ?3 END,
                    source_interaction_id = COALESCE(?4, source_interaction_id),
                    updated_at = ?5
                WHERE id = ?1
                "#,
                params![
                    existing_id.clone(),
                    poi.category.clone(),
                    poi.description.clone(),
                    source_interaction_id,
                    now,
                ],
            )
            .await?;
            return Ok(existing_id);
        }

        let id = Uuid::new_v4().to_string();
        conn.execute(
            r#"
            INSERT INTO pois (
                id, city_id, name, latitude, longitude, category, description,
                source_interaction_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
            params![
                id.clone(),
                city_id,
                poi.name.trim(),
                poi.latitude,
                poi.longitude,
                poi.category.clone(),
                poi.description.clone(),
                source_interaction_id,
                now,
            ],
        )
        .await?;

        Ok(id)
    }

    async fn find_same_place(
        conn: &Connection,
        poi: &PointOfInterest,
        city_id: &str,
    ) -> Result<Option<String>> {
        let mut rows = conn
            .query(
                "SELECT id, latitude, longitude FROM pois \
                 WHERE city_id = ?1 AND lower(name) = lower(?2)",
                params![city_id, poi.name.trim()],
            )
            .await?;

        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let stored = Location::new(row.get(1)?, row.get(2)?);
            if haversine_km(stored, poi.location()) <= SAME_PLACE_RADIUS_KM {
                return Ok(Some(id));
            }
        }

        Ok(None)
    }

    pub async fn get_by_city(conn: &Connection, city_id: &str, limit: usize) -> Result<Vec<StoredPoi>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {POI_COLUMNS}, \
                            CASE WHEN p.embedding IS NULL THEN NULL ELSE vector_extract(p.embedding) END \
                     FROM pois p WHERE p.city_id = ?1 \
                     ORDER BY p.created_at ASC LIMIT ?2"
                ),
                params![city_id, limit as i64],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            let poi = Self::row_to_poi(&row)?;
            let embedding = row
                .get::<Option<String>>(8)?
                .and_then(|raw| serde_json::from_str::<Vec<f32>>(&raw).ok());
            results.push(StoredPoi { poi, embedding });
        }
        Ok(results)
    }

    pub async fn search_similar(
        conn: &Connection,
        embedding: &[f32],
        city_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PoiSearchHit>> {
        let embedding_json = serde_json::to_string(embedding)?;

        let city_filter = if city_id.is_some() {
            "AND p.city_id = ?3"
        } else {
            ""
        };
        let query = format!(
            r#"
            SELECT {POI_COLUMNS},
                   1 - vector_distance_cos(p.embedding, vector32(?1)) as score
            FROM pois p
            WHERE p.embedding IS NOT NULL
              {city_filter}
            ORDER BY score DESC
            LIMIT ?2
            "#
        );

        let mut rows = match city_id {
            Some(city_id) => {
                conn.query(&query, params![embedding_json, limit as i64, city_id])
                    .await?
            }
            None => conn.query(&query, params![embedding_json, limit as i64]).await?,
        };

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            let poi = Self::row_to_poi(&row)?;
            let similarity = row.get::<f64>(8)? as f32;
            results.push(PoiSearchHit { poi, similarity });
        }
        Ok(results)
    }

    pub async fn update_embedding(conn: &Connection, poi_id: &str, embedding: &[f32]) -> Result<()> {
        let embedding_json = serde_json::to_string(embedding)?;

        conn.execute(
            "UPDATE pois SET embedding = vector32(?2) WHERE id = ?1",
            params![poi_id, embedding_json],
        )
        .await?;

        Ok(())
    }

    pub async fn sort_by_distance(
        conn: &Connection,
        ids: &[String],
        location: Location,
    ) -> Result<Vec<PoiDistance>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT id, latitude, longitude FROM pois WHERE id IN ({placeholders})");
        let params: Vec<libsql::Value> =
            ids.iter().map(|id| libsql::Value::from(id.clone())).collect();

        let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let stored = Location::new(row.get(1)?, row.get(2)?);
            results.push(PoiDistance {
                id,
                distance_km: haversine_km(location, stored),
            });
        }

        results.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        Ok(results)
    }

    fn row_to_poi(row: &libsql::Row) -> Result<PointOfInterest> {
        Ok(PointOfInterest {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            category: row.get(4)?,
            description: row.get(5)?,
            distance: None,
            city_id: Some(row.get(6)?),
            source_interaction_id: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::CityRepository;
    use crate::db::schema::init_schema;
    use crate::models::CityData;

    async fn setup_test_db() -> (Connection, String) {
        let conn = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap()
            .connect()
            .unwrap();
        init_schema(&conn, 3).await.unwrap();
        let city = CityRepository::upsert(
            &conn,
            &CityData {
                name: "Porto".to_string(),
                country: "Portugal".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        (conn, city.id)
    }

    fn poi(name: &str, lat: f64, lon: f64) -> PointOfInterest {
        PointOfInterest {
            latitude: lat,
            longitude: lon,
            category: "Landmark".to_string(),
            ..PointOfInterest::named(name)
        }
    }

    #[tokio::test]
    async fn test_upsert_matches_same_place() {
        let (conn, city_id) = setup_test_db().await;

        let first = PoiRepository::upsert(&conn, &poi("Torre dos Clérigos", 41.1457, -8.6146), &city_id, None)
            .await
            .unwrap();
        // ~50 m away, different casing
        let second = PoiRepository::upsert(&conn, &poi("torre dos clérigos", 41.1461, -8.6144), &city_id, Some("int-1"))
            .await
            .unwrap();
        // same name, other side of town
        let third = PoiRepository::upsert(&conn, &poi("Torre dos Clérigos", 41.1800, -8.6000), &city_id, None)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn test_embedding_round_trip_and_search() {
        let (conn, city_id) = setup_test_db().await;

        let a = PoiRepository::upsert(&conn, &poi("Livraria Lello", 41.1469, -8.6149), &city_id, None)
            .await
            .unwrap();
        let b = PoiRepository::upsert(&conn, &poi("Estádio do Dragão", 41.1617, -8.5836), &city_id, None)
            .await
            .unwrap();
        PoiRepository::update_embedding(&conn, &a, &[1.0, 0.0, 0.0]).await.unwrap();
        PoiRepository::update_embedding(&conn, &b, &[0.0, 1.0, 0.0]).await.unwrap();

        let hits = PoiRepository::search_similar(&conn, &[0.9, 0.1, 0.0], Some(&city_id), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].poi.name, "Livraria Lello");
        assert!(hits[0].similarity > hits[1].similarity);

        let stored = PoiRepository::get_by_city(&conn, &city_id, 10).await.unwrap();
        let lello = stored.iter().find(|s| s.poi.id.as_deref() == Some(a.as_str())).unwrap();
        assert_eq!(lello.embedding.as_deref(), Some(&[1.0f32, 0.0, 0.0][..]));
    }

    #[tokio::test]
    async fn test_sort_by_distance() {
        let (conn, city_id) = setup_test_db().await;

        let far = PoiRepository::upsert(&conn, &poi("Far", 41.20, -8.60), &city_id, None)
            .await
            .unwrap();
        let near = PoiRepository::upsert(&conn, &poi("Near", 41.15, -8.61), &city_id, None)
            .await
            .unwrap();

        let sorted = PoiRepository::sort_by_distance(
            &conn,
            &[far.clone(), near.clone(), "missing".to_string()],
            Location::new(41.1496, -8.6109),
        )
        .await
        .unwrap();

        let ids: Vec<_> = sorted.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![near.as_str(), far.as_str()]);
    }
}
