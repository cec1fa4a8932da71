use chrono::Utc;
use libsql::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{City, CityData};

const CITY_COLUMNS: &str =
    "id, name, country, state_province, description, center_latitude, center_longitude";

pub struct CityRepository;

impl CityRepository {
    pub async fn find_by_name(
        conn: &Connection,
        name: &str,
        country: Option<&str>,
    ) -> Result<Option<City>> {
        let mut rows = match country.filter(|c| !c.trim().is_empty()) {
            Some(country) => {
                conn.query(
                    &format!(
                        "SELECT {CITY_COLUMNS} FROM cities \
                         WHERE lower(name) = lower(?1) AND lower(country) = lower(?2) LIMIT 1"
                    ),
                    params![name.trim(), country.trim()],
                )
                .await?
            }
            None => {
                conn.query(
                    &format!(
                        "SELECT {CITY_COLUMNS} FROM cities WHERE lower(name) = lower(?1) LIMIT 1"
                    ),
                    params![name.trim()],
                )
                .await?
            }
        };

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_city(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_fuzzy(conn: &Connection, name: &str) -> Result<Option<City>> {
        let needle = name.trim();
        if needle.is_empty() {
            return Ok(None);
        }

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CITY_COLUMNS} FROM cities \
                     WHERE lower(name) LIKE '%' || lower(?1) || '%' \
                        OR lower(?1) LIKE '%' || lower(name) || '%' \
                     ORDER BY abs(length(name) - length(?1)) ASC LIMIT 1"
                ),
                params![needle],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_city(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert(conn: &Connection, city: &CityData) -> Result<City> {
        let country = (!city.country.trim().is_empty()).then_some(city.country.as_str());
        let now = Utc::now().to_rfc3339();

        if let Some(existing) = Self::find_by_name(conn, &city.name, country).await? {
            conn.execute(
                r#"
                UPDATE cities SET
                    country = CASE WHEN ?2 = '' THEN country ELSE ?2 END,
                    state_province = CASE WHEN ?3 = '' THEN state_province ELSE ?3 END,
                    description = CASE WHEN ?4 = '' THEN description ELSE ?4 END,
                    center_latitude = CASE WHEN ?5 = 0 THEN center_latitude ELSE ?5 END,
                    center_longitude = CASE WHEN ?6 = 0 THEN center_longitude ELSE ?6 END,
                    updated_at = ?7
                WHERE id = ?1
                "#,
                params![
                    existing.id.clone(),
                    city.country.clone(),
                    city.state_province.clone(),
                    city.description.clone(),
                    city.center_latitude,
                    city.center_longitude,
                    now,
                ],
            )
            .await?;

            return Self::get_by_id(conn, &existing.id)
                .await
                .map(|found| found.unwrap_or(existing));
        }

        let id = Uuid::new_v4().to_string();
        conn.execute(
            r#"
            INSERT INTO cities (
                id, name, country, state_province, description,
                center_latitude, center_longitude, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
            params![
                id.clone(),
                city.name.trim(),
                city.country.clone(),
                city.state_province.clone(),
                city.description.clone(),
                city.center_latitude,
                city.center_longitude,
                now,
            ],
        )
        .await?;

        Ok(City {
            id,
            name: city.name.trim().to_string(),
            country: city.country.clone(),
            state_province: city.state_province.clone(),
            description: city.description.clone(),
            center_latitude: city.center_latitude,
            center_longitude: city.center_longitude,
        })
    }

    pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<City>> {
        let mut rows = conn
            .query(
                &format!("SELECT {CITY_COLUMNS} FROM cities WHERE id = ?1"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_city(&row)?)),
            None => Ok(None),
        }
    }

    fn row_to_city(row: &libsql::Row) -> Result<City> {
        Ok(City {
            id: row.get(0)?,
            name: row.get(1)?,
            country: row.get(2)?,
            state_province: row.get(3)?,
            description: row.get(4)?,
            center_latitude: row.get(5)?,
            center_longitude: row.get(6)?,
        })
    }
}
