use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{Domain, Location};

/// Accepts a JSON number or a numeric string; anything else becomes `0.0`.
/// Generated coordinates arrive in both shapes.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or_default(),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

/// A point of interest, either a nameless AI suggestion (`id == None`) or a
/// persisted entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PointOfInterest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, alias = "lat", deserialize_with = "lenient_f64")]
    pub latitude: f64,
    #[serde(default, alias = "lon", alias = "lng", deserialize_with = "lenient_f64")]
    pub longitude: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "description_poi")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_interaction_id: Option<String>,
}

impl PointOfInterest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.latitude, self.longitude)
    }

    /// Case-insensitive exact name match, used for duplicate detection.
    pub fn has_name(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }

    /// Text used when embedding this POI.
    pub fn embedding_text(&self) -> String {
        format!("{} {} {}", self.name, self.category, self.description)
            .trim()
            .to_string()
    }
}

/// City summary as produced by generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CityData {
    #[serde(alias = "city", alias = "city_name")]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub state_province: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub center_latitude: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub center_longitude: f64,
}

/// A persisted city.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct City {
    pub id: String,
    pub name: String,
    pub country: String,
    pub state_province: String,
    pub description: String,
    pub center_latitude: f64,
    pub center_longitude: f64,
}

/// Structured snapshot of a turn's generated content. Rebuilt every turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GeneratedItinerary {
    pub session_id: String,
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<CityData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itinerary_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_description: Option<String>,
    #[serde(default)]
    pub general_pois: Vec<PointOfInterest>,
    #[serde(default)]
    pub points_of_interest: Vec<PointOfInterest>,
}

impl GeneratedItinerary {
    pub fn empty(session_id: impl Into<String>, domain: Domain) -> Self {
        Self {
            session_id: session_id.into(),
            domain,
            ..Default::default()
        }
    }

    pub fn poi_names(&self) -> Vec<String> {
        self.points_of_interest
            .iter()
            .map(|poi| poi.name.clone())
            .collect()
    }

    pub fn contains_poi(&self, name: &str) -> bool {
        self.points_of_interest.iter().any(|poi| poi.has_name(name))
    }

    /// Gives entries without an id their persisted identity, matched by
    /// trimmed lowercase name. Returns the number of entries filled.
    pub fn fill_poi_ids(&mut self, backfill: &PoiIdBackfill) -> usize {
        let mut filled = 0;
        for poi in self
            .points_of_interest
            .iter_mut()
            .chain(self.general_pois.iter_mut())
            .filter(|poi| poi.id.is_none())
        {
            if let Some(id) = backfill.ids.get(&poi.name.trim().to_lowercase()) {
                poi.id = Some(id.clone());
                poi.city_id = Some(backfill.city_id.clone());
                poi.source_interaction_id = Some(backfill.interaction_id.clone());
                filled += 1;
            }
        }
        filled
    }
}

/// Persisted identities produced by one start turn, keyed by trimmed
/// lowercase POI name.
#[derive(Debug, Clone, Default)]
pub struct PoiIdBackfill {
    pub city_id: String,
    pub interaction_id: String,
    pub ids: HashMap<String, String>,
}

/// A stored POI together with its embedding, if one has been computed.
#[derive(Debug, Clone)]
pub struct StoredPoi {
    pub poi: PointOfInterest,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct PoiSearchHit {
    pub poi: PointOfInterest,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoiDistance {
    pub id: String,
    pub distance_km: f64,
}

/// One persisted request/response pair of a start turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub profile_id: Option<String>,
    pub city_id: Option<String>,
    pub domain: Domain,
    pub prompt: String,
    pub response: String,
    pub poi_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poi_deserializes_generated_shape() {
        let json = r#"{
            "name": "Louvre Museum",
            "latitude": "48.8606",
            "longitude": 2.3376,
            "category": "Museum",
            "description_poi": "World's largest art museum"
        }"#;
        let poi: PointOfInterest = serde_json::from_str(json).expect("deserialize");
        assert_eq!(poi.name, "Louvre Museum");
        assert!((poi.latitude - 48.8606).abs() < 1e-9);
        assert_eq!(poi.description, "World's largest art museum");
        assert!(poi.id.is_none());
    }

    #[test]
    fn test_has_name_is_case_insensitive() {
        let poi = PointOfInterest::named("Ibis Hotel");
        assert!(poi.has_name("ibis hotel"));
        assert!(poi.has_name("  IBIS HOTEL "));
        assert!(!poi.has_name("Ibis"));
    }

    #[test]
    fn test_city_data_accepts_city_alias() {
        let json = r#"{"city": "Porto", "country": "Portugal", "center_latitude": 41.15}"#;
        let city: CityData = serde_json::from_str(json).expect("deserialize");
        assert_eq!(city.name, "Porto");
        assert_eq!(city.country, "Portugal");
        assert_eq!(city.center_longitude, 0.0);
    }
}
