use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{Domain, GeneratedItinerary};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Start,
    Progress,
    Chunk,
    Itinerary,
    Complete,
    Error,
    Custom,
}

impl EventType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Progress => write!(f, "progress"),
            Self::Chunk => write!(f, "chunk"),
            Self::Itinerary => write!(f, "itinerary"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// Deep-link descriptor for client-side routing once a turn ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Navigation {
    pub url: String,
    pub route_type: String,
    pub query_params: BTreeMap<String, String>,
}

impl Navigation {
    pub fn for_domain(domain: Domain, session_id: &str, city_name: &str) -> Self {
        let route_type = domain.route_type().to_string();
        let mut query_params = BTreeMap::new();
        query_params.insert("sessionId".to_string(), session_id.to_string());
        query_params.insert("cityName".to_string(), city_name.to_string());
        query_params.insert("domain".to_string(), domain.to_string());

        Self {
            url: format!("/{route_type}"),
            route_type,
            query_params,
        }
    }
}

/// One event on a turn's outward stream. Serialized as
/// `{type, message, data, error, timestamp, event_id, is_final, navigation}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub event_id: String,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Navigation>,
}

impl StreamEvent {
    fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            message: None,
            data: None,
            error: None,
            timestamp: Utc::now(),
            event_id: Uuid::new_v4().to_string(),
            is_final: false,
            navigation: None,
        }
    }

    pub fn start(session_id: &str, domain: Option<Domain>) -> Self {
        let mut event = Self::new(EventType::Start);
        event.message = Some("Processing your request".to_string());
        event.data = Some(json!({
            "session_id": session_id,
            "domain": domain.map(|d| d.to_string()),
        }));
        event
    }

    pub fn progress(message: impl Into<String>) -> Self {
        let mut event = Self::new(EventType::Progress);
        event.message = Some(message.into());
        event
    }

    pub fn chunk(part: &str, text: &str) -> Self {
        let mut event = Self::new(EventType::Chunk);
        event.data = Some(json!({ "part": part, "chunk": text }));
        event
    }

    pub fn itinerary(itinerary: &GeneratedItinerary, message: Option<String>) -> Self {
        let mut event = Self::new(EventType::Itinerary);
        event.message = message;
        event.data = serde_json::to_value(itinerary).ok();
        event
    }

    pub fn complete(message: impl Into<String>, navigation: Navigation) -> Self {
        let mut event = Self::new(EventType::Complete);
        event.message = Some(message.into());
        event.is_final = true;
        event.navigation = Some(navigation);
        event
    }

    pub fn error(error: impl Into<String>) -> Self {
        let mut event = Self::new(EventType::Error);
        event.error = Some(error.into());
        event.is_final = true;
        event
    }

    /// The chunk text if this is a chunk event.
    pub fn chunk_text(&self) -> Option<&str> {
        if self.event_type != EventType::Chunk {
            return None;
        }
        self.data.as_ref()?.get("chunk")?.as_str()
    }

    /// The content part name if this is a chunk event.
    pub fn chunk_part(&self) -> Option<&str> {
        if self.event_type != EventType::Chunk {
            return None;
        }
        self.data.as_ref()?.get("part")?.as_str()
    }

    /// Parses the snapshot back out of an itinerary event.
    pub fn itinerary_snapshot(&self) -> Option<GeneratedItinerary> {
        if self.event_type != EventType::Itinerary {
            return None;
        }
        serde_json::from_value(self.data.clone()?).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = StreamEvent::complete(
            "done",
            Navigation::for_domain(Domain::Dining, "sess-1", "Rome"),
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "complete");
        assert_eq!(json["is_final"], true);
        assert_eq!(json["navigation"]["route_type"], "restaurants");
        assert_eq!(json["navigation"]["url"], "/restaurants");
        assert_eq!(json["navigation"]["query_params"]["sessionId"], "sess-1");
        assert!(json.get("event_id").is_some());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = StreamEvent::progress("a");
        let b = StreamEvent::progress("a");
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_chunk_accessors() {
        let event = StreamEvent::chunk("itinerary", "Day 1");
        assert_eq!(event.chunk_text(), Some("Day 1"));
        assert_eq!(event.chunk_part(), Some("itinerary"));
        assert!(StreamEvent::progress("x").chunk_text().is_none());
    }

    #[test]
    fn test_error_event_is_terminal() {
        let event = StreamEvent::error("boom");
        assert!(event.event_type.is_terminal());
        assert!(event.is_final);
        assert!(!EventType::Chunk.is_terminal());
    }

    #[test]
    fn test_custom_event_type_round_trips_on_the_wire() {
        let parsed: EventType = serde_json::from_str("\"custom\"").unwrap();
        assert_eq!(parsed, EventType::Custom);
        assert_eq!(EventType::Custom.to_string(), "custom");
        assert!(!EventType::Custom.is_terminal());
    }
}
