use serde::{Deserialize, Serialize};

/// Content category of a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Itinerary,
    #[default]
    General,
    Accommodation,
    Dining,
    Activities,
}

impl Domain {
    /// Client-side route the terminal event navigates to.
    pub fn route_type(&self) -> &'static str {
        match self {
            Self::Itinerary | Self::General => "itinerary",
            Self::Accommodation => "hotels",
            Self::Dining => "restaurants",
            Self::Activities => "activities",
        }
    }

    /// Itinerary and general turns fan out to three workers; the rest to one.
    pub fn is_multi_part(&self) -> bool {
        matches!(self, Self::Itinerary | Self::General)
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Itinerary => write!(f, "itinerary"),
            Self::General => write!(f, "general"),
            Self::Accommodation => write!(f, "accommodation"),
            Self::Dining => write!(f, "dining"),
            Self::Activities => write!(f, "activities"),
        }
    }
}

impl std::str::FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "itinerary" => Ok(Self::Itinerary),
            "general" => Ok(Self::General),
            "accommodation" => Ok(Self::Accommodation),
            "dining" => Ok(Self::Dining),
            "activities" => Ok(Self::Activities),
            _ => Err(format!("Unknown domain: {s}")),
        }
    }
}

/// Intent of a follow-up message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    AddPoi,
    RemovePoi,
    ReplacePoi,
    AskQuestion,
    ModifyItinerary,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddPoi => write!(f, "add_poi"),
            Self::RemovePoi => write!(f, "remove_poi"),
            Self::ReplacePoi => write!(f, "replace_poi"),
            Self::AskQuestion => write!(f, "ask_question"),
            Self::ModifyItinerary => write!(f, "modify_itinerary"),
        }
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "add_poi" | "add" => Ok(Self::AddPoi),
            "remove_poi" | "remove" => Ok(Self::RemovePoi),
            "replace_poi" | "replace" => Ok(Self::ReplacePoi),
            "ask_question" | "question" => Ok(Self::AskQuestion),
            "modify_itinerary" | "modify" => Ok(Self::ModifyItinerary),
            _ => Err(format!("Unknown intent: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}
