use crate::models::Domain;

const ITINERARY_KEYWORDS: &[&str] = &[
    "itinerary",
    "plan",
    "trip",
    "schedule",
    "route",
    "day trip",
    "weekend",
    "visit",
    "sightseeing",
    "things to see",
];

const ACCOMMODATION_KEYWORDS: &[&str] = &[
    "hotel",
    "hostel",
    "accommodation",
    "stay",
    "lodging",
    "airbnb",
    "resort",
    "motel",
    "bed and breakfast",
    "room",
];

const DINING_KEYWORDS: &[&str] = &[
    "restaurant",
    "food",
    "eat",
    "dining",
    "dinner",
    "lunch",
    "breakfast",
    "brunch",
    "cafe",
    "cuisine",
    "bar",
];

const ACTIVITY_KEYWORDS: &[&str] = &[
    "activity",
    "activities",
    "things to do",
    "tour",
    "hike",
    "hiking",
    "adventure",
    "museum",
    "nightlife",
    "show",
    "concert",
    "sport",
];

/// Keyword-scoring classifier from free text to a content domain.
///
/// Every keyword occurrence scores one point for its domain. The highest
/// score wins; ties resolve in the order itinerary, accommodation, dining,
/// activities. No hits at all means [`Domain::General`].
#[derive(Debug, Clone, Default)]
pub struct DomainDetector;

impl DomainDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, message: &str) -> Domain {
        let text = format!(" {} ", normalize(message));

        let candidates = [
            (Domain::Itinerary, ITINERARY_KEYWORDS),
            (Domain::Accommodation, ACCOMMODATION_KEYWORDS),
            (Domain::Dining, DINING_KEYWORDS),
            (Domain::Activities, ACTIVITY_KEYWORDS),
        ];

        let mut best = Domain::General;
        let mut best_score = 0usize;
        for (domain, keywords) in candidates {
            let score = keywords.iter().filter(|kw| contains_word(&text, kw)).count();
            if score > best_score {
                best = domain;
                best_score = score;
            }
        }

        tracing::debug!(domain = %best, score = best_score, "Detected domain");
        best
    }
}

/// Lowercases and replaces punctuation with spaces so keyword matching works
/// on word boundaries.
fn normalize(message: &str) -> String {
    message
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `text` must be space-padded. Allows a trailing plural "s".
fn contains_word(text: &str, keyword: &str) -> bool {
    text.contains(&format!(" {keyword} ")) || text.contains(&format!(" {keyword}s "))
}
