use sha2::{Digest, Sha256};

use crate::models::Domain;

const FIELD_SEPARATOR: &str = "\u{1f}";

/// Trims, lowercases and collapses internal whitespace.
pub fn clean_message(message: &str) -> String {
    message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Scoping parameters of one generation request. `key()` hashes them into a
/// stable cache key.
#[derive(Debug, Clone)]
pub struct Fingerprint<'a> {
    pub user_id: &'a str,
    pub profile_id: Option<&'a str>,
    pub city: &'a str,
    pub message: &'a str,
    pub domain: Domain,
    pub preferences: &'a [String],
    pub part: &'a str,
}

impl Fingerprint<'_> {
    pub fn key(&self) -> String {
        let mut preferences: Vec<String> = self
            .preferences
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        preferences.sort();
        preferences.dedup();

        let fields = [
            self.user_id.to_string(),
            self.profile_id.unwrap_or_default().to_string(),
            self.city.trim().to_lowercase(),
            clean_message(self.message),
            self.domain.to_string(),
            preferences.join(","),
            self.part.to_string(),
        ];

        let mut hasher = Sha256::new();
        hasher.update(fields.join(FIELD_SEPARATOR).as_bytes());

        let digest = hasher.finalize();
        format!("{digest:x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base<'a>(prefs: &'a [String]) -> Fingerprint<'a> {
        Fingerprint {
            user_id: "user-1",
            profile_id: Some("profile-1"),
            city: "Paris",
            message: "Plan a day in Paris",
            domain: Domain::Itinerary,
            preferences: prefs,
            part: "itinerary",
        }
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let key = base(&[]).key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_ignores_cosmetic_differences() {
        let prefs_a = vec!["Museums".to_string(), "food".to_string()];
        let prefs_b = vec!["food".to_string(), "museums".to_string(), "FOOD".to_string()];

        let a = base(&prefs_a);
        let mut b = base(&prefs_b);
        b.city = "  paris ";
        b.message = "plan   a day in\tParis ";

        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_key_differs_per_part_and_actor() {
        let a = base(&[]);
        let mut b = base(&[]);
        b.part = "city_data";
        assert_ne!(a.key(), b.key());

        let mut c = base(&[]);
        c.profile_id = None;
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_fields_do_not_bleed_into_each_other() {
        let mut a = base(&[]);
        a.user_id = "ab";
        a.profile_id = Some("c");
        let mut b = base(&[]);
        b.user_id = "a";
        b.profile_id = Some("bc");
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_clean_message() {
        assert_eq!(clean_message("  Hello \n  World "), "hello world");
    }
}
