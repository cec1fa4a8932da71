//! A small grammar turning a classified follow-up message into a [`Command`].
//!
//! ```text
//! replace   := ("replace" | "swap" | "switch" | "change") <old> ("with" | "for" | "to") <new>
//!            | <new> "instead of" <old>
//! place     := <leading filler>* <name> <trailing filler>*
//! ```

use crate::models::{Intent, PointOfInterest};

/// What a follow-up turn asks to do with the current itinerary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddPoi(String),
    RemovePoi(String),
    ReplacePoi { old: String, new: String },
    AskQuestion,
    ModifyItinerary,
}

impl Command {
    /// Builds the command for a classified message.
    ///
    /// Returns `None` only for [`Intent::ReplacePoi`] when the message does not
    /// follow the replace grammar. Questions and free-form modifications are
    /// upgraded to a replacement when the message happens to parse as one.
    pub fn parse(intent: Intent, message: &str) -> Option<Self> {
        match intent {
            Intent::AddPoi => Some(Self::AddPoi(extract_place_name(message))),
            Intent::RemovePoi => Some(Self::RemovePoi(extract_place_name(message))),
            Intent::ReplacePoi => {
                parse_replace(message).map(|(old, new)| Self::ReplacePoi { old, new })
            }
            Intent::AskQuestion => Some(
                parse_replace(message)
                    .map(|(old, new)| Self::ReplacePoi { old, new })
                    .unwrap_or(Self::AskQuestion),
            ),
            Intent::ModifyItinerary => Some(
                parse_replace(message)
                    .map(|(old, new)| Self::ReplacePoi { old, new })
                    .unwrap_or(Self::ModifyItinerary),
            ),
        }
    }
}

const REPLACE_VERBS: &[&str] = &["replace", "swap", "switch", "change"];
const REPLACE_SEPARATORS: &[&str] = &["with", "for", "to"];

const LEADING_FILLERS: &[&str] = &[
    "please",
    "can you",
    "could you",
    "would you",
    "will you",
    "i want to",
    "i would like to",
    "i'd like to",
    "let's",
    "lets",
    "also visit",
    "also",
    "add",
    "include",
    "visit",
    "remove",
    "delete",
    "drop",
    "get rid of",
    "take out",
    "the",
];

const TRAILING_FILLERS: &[&str] = &[
    "from my itinerary",
    "to my itinerary",
    "in my itinerary",
    "from the itinerary",
    "to the itinerary",
    "in the itinerary",
    "from my trip",
    "to my trip",
    "from my list",
    "to my list",
    "from the list",
    "to the list",
    "from it",
    "to it",
    "as well",
    "instead",
    "please",
    "too",
];

fn trim_punctuation(text: &str) -> &str {
    text.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '"' | '\'')
    })
}

/// Strips `prefix` from the start of `text` when it matches case-insensitively
/// as whole words.
fn strip_word_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = &text[prefix.len()..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest.trim_start()),
        _ => None,
    }
}

fn strip_word_suffix<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(suffix.len())?;
    let tail = text.get(split..)?;
    if !tail.eq_ignore_ascii_case(suffix) {
        return None;
    }
    let rest = &text[..split];
    match rest.chars().next_back() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest.trim_end()),
        _ => None,
    }
}

fn strip_fillers(text: &str) -> &str {
    let mut current = trim_punctuation(text);

    loop {
        let before = current.len();
        if let Some(rest) = LEADING_FILLERS
            .iter()
            .find_map(|f| strip_word_prefix(current, f))
        {
            current = trim_punctuation(rest);
        }
        if let Some(rest) = TRAILING_FILLERS
            .iter()
            .find_map(|f| strip_word_suffix(current, f))
        {
            current = trim_punctuation(rest);
        }
        if current.len() == before {
            return current;
        }
    }
}

/// Extracts the place a message refers to, e.g. `"Please remove the Stadium
/// from my itinerary."` gives `"Stadium"`.
pub fn extract_place_name(message: &str) -> String {
    strip_fillers(message).to_string()
}

/// Byte offset of `word` in `text` as a whole word, matched
/// case-insensitively, at or after `from`.
fn find_word(text: &str, word: &str, from: usize) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    let mut search_from = from;
    while let Some(found) = lower.get(search_from..)?.find(word) {
        let start = search_from + found;
        let end = start + word.len();
        let boundary_before = lower[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let boundary_after = lower[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if boundary_before && boundary_after {
            return Some(start);
        }
        search_from = end;
    }
    None
}

fn non_empty(text: &str) -> Option<String> {
    let cleaned = strip_fillers(text);
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// Parses "replace X with Y" style requests into `(old, new)`.
pub fn parse_replace(message: &str) -> Option<(String, String)> {
    for verb in REPLACE_VERBS {
        let Some(verb_at) = find_word(message, verb, 0) else {
            continue;
        };
        let after_verb = verb_at + verb.len();

        let separator = REPLACE_SEPARATORS
            .iter()
            .filter_map(|sep| find_word(message, sep, after_verb).map(|at| (at, sep.len())))
            .min_by_key(|(at, _)| *at);

        if let Some((sep_at, sep_len)) = separator {
            let old = non_empty(&message[after_verb..sep_at]);
            let new = non_empty(&message[sep_at + sep_len..]);
            if let (Some(old), Some(new)) = (old, new) {
                return Some((old, new));
            }
        }
    }

    let instead_at = find_word(message, "instead of", 0)?;
    let new = non_empty(&message[..instead_at])?;
    let old = non_empty(&message[instead_at + "instead of".len()..])?;
    Some((old, new))
}

/// Index of the first entry whose name equals `name` case-insensitively or
/// where either name contains the other.
pub fn find_matching_poi(pois: &[PointOfInterest], name: &str) -> Option<usize> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    pois.iter().position(|poi| {
        let candidate = poi.name.trim().to_lowercase();
        !candidate.is_empty()
            && (candidate == needle || candidate.contains(&needle) || needle.contains(&candidate))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_place_name() {
        assert_eq!(extract_place_name("Remove Stadium"), "Stadium");
        assert_eq!(
            extract_place_name("Please remove the Stadium from my itinerary."),
            "Stadium"
        );
        assert_eq!(extract_place_name("Add Louvre Museum"), "Louvre Museum");
        assert_eq!(
            extract_place_name("could you also visit Sagrada Família too?"),
            "Sagrada Família"
        );
        assert_eq!(extract_place_name("get rid of the Ibis Hotel"), "Ibis Hotel");
    }

    #[test]
    fn test_extract_place_name_keeps_embedded_words() {
        // "Theatre" starts with "the" but is not the article
        assert_eq!(extract_place_name("add Theatre Royal"), "Theatre Royal");
        assert_eq!(extract_place_name("drop Addison Lee Tour"), "Addison Lee Tour");
    }

    #[test]
    fn test_parse_replace_variants() {
        assert_eq!(
            parse_replace("replace Stadium with Arena"),
            Some(("Stadium".to_string(), "Arena".to_string()))
        );
        assert_eq!(
            parse_replace("Can you swap the Louvre for the Orsay Museum?"),
            Some(("Louvre".to_string(), "Orsay Museum".to_string()))
        );
        assert_eq!(
            parse_replace("Visit Park Güell instead of Casa Batlló"),
            Some(("Casa Batlló".to_string(), "Park Güell".to_string()))
        );
    }

    #[test]
    fn test_parse_replace_rejects_incomplete() {
        assert_eq!(parse_replace("replace the stadium"), None);
        assert_eq!(parse_replace("replace with Arena"), None);
        assert_eq!(parse_replace("what time does it open?"), None);
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(
            Command::parse(Intent::RemovePoi, "Remove Stadium"),
            Some(Command::RemovePoi("Stadium".to_string()))
        );
        assert_eq!(Command::parse(Intent::ReplacePoi, "replace it"), None);
        assert_eq!(
            Command::parse(Intent::AskQuestion, "could we replace Stadium with Arena?"),
            Some(Command::ReplacePoi {
                old: "Stadium".to_string(),
                new: "Arena".to_string()
            })
        );
        assert_eq!(
            Command::parse(Intent::ModifyItinerary, "make it more relaxed"),
            Some(Command::ModifyItinerary)
        );
    }

    #[test]
    fn test_find_matching_poi() {
        let pois = vec![
            PointOfInterest::named("Stadium"),
            PointOfInterest::named("Ibis Hotel"),
        ];
        assert_eq!(find_matching_poi(&pois, "stadium"), Some(0));
        assert_eq!(find_matching_poi(&pois, "Ibis"), Some(1));
        assert_eq!(find_matching_poi(&pois, "the Ibis Hotel Porto"), Some(1));
        assert_eq!(find_matching_poi(&pois, "Eiffel Tower"), None);
        assert_eq!(find_matching_poi(&pois, "  "), None);
    }
}
