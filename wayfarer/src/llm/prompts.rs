//! Prompt templates for travel generation.
//!
//! Every content part asks for a single JSON object so the completion stage
//! can salvage it from the surrounding prose.

use crate::models::{Intent, PointOfInterest};

/// Inputs shared by every part of one generation turn.
#[derive(Debug, Clone, Default)]
pub struct PromptContext<'a> {
    pub city: &'a str,
    pub message: &'a str,
    pub preferences: &'a [String],
    /// Semantically related places already known for the city.
    pub recommendations: &'a [PointOfInterest],
}

impl PromptContext<'_> {
    fn preferences_line(&self) -> String {
        if self.preferences.is_empty() {
            "No stated preferences.".to_string()
        } else {
            format!("Traveler interests: {}.", self.preferences.join(", "))
        }
    }

    fn recommendations_block(&self) -> String {
        if self.recommendations.is_empty() {
            return String::new();
        }
        let lines = self
            .recommendations
            .iter()
            .map(|poi| format!("- {} ({})", poi.name, poi.category))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\nPlaces travelers with similar interests liked:\n{lines}\n")
    }
}

pub fn city_data_prompt(ctx: &PromptContext<'_>) -> String {
    format!(
        r#"Describe the city of {city} for a traveler.
Request: {message}

Respond with one JSON object only:
{{"city": "...", "country": "...", "state_province": "...", "description": "...", "center_latitude": 0.0, "center_longitude": 0.0}}"#,
        city = ctx.city,
        message = ctx.message,
    )
}

pub fn general_pois_prompt(ctx: &PromptContext<'_>) -> String {
    format!(
        r#"List the most notable points of interest in {city}.
{preferences}
{recommendations}
Respond with one JSON object only:
{{"points_of_interest": [{{"name": "...", "latitude": 0.0, "longitude": 0.0, "category": "...", "description_poi": "..."}}]}}"#,
        city = ctx.city,
        preferences = ctx.preferences_line(),
        recommendations = ctx.recommendations_block(),
    )
}

pub fn itinerary_prompt(ctx: &PromptContext<'_>) -> String {
    format!(
        r#"Create a personalized itinerary in {city}.
Request: {message}
{preferences}
{recommendations}
Respond with one JSON object only:
{{"itinerary_name": "...", "overall_description": "...", "points_of_interest": [{{"name": "...", "latitude": 0.0, "longitude": 0.0, "category": "...", "description_poi": "..."}}]}}"#,
        city = ctx.city,
        message = ctx.message,
        preferences = ctx.preferences_line(),
        recommendations = ctx.recommendations_block(),
    )
}

fn category_prompt(kind: &str, ctx: &PromptContext<'_>) -> String {
    format!(
        r#"Recommend {kind} in {city}.
Request: {message}
{preferences}
{recommendations}
Respond with one JSON object only:
{{"overall_description": "...", "points_of_interest": [{{"name": "...", "latitude": 0.0, "longitude": 0.0, "category": "...", "description_poi": "..."}}]}}"#,
        city = ctx.city,
        message = ctx.message,
        preferences = ctx.preferences_line(),
        recommendations = ctx.recommendations_block(),
    )
}

pub fn hotels_prompt(ctx: &PromptContext<'_>) -> String {
    category_prompt("hotels and places to stay", ctx)
}

pub fn restaurants_prompt(ctx: &PromptContext<'_>) -> String {
    category_prompt("restaurants and places to eat", ctx)
}

pub fn activities_prompt(ctx: &PromptContext<'_>) -> String {
    category_prompt("activities and experiences", ctx)
}

/// Details for one place, optionally replacing an existing itinerary entry.
pub fn single_poi_prompt(city: &str, name: &str, replacing: Option<&PointOfInterest>) -> String {
    let context = match replacing {
        Some(old) => format!(
            "It replaces \"{}\" ({}) in the traveler's itinerary.",
            old.name, old.category
        ),
        None => "It is being added to the traveler's itinerary.".to_string(),
    };

    format!(
        r#"Provide details for the place "{name}" in {city}.
{context}

Respond with one JSON object only:
{{"name": "{name}", "latitude": 0.0, "longitude": 0.0, "category": "...", "description_poi": "..."}}"#
    )
}

pub fn intent_classification_prompt(message: &str) -> String {
    let intents = [
        Intent::AddPoi,
        Intent::RemovePoi,
        Intent::ReplacePoi,
        Intent::AskQuestion,
        Intent::ModifyItinerary,
    ]
    .iter()
    .map(|i| i.to_string())
    .collect::<Vec<_>>()
    .join(", ");

    format!(
        r#"Classify the intent of this message about a travel itinerary.
Allowed intents: {intents}

Message: {message}

Answer with the intent name only."#
    )
}
