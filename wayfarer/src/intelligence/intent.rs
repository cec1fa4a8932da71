use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, WayfarerError};
use crate::llm::{prompts, TextGenerator};
use crate::models::Intent;

/// Maps a follow-up message to an [`Intent`]. An `Err` aborts the turn.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, message: &str) -> Result<Intent>;
}

const REPLACE_MARKERS: &[&str] = &["replace", "swap", "switch", "instead of"];
const REMOVE_MARKERS: &[&str] = &[
    "remove",
    "delete",
    "drop",
    "get rid of",
    "take out",
    "skip",
];
const ADD_MARKERS: &[&str] = &["add", "include", "also visit", "append", "put in"];
const QUESTION_WORDS: &[&str] = &[
    "what", "which", "where", "when", "why", "how", "who", "is", "are", "can", "could", "should",
    "does", "do",
];

/// Keyword classifier. Checks run in a fixed order: replace, remove, add,
/// question, and otherwise a free-form modification.
#[derive(Debug, Clone, Default)]
pub struct HeuristicIntentClassifier;

impl HeuristicIntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(&self, message: &str) -> Intent {
        let text = format!(
            " {} ",
            message
                .to_lowercase()
                .split(|c: char| !(c.is_alphanumeric() || c == '\''))
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let has = |markers: &[&str]| markers.iter().any(|m| text.contains(&format!(" {m} ")));

        if has(REPLACE_MARKERS) {
            Intent::ReplacePoi
        } else if has(REMOVE_MARKERS) {
            Intent::RemovePoi
        } else if has(ADD_MARKERS) {
            Intent::AddPoi
        } else if message.contains('?')
            || QUESTION_WORDS
                .iter()
                .any(|w| text.trim_start().starts_with(&format!("{w} ")))
        {
            Intent::AskQuestion
        } else {
            Intent::ModifyItinerary
        }
    }
}

#[async_trait]
impl IntentClassifier for HeuristicIntentClassifier {
    async fn classify(&self, message: &str) -> Result<Intent> {
        Ok(self.classify_text(message))
    }
}

/// Asks the text generator to name the intent. Generator failures are
/// classifier failures; an answer that names no known intent falls back to
/// the heuristic.
#[derive(Clone)]
pub struct LlmIntentClassifier {
    generator: Arc<dyn TextGenerator>,
    fallback: HeuristicIntentClassifier,
}

impl LlmIntentClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            fallback: HeuristicIntentClassifier::new(),
        }
    }
}

fn parse_answer(answer: &str) -> Option<Intent> {
    answer
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .find_map(|token| token.parse::<Intent>().ok())
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, message: &str) -> Result<Intent> {
        let prompt = prompts::intent_classification_prompt(message);
        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| WayfarerError::Classifier(e.to_string()))?;

        match parse_answer(&answer) {
            Some(intent) => {
                tracing::debug!(%intent, "LLM classified intent");
                Ok(intent)
            }
            None => {
                let intent = self.fallback.classify_text(message);
                tracing::warn!(
                    answer = %answer.chars().take(50).collect::<String>(),
                    %intent,
                    "LLM intent answer not recognised, using heuristic"
                );
                Ok(intent)
            }
        }
    }
}
