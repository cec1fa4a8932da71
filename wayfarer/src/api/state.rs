use std::sync::Arc;

use crate::config::{Config, IntentClassifierKind};
use crate::db::DatabaseBackend;
use crate::embeddings::Embedder;
use crate::intelligence::{HeuristicIntentClassifier, IntentClassifier, LlmIntentClassifier};
use crate::llm::{LlmProvider, TextGenerator};
use crate::services::{ChatService, DeadLetterQueue};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<dyn DatabaseBackend>,
    pub llm: LlmProvider,
    pub embedder: Arc<dyn Embedder>,
    pub chat: ChatService,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Arc<dyn DatabaseBackend>,
        llm: LlmProvider,
        embedder: Arc<dyn Embedder>,
        dead_letters: DeadLetterQueue,
    ) -> Self {
        let generator: Arc<dyn TextGenerator> = Arc::new(llm.clone());
        let classifier: Arc<dyn IntentClassifier> = match config.chat.intent_classifier {
            IntentClassifierKind::Heuristic => Arc::new(HeuristicIntentClassifier::new()),
            IntentClassifierKind::Llm => Arc::new(LlmIntentClassifier::new(generator.clone())),
        };

        let chat = ChatService::new(
            db.clone(),
            generator,
            embedder.clone(),
            classifier,
            dead_letters,
            config.chat.clone(),
        );

        Self::from_parts(config, db, llm, embedder, chat)
    }

    /// Assembles state around an already-built chat service.
    pub fn from_parts(
        config: Config,
        db: Arc<dyn DatabaseBackend>,
        llm: LlmProvider,
        embedder: Arc<dyn Embedder>,
        chat: ChatService,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db,
            llm,
            embedder,
            chat,
        }
    }
}
