mod chat;
pub mod completion;
pub mod delivery;
pub mod generation;
mod recommendation;

pub use chat::{ChatService, ChatTurnResult, ContinueChatRequest, StartChatRequest, TurnStream};
pub use completion::CompletionPipeline;
pub use delivery::{
    spawn_dead_letter_logger, DeadLetter, DeadLetterQueue, DeadLetterReason, EventDelivery,
    EventSink,
};
pub use generation::GenerationOrchestrator;
pub use recommendation::RecommendationEngine;
