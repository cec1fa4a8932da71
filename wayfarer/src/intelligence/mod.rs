pub mod command;
pub mod domain;
pub mod geo;
pub mod intent;
pub mod json_extract;

pub use command::Command;
pub use domain::DomainDetector;
pub use intent::{HeuristicIntentClassifier, IntentClassifier, LlmIntentClassifier};
