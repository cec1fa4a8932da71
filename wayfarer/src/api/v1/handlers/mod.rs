pub mod chat;
pub(crate) mod health;

pub use health::health_check;
