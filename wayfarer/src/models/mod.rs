mod chat;
mod common;
mod event;
mod poi;

pub use chat::*;
pub use common::*;
pub use event::*;
pub use poi::*;
