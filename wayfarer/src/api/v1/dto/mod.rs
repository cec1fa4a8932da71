//! v1 API Data Transfer Objects.
//!
//! Wire format of the v1 REST API, kept separate from the domain models in
//! `src/models/`.

pub mod chat;

pub use chat::*;
