mod content;
mod fingerprint;

pub use content::ContentCache;
pub use fingerprint::{clean_message, Fingerprint};
