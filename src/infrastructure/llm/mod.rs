//! Thin HTTP wrapper over the hosted model APIs (Anthropic, Gemini, OpenAI).
//!
//! Used by the API-layer executors. Every failure comes back as an [`Error`] carrying
//! the `ErrorKind` the router reports on.

pub mod providers;
mod types;

pub use types::{Context, Error, Message, MessageRole, Response};
