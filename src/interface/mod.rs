//! # Interface Layer
//!
//! User-facing command handlers that answer directly in the chat.

pub mod commands;
