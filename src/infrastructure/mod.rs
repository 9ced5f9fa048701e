//! # Infrastructure Layer
//!
//! Handles interactions with external systems and services.
//! Implements the traits defined in the Domain layer (`ChatProvider`, `Executor`).

pub mod executors;
pub mod llm;
pub mod matrix;
