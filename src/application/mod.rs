//! # Application Layer
//!
//! Contains the routing core and its orchestration: dedup, command parsing, intent
//! classification, the executor registry, sessions and the smart router.

pub mod dedup;
pub mod formatter;
pub mod handler;
pub mod intent;
pub mod logging;
pub mod parsing;
pub mod registry;
pub mod router;
pub mod session;
pub mod state;

#[cfg(test)]
pub mod testing;
