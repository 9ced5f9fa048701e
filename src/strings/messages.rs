//! # Messages
//!
//! Contains constant strings and format functions for user-facing messages.
//! Includes error messages, session command replies, and reply decorations.

pub const NEW_SESSION_CREATED: &str = "✅ New session created.";
pub const NO_ACTIVE_SESSION: &str = "ℹ️ No active session.";
pub const NO_HISTORY: &str = "ℹ️ No history in the current session.";
pub const HISTORY_HEADER: &str = "**📜 Conversation History**";

pub fn answered_by(name: &str, body: &str) -> String {
    format!("**[{name}]**\n\n{body}")
}

pub fn routed_to(name: &str) -> String {
    format!("Routed to **{name}**.")
}

pub fn degraded_notice(requested: &str, used: &str) -> String {
    format!("ℹ️ {requested} is unavailable, answered by {used}.")
}

pub fn execution_failed(err: &str) -> String {
    format!("❌ **Error**: {err}")
}

pub fn session_failed(err: &str) -> String {
    format!("❌ **Session Error**: {err}")
}

pub fn session_info(short_id: &str, messages: usize, age_seconds: i64) -> String {
    format!(
        "**📊 Session Info**\n* Session ID: `{short_id}…`\n* Messages: {messages}\n* Age: {age_seconds}s"
    )
}

pub fn history_line(index: usize, is_user: bool, preview: &str) -> String {
    let label = if is_user { "👤 User" } else { "🤖 Assistant" };
    format!("{index}. {label}: {preview}")
}
