use crate::domain::types::{Layer, Provider};

pub fn config_loaded(user: &str) -> String {
    format!("Loaded configuration for user: {user}")
}

pub const LOGIN_SUCCESS: &str = "Logged in successfully!";

pub fn setting_display_name(name: &str) -> String {
    format!("Setting display name to: {name}")
}

pub fn set_display_name_fail(err: &str) -> String {
    format!("Failed to set display name: {err}")
}

pub const SYNC_LOOP_START: &str = "Starting sync loop...";

pub fn sync_loop_fail(err: &str) -> String {
    format!("Sync loop failed: {err}")
}

pub const SHUTDOWN: &str = "Shutting down...";

pub fn shutdown_fail(err: &str) -> String {
    format!("Unable to listen for shutdown signal: {err}")
}

pub fn invite_received(room_id: &str) -> String {
    format!("💌 Received invite for room {room_id:?}")
}

pub fn join_invite_fail(err: &str) -> String {
    format!("Failed to join room after invite: {err}")
}

pub const JOIN_INVITE_SUCCESS: &str = "✅ Successfully joined room!";

pub fn executors_registered(available: usize, total: usize) -> String {
    format!("Executors registered: {available}/{total} available")
}

pub fn route_degraded(from: Provider, from_layer: Layer, to: Provider, to_layer: Layer) -> String {
    format!("[ROUTING] Degraded {from}/{from_layer} → {to}/{to_layer}")
}

pub fn duplicate_event(event_id: &str) -> String {
    format!("Skipping duplicate event {event_id}")
}

pub fn sweep_done(count: usize) -> String {
    format!("Session sweep removed {count} expired sessions")
}
