//! # Session Manager
//!
//! Owns two stores with independent lifetimes:
//! - platform sessions: per-user conversation history, rotated by size or idle time;
//! - native sessions: provider-side session ids used by CLI executors.
//!
//! Rotating a platform session leaves native ids untouched. `/new` clears both.
//! Mutations for one user are serialized by a per-user lock and flushed to disk before the
//! call returns.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info};

use crate::application::state::{
    self, JsonStore, NativeSessions, Session, SessionMessage, UserSessions,
};
use crate::domain::config::SessionConfig;
use crate::domain::types::{HistoryEntry, Provider, Role};

#[derive(Default)]
struct UserSlot {
    loaded: bool,
    sessions: UserSessions,
    natives: NativeSessions,
}

/// Snapshot used by `/session`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub session_id: String,
    pub message_count: usize,
    pub created_at: i64,
    pub last_active_at: i64,
    pub age_seconds: i64,
}

pub struct SessionManager {
    max_messages: usize,
    timeout_secs: i64,
    sessions: JsonStore<UserSessions>,
    natives: JsonStore<NativeSessions>,
    archive_dir: PathBuf,
    users: Mutex<HashMap<String, Arc<Mutex<UserSlot>>>>,
}

impl SessionManager {
    pub fn new(storage_dir: impl Into<PathBuf>, max_messages: usize, timeout_secs: i64) -> Self {
        let root: PathBuf = storage_dir.into();
        Self {
            max_messages: max_messages.max(1),
            timeout_secs,
            sessions: JsonStore::new(root.join("sessions")),
            natives: JsonStore::new(root.join("native_sessions")),
            archive_dir: root.join("archived_sessions"),
            users: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.storage_dir.clone(),
            config.max_session_messages,
            config.session_timeout_seconds,
        )
    }

    /// Active session for `user_id`, creating one if needed. An expired or full session is
    /// rotated first.
    pub async fn get_or_create(&self, user_id: &str) -> Result<Session> {
        let mut slot = self.lock_user(user_id).await;
        self.rotate_if_needed(&mut slot, user_id, 1).await?;
        self.ensure_active(&mut slot, user_id).await
    }

    /// Returns a fresh session if the active one is full or idle past the timeout,
    /// otherwise the active session unchanged.
    pub async fn maybe_rotate(&self, user_id: &str) -> Result<Session> {
        self.get_or_create(user_id).await
    }

    /// Appends to the active session, rotating first when a rotation condition holds.
    pub async fn append(&self, user_id: &str, role: Role, text: &str) -> Result<Session> {
        let mut slot = self.lock_user(user_id).await;
        self.push_messages(&mut slot, user_id, &[(role, text)]).await
    }

    /// Records one user/assistant exchange in the active session. Both messages land in
    /// the same session under a single lock; rotation is checked once for the pair.
    pub async fn record_exchange(&self, user_id: &str, prompt: &str, reply: &str) -> Result<Session> {
        let mut slot = self.lock_user(user_id).await;
        self.push_messages(
            &mut slot,
            user_id,
            &[(Role::User, prompt), (Role::Assistant, reply)],
        )
        .await
    }

    /// Starts a new platform session and clears every native session id for the user.
    /// Both records are staged before either is replaced; on failure nothing changes.
    pub async fn reset(&self, user_id: &str) -> Result<Session> {
        let mut slot = self.lock_user(user_id).await;
        let now = now();

        let mut record = slot.sessions.clone();
        let previous = record.active().cloned();
        let fresh = Session::new(user_id, now);
        record.user_id = user_id.to_string();
        if let Some(old) = &previous {
            record.sessions.remove(&old.session_id);
        }
        record
            .sessions
            .insert(fresh.session_id.clone(), fresh.clone());
        record.active_session = Some(fresh.session_id.clone());

        let natives = NativeSessions {
            user_id: user_id.to_string(),
            ..Default::default()
        };

        let staged_sessions = self.sessions.stage(user_id, &record).await?;
        let staged_natives = match self.natives.stage(user_id, &natives).await {
            Ok(staged) => staged,
            Err(e) => {
                staged_sessions.discard().await;
                return Err(e);
            }
        };
        staged_sessions.commit().await?;
        if let Err(e) = staged_natives.commit().await {
            // Put the previous sessions record back so neither change is visible.
            if let Err(restore) = self.sessions.save(user_id, &slot.sessions).await {
                error!(
                    "Failed to restore sessions for {} after reset failure: {:#}",
                    user_id, restore
                );
            }
            return Err(e);
        }

        if let Some(old) = previous {
            self.archive(&old, now).await;
        }
        slot.sessions = record;
        slot.natives = natives;
        info!("Reset sessions for user {}", user_id);
        Ok(fresh)
    }

    /// The last `max_turns` exchanges of `session`, oldest first.
    pub fn format_history(session: &Session, max_turns: usize) -> Vec<HistoryEntry> {
        let keep = max_turns.saturating_mul(2);
        let skip = session.messages.len().saturating_sub(keep);
        session
            .messages
            .iter()
            .skip(skip)
            .map(|m| HistoryEntry::new(m.role, m.text.clone()))
            .collect()
    }

    pub async fn get_native_session(&self, user_id: &str, provider: Provider) -> Option<String> {
        let slot = self.lock_user(user_id).await;
        slot.natives.map.get(&provider).cloned()
    }

    pub async fn set_native_session(
        &self,
        user_id: &str,
        provider: Provider,
        native_id: &str,
    ) -> Result<()> {
        let mut slot = self.lock_user(user_id).await;
        let mut natives = slot.natives.clone();
        natives.user_id = user_id.to_string();
        natives.map.insert(provider, native_id.to_string());
        self.natives.save(user_id, &natives).await?;
        slot.natives = natives;
        debug!("Native session for {} on {} set", user_id, provider);
        Ok(())
    }

    /// Info about the active session, without creating one.
    pub async fn info(&self, user_id: &str) -> Option<SessionInfo> {
        let slot = self.lock_user(user_id).await;
        let session = slot.sessions.active()?;
        Some(SessionInfo {
            session_id: session.session_id.clone(),
            message_count: session.messages.len(),
            created_at: session.created_at,
            last_active_at: session.last_active_at,
            age_seconds: now() - session.created_at,
        })
    }

    /// Messages of the active session, without creating one.
    pub async fn current_messages(&self, user_id: &str) -> Vec<SessionMessage> {
        let slot = self.lock_user(user_id).await;
        slot.sessions
            .active()
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Any session by id: loaded users first, then the archive.
    pub async fn history_of(&self, session_id: &str) -> Option<Session> {
        let slots: Vec<Arc<Mutex<UserSlot>>> = self.users.lock().await.values().cloned().collect();
        for slot in slots {
            let slot = slot.lock().await;
            if let Some(session) = slot.sessions.sessions.get(session_id) {
                return Some(session.clone());
            }
        }
        state::find_archived(&self.archive_dir, session_id).await
    }

    /// Archives and drops sessions idle past the timeout, for every user with a record on
    /// disk or in memory. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let mut users = self.sessions.users().await;
        users.extend(self.users.lock().await.keys().cloned());
        users.sort();
        users.dedup();

        let now = now();
        let mut removed = 0;
        for user_id in users {
            let mut slot = self.lock_user(&user_id).await;
            let expired: Vec<Session> = slot
                .sessions
                .sessions
                .values()
                .filter(|s| s.is_expired(self.timeout_secs, now))
                .cloned()
                .collect();
            if expired.is_empty() {
                continue;
            }

            let mut record = slot.sessions.clone();
            for session in &expired {
                record.sessions.remove(&session.session_id);
                if record.active_session.as_deref() == Some(session.session_id.as_str()) {
                    record.active_session = None;
                }
            }
            if let Err(e) = self.sessions.save(&user_id, &record).await {
                error!("Failed to persist sweep for {}: {:#}", user_id, e);
                continue;
            }
            for session in &expired {
                self.archive(session, now).await;
            }
            removed += expired.len();
            slot.sessions = record;
        }
        if removed > 0 {
            info!("Swept {} expired sessions", removed);
        }
        removed
    }

    async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<UserSlot> {
        let slot = {
            let mut users = self.users.lock().await;
            users.entry(user_id.to_string()).or_default().clone()
        };
        let mut guard = slot.lock_owned().await;
        if !guard.loaded {
            guard.sessions = self.sessions.load(user_id).await;
            guard.natives = self.natives.load(user_id).await;
            guard.loaded = true;
        }
        guard
    }

    async fn ensure_active(&self, slot: &mut UserSlot, user_id: &str) -> Result<Session> {
        if let Some(session) = slot.sessions.active() {
            return Ok(session.clone());
        }
        let session = Session::new(user_id, now());
        let mut record = slot.sessions.clone();
        record.user_id = user_id.to_string();
        record
            .sessions
            .insert(session.session_id.clone(), session.clone());
        record.active_session = Some(session.session_id.clone());
        self.sessions.save(user_id, &record).await?;
        slot.sessions = record;
        info!("Created new session {} for user {}", session.session_id, user_id);
        Ok(session)
    }

    /// Retires the active session if `incoming` more messages would overflow it or it is
    /// idle. The retired session moves from the user's record to the archive.
    async fn rotate_if_needed(&self, slot: &mut UserSlot, user_id: &str, incoming: usize) -> Result<()> {
        let now = now();
        let Some(active) = slot.sessions.active() else {
            return Ok(());
        };
        if !active.should_rotate(self.max_messages, incoming, self.timeout_secs, now) {
            return Ok(());
        }
        let retired = active.clone();
        info!(
            "Session rotation for user {}: messages={}, expired={}",
            user_id,
            retired.messages.len(),
            retired.is_expired(self.timeout_secs, now)
        );

        let fresh = Session::new(user_id, now);
        let mut record = slot.sessions.clone();
        record.sessions.remove(&retired.session_id);
        record
            .sessions
            .insert(fresh.session_id.clone(), fresh.clone());
        record.active_session = Some(fresh.session_id.clone());
        self.sessions.save(user_id, &record).await?;
        slot.sessions = record;
        self.archive(&retired, now).await;
        Ok(())
    }

    /// Rotation check for the whole batch, then one write with every message.
    async fn push_messages(
        &self,
        slot: &mut UserSlot,
        user_id: &str,
        messages: &[(Role, &str)],
    ) -> Result<Session> {
        self.rotate_if_needed(slot, user_id, messages.len()).await?;
        self.ensure_active(slot, user_id).await?;

        let now = now();
        let mut record = slot.sessions.clone();
        let Some(session) = record.active_mut() else {
            anyhow::bail!("no active session for {}", user_id);
        };
        for (role, text) in messages {
            session.messages.push(SessionMessage {
                role: *role,
                text: text.to_string(),
                timestamp: now,
            });
            debug!(
                "Message added to session {}: role={}, length={}",
                session.session_id,
                role.as_str(),
                text.len()
            );
        }
        session.last_active_at = now;
        let updated = session.clone();

        self.sessions.save(user_id, &record).await?;
        slot.sessions = record;
        Ok(updated)
    }

    async fn archive(&self, session: &Session, now: i64) {
        match state::archive_session(&self.archive_dir, session, now).await {
            Ok(path) => debug!("Archived session to {}", path.display()),
            Err(e) => error!("Failed to archive session {}: {:#}", session.session_id, e),
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &std::path::Path, max: usize) -> SessionManager {
        SessionManager::new(dir, max, 3600)
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path(), 10);
        let a = sessions.get_or_create("@u:hs").await.unwrap();
        let b = sessions.get_or_create("@u:hs").await.unwrap();
        assert_eq!(a.session_id, b.session_id);
        assert!(a.messages.is_empty());

        let other = sessions.get_or_create("@v:hs").await.unwrap();
        assert_ne!(a.session_id, other.session_id);
    }

    #[tokio::test]
    async fn test_rotation_after_max_messages() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path(), 3);

        let first = sessions.get_or_create("u").await.unwrap();
        for i in 0..3 {
            let s = sessions.append("u", Role::User, &format!("m{}", i)).await.unwrap();
            assert_eq!(s.session_id, first.session_id);
        }

        // The full session is retired and the next check returns an empty one.
        let rotated = sessions.maybe_rotate("u").await.unwrap();
        assert_ne!(rotated.session_id, first.session_id);
        assert!(rotated.messages.is_empty());

        let after = sessions.append("u", Role::User, "m3").await.unwrap();
        assert_eq!(after.session_id, rotated.session_id);
        assert_eq!(after.messages.len(), 1);

        let old = sessions.history_of(&first.session_id).await.unwrap();
        assert_eq!(old.messages.len(), 3);
        assert_eq!(old.messages[0].text, "m0");
    }

    #[tokio::test]
    async fn test_exactly_one_rotation_on_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path(), 2);
        let a = sessions.append("u", Role::User, "1").await.unwrap();
        let b = sessions.append("u", Role::Assistant, "2").await.unwrap();
        assert_eq!(a.session_id, b.session_id);

        let c = sessions.append("u", Role::User, "3").await.unwrap();
        assert_ne!(c.session_id, a.session_id);
        assert_eq!(c.messages.len(), 1);
        let d = sessions.append("u", Role::Assistant, "4").await.unwrap();
        assert_eq!(d.session_id, c.session_id);
    }

    #[tokio::test]
    async fn test_rotation_keeps_native_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path(), 1);
        sessions
            .set_native_session("u", Provider::Claude, "native-1")
            .await
            .unwrap();
        sessions.append("u", Role::User, "a").await.unwrap();
        sessions.append("u", Role::User, "b").await.unwrap();
        assert_eq!(
            sessions.get_native_session("u", Provider::Claude).await.as_deref(),
            Some("native-1")
        );
    }

    #[tokio::test]
    async fn test_reset_clears_both_stores() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path(), 50);
        let before = sessions.append("u", Role::User, "hello").await.unwrap();
        sessions
            .set_native_session("u", Provider::Claude, "c-1")
            .await
            .unwrap();
        sessions
            .set_native_session("u", Provider::Gemini, "g-1")
            .await
            .unwrap();

        let fresh = sessions.reset("u").await.unwrap();
        assert_ne!(fresh.session_id, before.session_id);
        assert!(fresh.messages.is_empty());
        assert!(sessions.get_native_session("u", Provider::Claude).await.is_none());
        assert!(sessions.get_native_session("u", Provider::Gemini).await.is_none());

        // Reset survives a restart and the old session is still in the archive.
        let reloaded = manager(dir.path(), 50);
        let current = reloaded.get_or_create("u").await.unwrap();
        assert_eq!(current.session_id, fresh.session_id);
        assert!(reloaded.get_native_session("u", Provider::Claude).await.is_none());
        let archived = reloaded.history_of(&before.session_id).await.unwrap();
        assert_eq!(archived.messages[0].text, "hello");
    }

    #[tokio::test]
    async fn test_persistence_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let sessions = manager(dir.path(), 50);
            sessions.record_exchange("@a:hs", "q", "r").await.unwrap();
            sessions
                .set_native_session("@a:hs", Provider::Gemini, "gem")
                .await
                .unwrap();
        }
        let sessions = manager(dir.path(), 50);
        let session = sessions.get_or_create("@a:hs").await.unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].role, Role::Assistant);
        assert_eq!(
            sessions.get_native_session("@a:hs", Provider::Gemini).await.as_deref(),
            Some("gem")
        );
    }

    #[tokio::test]
    async fn test_corrupt_store_recovers_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("bad.json"), "garbage").unwrap();

        let sessions = manager(dir.path(), 50);
        let session = sessions.append("bad", Role::User, "hi").await.unwrap();
        assert_eq!(session.messages.len(), 1);
        // Other users are unaffected.
        sessions.append("good", Role::User, "hi").await.unwrap();
    }

    #[tokio::test]
    async fn test_format_history_limits_turns() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path(), 50);
        for i in 0..5 {
            sessions
                .record_exchange("u", &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }
        let session = sessions.get_or_create("u").await.unwrap();
        let history = SessionManager::format_history(&session, 2);
        let texts: Vec<&str> = history.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["q3", "a3", "q4", "a4"]);
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(manager(dir.path(), 100));
        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let sessions = sessions.clone();
                tokio::spawn(async move {
                    sessions
                        .append("u", Role::User, &format!("{}", i))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        let session = sessions.get_or_create("u").await.unwrap();
        assert_eq!(session.messages.len(), 20);
    }

    #[tokio::test]
    async fn test_info_and_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(dir.path(), 50, 0);
        assert!(sessions.info("u").await.is_none());
        sessions.append("u", Role::User, "x").await.unwrap();
        let info = sessions.info("u").await.unwrap();
        assert_eq!(info.message_count, 1);

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert_eq!(sessions.sweep_expired().await, 1);
        assert!(sessions.info("u").await.is_none());
    }

    #[tokio::test]
    async fn test_exchange_stays_paired_with_odd_limit() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path(), 3);
        let first = sessions.record_exchange("u", "q0", "a0").await.unwrap();
        let second = sessions.record_exchange("u", "q1", "a1").await.unwrap();

        // A pair that would not fit goes to a fresh session as a whole.
        assert_ne!(first.session_id, second.session_id);
        let history = SessionManager::format_history(&second, 10);
        let texts: Vec<&str> = history.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["q1", "a1"]);
        assert_eq!(history[0].role, Role::User);

        let old = sessions.history_of(&first.session_id).await.unwrap();
        assert_eq!(old.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_exchanges_keep_pairs_together() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(manager(dir.path(), 100));
        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let sessions = sessions.clone();
                tokio::spawn(async move {
                    sessions
                        .record_exchange("u", &format!("q{}", i), &format!("a{}", i))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        let messages = sessions.current_messages("u").await;
        assert_eq!(messages.len(), 20);
        for pair in messages.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[0].text[1..], pair[1].text[1..]);
        }
    }

    #[tokio::test]
    async fn test_sweep_covers_users_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let old = {
            let sessions = manager(dir.path(), 50);
            sessions.append("@idle:hs", Role::User, "hi").await.unwrap()
        };

        // Age the stored session as if the process had been down for two hours.
        let store = JsonStore::<UserSessions>::new(dir.path().join("sessions"));
        let mut record = store.load("@idle:hs").await;
        record.active_mut().unwrap().last_active_at = now() - 7200;
        store.save("@idle:hs", &record).await.unwrap();

        let restarted = manager(dir.path(), 50);
        assert_eq!(restarted.sweep_expired().await, 1);
        assert!(restarted.info("@idle:hs").await.is_none());
        let archived = restarted.history_of(&old.session_id).await.unwrap();
        assert_eq!(archived.messages[0].text, "hi");
        assert!(store.load("@idle:hs").await.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_failed_reset_leaves_sessions_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path(), 50);
        let before = sessions.append("u", Role::User, "hello").await.unwrap();

        // A directory where the native record belongs makes its commit fail.
        let native_path = dir
            .path()
            .join("native_sessions")
            .join(format!("{}.json", state::file_key("u")));
        std::fs::create_dir_all(native_path.join("blocker")).unwrap();

        assert!(sessions.reset("u").await.is_err());
        let info = sessions.info("u").await.unwrap();
        assert_eq!(info.session_id, before.session_id);
        assert_eq!(info.message_count, 1);
        assert!(sessions.history_of(&before.session_id).await.is_some());

        let reloaded = manager(dir.path(), 50);
        let current = reloaded.current_messages("u").await;
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].text, "hello");
        assert_eq!(
            reloaded.info("u").await.unwrap().session_id,
            before.session_id
        );
        let archive = dir.path().join("archived_sessions");
        assert!(!archive.exists() || std::fs::read_dir(&archive).unwrap().count() == 0);
    }

    #[tokio::test]
    async fn test_rotated_session_archived_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = {
            let sessions = manager(dir.path(), 1);
            let first = sessions.append("u", Role::User, "a").await.unwrap();
            let second = sessions.append("u", Role::User, "b").await.unwrap();
            assert_ne!(first.session_id, second.session_id);

            let store = JsonStore::<UserSessions>::new(dir.path().join("sessions"));
            let record = store.load("u").await;
            assert_eq!(record.sessions.len(), 1);
            assert!(record.sessions.contains_key(&second.session_id));
            first
        };

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let sweeper = SessionManager::new(dir.path(), 1, 0);
        assert_eq!(sweeper.sweep_expired().await, 1);

        let names: Vec<String> = std::fs::read_dir(dir.path().join("archived_sessions"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2);
        let copies = names
            .iter()
            .filter(|n| n.contains(&first.session_id))
            .count();
        assert_eq!(copies, 1);
    }
}
