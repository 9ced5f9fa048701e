//! # Persistent State
//!
//! Per-user JSON records on disk: platform sessions (`sessions/<user>.json`) and the
//! provider-native session map (`native_sessions/<user>.json`).
//! Writes go to a temporary file that is renamed over the record, so a reader never sees a
//! partially written file. A record that fails to parse is set aside and replaced by an
//! empty one.

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::domain::types::{Provider, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub text: String,
    pub timestamp: i64,
}

/// A platform conversation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    pub created_at: i64,
    pub last_active_at: i64,
}

impl Session {
    pub fn new(user_id: &str, now: i64) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            messages: Vec::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn is_expired(&self, timeout_secs: i64, now: i64) -> bool {
        now - self.last_active_at > timeout_secs
    }

    /// True when `incoming` more messages would overflow a non-empty session, or when the
    /// session is idle past the timeout.
    pub fn should_rotate(&self, max_messages: usize, incoming: usize, timeout_secs: i64, now: i64) -> bool {
        let overflow =
            !self.messages.is_empty() && self.messages.len() + incoming > max_messages;
        overflow || self.is_expired(timeout_secs, now)
    }
}

/// All sessions of one user, plus which one is active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSessions {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub sessions: HashMap<String, Session>,
    #[serde(default)]
    pub active_session: Option<String>,
}

impl UserSessions {
    pub fn active(&self) -> Option<&Session> {
        self.active_session
            .as_ref()
            .and_then(|id| self.sessions.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut Session> {
        match &self.active_session {
            Some(id) => self.sessions.get_mut(id),
            None => None,
        }
    }
}

/// Provider-native session ids of one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeSessions {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub map: BTreeMap<Provider, String>,
}

/// Directory of JSON records, one file per user.
#[derive(Debug, Clone)]
pub struct JsonStore<T> {
    dir: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _marker: PhantomData,
        }
    }

    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_key(user_id)))
    }

    /// Missing records load as default. Corrupt records are renamed to `*.corrupt` and
    /// load as default.
    pub async fn load(&self, user_id: &str) -> T {
        let path = self.path_for(user_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                return T::default();
            }
        };
        match serde_json::from_str::<T>(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "Corrupt record {} ({}), starting with an empty one",
                    path.display(),
                    e
                );
                let aside = path.with_extension("json.corrupt");
                if let Err(e) = tokio::fs::rename(&path, &aside).await {
                    error!("Failed to set aside {}: {}", path.display(), e);
                }
                T::default()
            }
        }
    }

    /// Writes the record to a temporary file next to its final path.
    pub async fn stage(&self, user_id: &str, value: &T) -> Result<StagedWrite> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let target = self.path_for(user_id);
        let temp = target.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(value).context("Failed to serialize record")?;
        tokio::fs::write(&temp, content)
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        Ok(StagedWrite { temp, target })
    }

    pub async fn save(&self, user_id: &str, value: &T) -> Result<()> {
        self.stage(user_id, value).await?.commit().await
    }

    /// User ids that have a record on disk, sorted.
    pub async fn users(&self) -> Vec<String> {
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return Vec::new();
        };
        let mut users = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = name.strip_suffix(".json")
                && let Some(user_id) = user_from_key(key)
            {
                users.push(user_id);
            }
        }
        users.sort();
        users
    }
}

/// A record written to its temporary path, not yet visible.
#[derive(Debug)]
pub struct StagedWrite {
    temp: PathBuf,
    target: PathBuf,
}

impl StagedWrite {
    /// Renames the temporary file over the record. On failure the temporary file is removed
    /// and the record is left as it was.
    pub async fn commit(self) -> Result<()> {
        if let Err(e) = tokio::fs::rename(&self.temp, &self.target).await {
            let _ = tokio::fs::remove_file(&self.temp).await;
            return Err(e)
                .with_context(|| format!("Failed to replace {}", self.target.display()));
        }
        Ok(())
    }

    pub async fn discard(self) {
        let _ = tokio::fs::remove_file(&self.temp).await;
    }
}

/// Writes a finished session to `<dir>/<user>_<session>_<ts>.json`.
pub async fn archive_session(dir: &Path, session: &Session, now: i64) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!(
        "{}_{}_{}.json",
        file_key(&session.user_id),
        session.session_id,
        now
    ));
    let content = serde_json::to_string_pretty(session).context("Failed to serialize session")?;
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Looks a session up in the archive by id. The most recent archive wins.
pub async fn find_archived(dir: &Path, session_id: &str) -> Option<Session> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let needle = format!("_{}_", session_id);
    let mut newest: Option<(String, PathBuf)> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.contains(&needle) || !name.ends_with(".json") {
            continue;
        }
        if newest.as_ref().is_none_or(|(n, _)| name > *n) {
            newest = Some((name, entry.path()));
        }
    }
    let (_, path) = newest?;
    let content = tokio::fs::read_to_string(&path).await.ok()?;
    match serde_json::from_str(&content) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!("Unreadable archive {}: {}", path.display(), e);
            None
        }
    }
}

/// File-name-safe, reversible encoding of a user id. Alphanumerics, `-` and `.` are kept;
/// every other byte becomes `%XX`, so `_` never appears in the output.
pub fn file_key(user_id: &str) -> String {
    let mut out = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    if out.starts_with('.') {
        out.replace_range(0..1, "%2E");
    }
    out
}

/// Inverse of [`file_key`]. `None` for names that are not valid keys.
pub fn user_from_key(key: &str) -> Option<String> {
    let bytes = key.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = key.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
