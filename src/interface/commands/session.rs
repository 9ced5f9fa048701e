//! # Session Commands
//!
//! Handles `/new`, `/session` and `/history`. Answered directly from the session manager;
//! no executor is involved.

use crate::application::session::SessionManager;
use crate::domain::traits::ChatProvider;
use crate::domain::types::Role;
use crate::strings::messages;
use anyhow::Result;

const PREVIEW_CHARS: usize = 100;

pub async fn handle_new(sessions: &SessionManager, chat: &impl ChatProvider, user_id: &str) -> Result<()> {
    let reply = new_session_reply(sessions, user_id).await;
    send(chat, &reply).await
}

pub async fn handle_session(sessions: &SessionManager, chat: &impl ChatProvider, user_id: &str) -> Result<()> {
    let reply = session_info_reply(sessions, user_id).await;
    send(chat, &reply).await
}

pub async fn handle_history(sessions: &SessionManager, chat: &impl ChatProvider, user_id: &str) -> Result<()> {
    let reply = history_reply(sessions, user_id).await;
    send(chat, &reply).await
}

pub async fn new_session_reply(sessions: &SessionManager, user_id: &str) -> String {
    match sessions.reset(user_id).await {
        Ok(_) => messages::NEW_SESSION_CREATED.to_string(),
        Err(e) => {
            tracing::error!("Session reset failed for {}: {:#}", user_id, e);
            messages::session_failed(&e.to_string())
        }
    }
}

pub async fn session_info_reply(sessions: &SessionManager, user_id: &str) -> String {
    match sessions.info(user_id).await {
        Some(info) => {
            let short: String = info.session_id.chars().take(8).collect();
            messages::session_info(&short, info.message_count, info.age_seconds)
        }
        None => messages::NO_ACTIVE_SESSION.to_string(),
    }
}

pub async fn history_reply(sessions: &SessionManager, user_id: &str) -> String {
    let history = sessions.current_messages(user_id).await;
    if history.is_empty() {
        return messages::NO_HISTORY.to_string();
    }
    let mut lines = vec![messages::HISTORY_HEADER.to_string()];
    for (i, msg) in history.iter().enumerate() {
        lines.push(messages::history_line(
            i + 1,
            msg.role == Role::User,
            &preview(&msg.text),
        ));
    }
    lines.join("\n")
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

async fn send(chat: &impl ChatProvider, reply: &str) -> Result<()> {
    chat.send_message(reply)
        .await
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!(e))
}
