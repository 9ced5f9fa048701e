//! # Matrix Service Adapter
//!
//! Implements the `ChatProvider` trait for the Matrix protocol using the `matrix_sdk`,
//! and converts room messages into `InboundEvent`s for the routing core.

use crate::domain::traits::ChatProvider;
use crate::domain::types::InboundEvent;
use async_trait::async_trait;
use matrix_sdk::room::Room;
use matrix_sdk::ruma::OwnedUserId;
use matrix_sdk::ruma::events::room::message::{
    MessageType, OriginalSyncRoomMessageEvent, RoomMessageEventContent,
};

#[derive(Clone)]
pub struct MatrixService {
    room: Room,
}

impl MatrixService {
    pub fn new(room: Room) -> Self {
        Self { room }
    }

    /// Builds an `InboundEvent` from a text message. Returns `None` for other message types.
    /// The boolean is true when the message explicitly mentions `own_user`.
    pub fn inbound_event(
        &self,
        ev: &OriginalSyncRoomMessageEvent,
        own_user: &OwnedUserId,
    ) -> Option<(InboundEvent, bool)> {
        let MessageType::Text(text) = &ev.content.msgtype else {
            return None;
        };
        let (quoted_text, raw_text) = split_reply_fallback(&text.body);
        let mentioned = ev
            .content
            .mentions
            .as_ref()
            .is_some_and(|m| m.user_ids.contains(own_user));

        let event = InboundEvent {
            event_id: ev.event_id.to_string(),
            user_id: ev.sender.to_string(),
            chat_id: self.room_id(),
            is_group: self.room.joined_members_count() > 2,
            raw_text,
            quoted_text,
        };
        Some((event, mentioned))
    }
}

#[async_trait]
impl ChatProvider for MatrixService {
    fn room_id(&self) -> String {
        self.room.room_id().as_str().to_string()
    }

    async fn send_message(&self, content: &str) -> Result<String, String> {
        tracing::info!("Bot sending message to {}: {}", self.room_id(), content);
        self.room
            .send(RoomMessageEventContent::text_markdown(content))
            .await
            .map(|resp| resp.event_id.to_string())
            .map_err(|e| e.to_string())
    }

    async fn typing(&self, active: bool) -> Result<(), String> {
        self.room
            .typing_notice(active)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Splits a Matrix reply body into the quoted fallback and the reply text.
///
/// Reply bodies start with `> <@sender> quoted` lines followed by a blank line.
pub fn split_reply_fallback(body: &str) -> (Option<String>, String) {
    if !body.starts_with("> ") {
        return (None, body.to_string());
    }

    let mut quoted = Vec::new();
    let mut rest = Vec::new();
    let mut in_quote = true;
    for line in body.lines() {
        if in_quote {
            if let Some(q) = line.strip_prefix("> ").or_else(|| line.strip_prefix('>')) {
                quoted.push(q);
                continue;
            }
            in_quote = false;
            if line.is_empty() {
                continue;
            }
        }
        rest.push(line);
    }

    if let Some(first) = quoted.first_mut()
        && first.starts_with('<')
        && let Some(end) = first.find("> ")
    {
        *first = &first[end + 2..];
    }

    let quoted = quoted.join("\n").trim().to_string();
    let text = rest.join("\n");
    if quoted.is_empty() {
        (None, text)
    } else {
        (Some(quoted), text)
    }
}
