//! # Message Handler
//!
//! Entry point for inbound chat messages: drops duplicates, strips bot mentions, answers
//! session commands locally and sends everything else through the Smart Router.
//! Every failure ends in exactly one reply; nothing propagates to the transport.

use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, error, info};

use crate::application::dedup::DedupCache;
use crate::application::formatter;
use crate::application::router::SmartRouter;
use crate::application::session::SessionManager;
use crate::domain::traits::ChatProvider;
use crate::domain::types::{Command, InboundEvent};
use crate::interface::commands;
use crate::strings::logs;

pub struct MessageHandler {
    dedup: DedupCache,
    router: Arc<SmartRouter>,
    sessions: Arc<SessionManager>,
    mention: Option<Regex>,
    spaces: Regex,
}

impl MessageHandler {
    /// `bot_names` are the names the bot answers to in group rooms (user id, localpart,
    /// display name).
    pub fn new(
        router: Arc<SmartRouter>,
        sessions: Arc<SessionManager>,
        cache_size: usize,
        bot_names: &[String],
    ) -> Result<Self> {
        let alternatives: Vec<String> = bot_names
            .iter()
            .map(|n| n.trim().trim_start_matches('@'))
            .filter(|n| !n.is_empty())
            .map(regex::escape)
            .collect();
        let mention = if alternatives.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)(^|\s)@?(?:{})[:,]?(\s|$)", alternatives.join("|"));
            Some(Regex::new(&pattern).context("Invalid bot name pattern")?)
        };
        Ok(Self {
            dedup: DedupCache::new(cache_size),
            router,
            sessions,
            mention,
            spaces: Regex::new(r"[ \t]{2,}").context("Invalid whitespace pattern")?,
        })
    }

    /// Removes bot mentions and collapses runs of spaces. Returns the cleaned text and
    /// whether the bot was mentioned.
    pub fn clean_text(&self, raw: &str) -> (String, bool) {
        let (text, mentioned) = match &self.mention {
            Some(re) if re.is_match(raw) => (re.replace_all(raw, " ").into_owned(), true),
            _ => (raw.to_string(), false),
        };
        (self.spaces.replace_all(&text, " ").trim().to_string(), mentioned)
    }

    pub async fn handle(&self, chat: &impl ChatProvider, mut event: InboundEvent, mentioned: bool) {
        if self.dedup.seen(&event.event_id) {
            debug!("{}", logs::duplicate_event(&event.event_id));
            return;
        }

        let (text, text_mentioned) = self.clean_text(&event.raw_text);
        if event.is_group && !(mentioned || text_mentioned) {
            debug!("Ignoring unmentioned group message {}", event.event_id);
            return;
        }
        if text.is_empty() {
            return;
        }
        event.raw_text = text;

        if let Err(e) = self.dispatch(chat, &event).await {
            error!("Failed to handle message {}: {:#}", event.event_id, e);
            let _ = chat
                .send_message(&formatter::format_error(&e.to_string()))
                .await;
        }
    }

    async fn dispatch(&self, chat: &impl ChatProvider, event: &InboundEvent) -> Result<()> {
        match self.router.parser().classify(&event.raw_text) {
            Command::Session(command) => {
                info!("Session command {:?} from {}", command, event.user_id);
                commands::dispatch(command, &self.sessions, chat, &event.user_id).await
            }
            Command::Prompt(_) => {
                let _ = chat.typing(true).await;
                let reply = match self.router.route(event).await {
                    Ok(decision) => formatter::format_decision(self.router.registry(), &decision),
                    Err(e) => formatter::format_error(&e.to_string()),
                };
                let _ = chat.typing(false).await;
                chat.send_message(&reply)
                    .await
                    .map(|_| ())
                    .map_err(|e| anyhow::anyhow!(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::intent::IntentClassifier;
    use crate::application::parsing::CommandParser;
    use crate::application::registry::ExecutorRegistry;
    use crate::application::router::RoutingPolicy;
    use crate::application::testing::{StaticExecutor, meta};
    use crate::domain::config::TimeoutConfig;
    use crate::domain::types::{Layer, Provider};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChat {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatProvider for RecordingChat {
        async fn send_message(&self, content: &str) -> Result<String, String> {
            self.sent.lock().unwrap().push(content.to_string());
            Ok("$reply".into())
        }

        async fn typing(&self, _active: bool) -> Result<(), String> {
            Ok(())
        }

        fn room_id(&self) -> String {
            "!room:hs".into()
        }
    }

    fn handler(
        dir: &std::path::Path,
        executor: Option<Arc<StaticExecutor>>,
    ) -> (MessageHandler, Arc<SessionManager>) {
        let mut registry = ExecutorRegistry::new(BTreeSet::new());
        if let Some(executor) = executor {
            registry
                .register(
                    Provider::Claude,
                    Layer::Api,
                    executor,
                    meta(Provider::Claude, Layer::Api, 1),
                )
                .unwrap();
        }
        let sessions = Arc::new(SessionManager::new(dir, 50, 3600));
        let router = Arc::new(SmartRouter::new(
            Arc::new(registry),
            sessions.clone(),
            CommandParser::default(),
            IntentClassifier::keywords(),
            RoutingPolicy::default(),
            TimeoutConfig::default(),
        ));
        let names = vec!["@switchyard:hs".to_string(), "Switchyard".to_string()];
        (
            MessageHandler::new(router, sessions.clone(), 100, &names).unwrap(),
            sessions,
        )
    }

    fn event(id: &str, text: &str, is_group: bool) -> InboundEvent {
        InboundEvent {
            event_id: id.into(),
            user_id: "@u:hs".into(),
            chat_id: "!room:hs".into(),
            is_group,
            raw_text: text.into(),
            quoted_text: None,
        }
    }

    #[test]
    fn test_clean_text() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _) = handler(dir.path(), None);
        assert_eq!(
            handler.clean_text("Switchyard: what  is rust?"),
            ("what is rust?".to_string(), true)
        );
        assert_eq!(
            handler.clean_text("@switchyard:hs @code list"),
            ("@code list".to_string(), true)
        );
        assert_eq!(handler.clean_text("plain"), ("plain".to_string(), false));
    }

    #[tokio::test]
    async fn test_duplicate_events_answered_once() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(StaticExecutor::ok(Provider::Claude, Layer::Api, "pong"));
        let (handler, _) = handler(dir.path(), Some(executor.clone()));
        let chat = RecordingChat::default();

        handler.handle(&chat, event("$1", "ping", false), false).await;
        handler.handle(&chat, event("$1", "ping", false), false).await;

        assert_eq!(executor.calls(), 1);
        let sent = chat.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].ends_with("pong"));
    }

    #[tokio::test]
    async fn test_group_requires_mention() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(StaticExecutor::ok(Provider::Claude, Layer::Api, "hi"));
        let (handler, _) = handler(dir.path(), Some(executor.clone()));
        let chat = RecordingChat::default();

        handler.handle(&chat, event("$1", "hello all", true), false).await;
        assert_eq!(executor.calls(), 0);

        handler.handle(&chat, event("$2", "Switchyard: hello", true), false).await;
        handler.handle(&chat, event("$3", "hello", true), true).await;
        assert_eq!(executor.calls(), 2);
        assert_eq!(executor.requests()[0].prompt, "hello");
    }

    #[tokio::test]
    async fn test_session_commands_bypass_router() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(StaticExecutor::ok(Provider::Claude, Layer::Api, "x"));
        let (handler, sessions) = handler(dir.path(), Some(executor.clone()));
        let chat = RecordingChat::default();

        handler.handle(&chat, event("$1", "hello", false), false).await;
        handler.handle(&chat, event("$2", "/new", false), false).await;
        handler.handle(&chat, event("$3", "/help", false), false).await;

        assert_eq!(executor.calls(), 1);
        assert!(sessions.current_messages("@u:hs").await.is_empty());
        let sent = chat.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1], crate::strings::messages::NEW_SESSION_CREATED);
        assert_eq!(sent[2], crate::strings::help::MAIN);
    }

    #[tokio::test]
    async fn test_no_executor_single_error_reply() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _) = handler(dir.path(), None);
        let chat = RecordingChat::default();
        handler.handle(&chat, event("$1", "hello", false), false).await;
        let sent = chat.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("❌ **Error**: no executor available"));
    }
}
