//! # Command Handlers
//!
//! Handler functions for the session-control commands (/new, /session, /history, /help).
//! These handlers are invoked by the message handler and never reach an executor.

pub mod help;
pub mod session;

use crate::application::session::SessionManager;
use crate::domain::traits::ChatProvider;
use crate::domain::types::SessionCommand;
use anyhow::Result;

pub async fn dispatch(
    command: SessionCommand,
    sessions: &SessionManager,
    chat: &impl ChatProvider,
    user_id: &str,
) -> Result<()> {
    match command {
        SessionCommand::New => session::handle_new(sessions, chat, user_id).await,
        SessionCommand::Info => session::handle_session(sessions, chat, user_id).await,
        SessionCommand::History => session::handle_history(sessions, chat, user_id).await,
        SessionCommand::Help => help::handle_help(chat).await,
    }
}
