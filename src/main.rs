#![recursion_limit = "256"]
//! # Main Entry Point
//!
//! Wires the layers together:
//! - Domain: Configuration and Types
//! - Infrastructure: Matrix, LLM clients, Executors
//! - Application: Dedup, Parsing, Intent, Registry, Sessions, Router, Handler
//! - Interface: Session command handlers
//!

mod application;
mod domain;
mod infrastructure;
mod interface;
mod strings;

use anyhow::{Context, Result};
use clap::Parser;
use matrix_sdk::{
    Client,
    config::SyncSettings,
    room::Room,
    ruma::events::room::{
        member::{MembershipState, StrippedRoomMemberEvent},
        message::SyncRoomMessageEvent,
    },
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::application::handler::MessageHandler;
use crate::application::logging;
use crate::application::router::SmartRouter;
use crate::application::session::SessionManager;
use crate::domain::config::AppConfig;
use crate::infrastructure::executors;
use crate::infrastructure::matrix::MatrixService;
use crate::strings::logs;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Parser, Debug)]
#[command(name = "switchyard", about = "Routes chat messages to AI backends")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "data/config.yaml")]
    config: PathBuf,

    /// Directory for sessions, archives and logs (overrides `session.storage_dir`)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load Configuration
    let mut config = AppConfig::load(&args.config)?;
    if let Some(dir) = args.data_dir {
        config.session.storage_dir = dir;
    }

    // 2. Logging Setup
    let _guard = logging::init(&config.logging, &config.session.storage_dir)?;
    tracing::info!("{}", logs::config_loaded(&config.services.matrix.username));

    // 3. Routing Core
    let registry = Arc::new(executors::build_registry(&config)?);
    let sessions = Arc::new(SessionManager::from_config(&config.session));
    let router = Arc::new(SmartRouter::from_config(
        &config,
        registry.clone(),
        sessions.clone(),
    ));

    // 4. Matrix Setup
    let client = Client::builder()
        .homeserver_url(&config.services.matrix.homeserver)
        .build()
        .await
        .context("Failed to build Matrix client")?;

    client
        .matrix_auth()
        .login_username(
            &config.services.matrix.username,
            &config.services.matrix.password,
        )
        .initial_device_display_name("switchyard")
        .send()
        .await
        .context("Matrix login failed")?;
    tracing::info!("{}", logs::LOGIN_SUCCESS);

    if let Some(name) = &config.services.matrix.display_name {
        tracing::info!("{}", logs::setting_display_name(name));
        if let Err(e) = client.account().set_display_name(Some(name.as_str())).await {
            tracing::warn!("{}", logs::set_display_name_fail(&e.to_string()));
        }
    }

    let own_user = client
        .user_id()
        .context("Logged in client has no user id")?
        .to_owned();

    let mut bot_names = vec![
        own_user.to_string(),
        own_user.localpart().to_string(),
        config.services.matrix.username.clone(),
    ];
    bot_names.extend(config.services.matrix.display_name.clone());
    let handler = Arc::new(MessageHandler::new(
        router,
        sessions.clone(),
        config.cache_size,
        &bot_names,
    )?);

    // 5. Event Handlers
    let start_time = std::time::SystemTime::now();
    let loop_handler = handler.clone();
    let loop_user = own_user.clone();

    client.add_event_handler(move |ev: SyncRoomMessageEvent, room: Room| {
        let handler = loop_handler.clone();
        let own_user = loop_user.clone();

        async move {
            let Some(original) = ev.as_original() else {
                return;
            };

            // Ignore events older than start_time
            let ts = ev.origin_server_ts();
            let event_time = std::time::UNIX_EPOCH + Duration::from_millis(ts.get().into());
            if event_time < start_time || original.sender == own_user {
                return;
            }

            let chat = MatrixService::new(room);
            let Some((event, mentioned)) = chat.inbound_event(original, &own_user) else {
                return;
            };
            tracing::info!("Received message from {}: \n{}", event.user_id, event.raw_text);

            // Routed calls can take minutes; keep the sync loop moving.
            tokio::spawn(async move {
                handler.handle(&chat, event, mentioned).await;
            });
        }
    });

    // Handle Invites
    client.add_event_handler(|ev: StrippedRoomMemberEvent, room: Room| async move {
        if ev.content.membership != MembershipState::Invite {
            return;
        }
        tracing::info!("{}", logs::invite_received(room.room_id().as_str()));
        match room.join().await {
            Ok(_) => tracing::info!("{}", logs::JOIN_INVITE_SUCCESS),
            Err(e) => tracing::error!("{}", logs::join_invite_fail(&e.to_string())),
        }
    });

    // 6. Expired Session Sweep
    let sweep_sessions = sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = sweep_sessions.sweep_expired().await;
            tracing::info!("{}", logs::sweep_done(removed));
        }
    });

    // 7. Start Sync
    tracing::info!("{}", logs::SYNC_LOOP_START);
    let sync_client = client.clone();
    let sync_handle = tokio::spawn(async move { sync_client.sync(SyncSettings::default()).await });

    tokio::select! {
        res = sync_handle => match res {
            Ok(Err(e)) => tracing::error!("{}", logs::sync_loop_fail(&e.to_string())),
            Err(e) => tracing::error!("{}", logs::sync_loop_fail(&e.to_string())),
            Ok(Ok(())) => {}
        },
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => tracing::info!("{}", logs::SHUTDOWN),
            Err(e) => tracing::error!("{}", logs::shutdown_fail(&e.to_string())),
        },
    }

    Ok(())
}
