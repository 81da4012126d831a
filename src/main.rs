#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::{ExposeSecret, SecretString};
use teloxide::Bot;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod bridge;
mod cli;
mod config;
mod db;
mod parsers;
mod telegram;
mod utils;
mod web;

use bridge::BridgeCore;
use cli::{Cli, Command};
use config::Config;
use db::DatabaseManager;
use parsers::TextNormalizer;
use telegram::{CommandService, TelegramCommandHandler, TelegramConnector, TelegramSender};
use web::WebServer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::CheckFilter { text } = cli.command() {
        let filter = Config::load(cli.config.as_deref())
            .map(|config| config.filter)
            .unwrap_or_default();
        let normalizer = TextNormalizer::new(filter.arabic_mode, &filter.extra_stopwords);
        println!("{}", normalizer.normalize(&text.join(" ")));
        return Ok(());
    }

    let config = Arc::new(Config::load(cli.config.as_deref()).context("failed to load config")?);
    utils::logging::init_tracing(&config.logging);

    let db_manager = Arc::new(DatabaseManager::new(&config.database).await?);
    db_manager.migrate().await?;

    let control_bot = Bot::new(config.auth.bot_token.expose_secret());
    let bridge = Arc::new(BridgeCore::new(
        &config,
        db_manager,
        Arc::new(TelegramConnector::new(config.listener.poll_timeout_secs)),
        Arc::new(TelegramSender::from_bot(control_bot.clone())),
    ));

    match cli.command() {
        Command::Run { owner } => run(config, bridge, control_bot, owner).await,
        Command::SetCredentials {
            owner,
            api_id,
            api_hash,
        } => {
            bridge
                .set_credentials(owner, api_id, SecretString::from(api_hash))
                .await?;
            println!("credentials stored for owner {owner}");
            Ok(())
        }
        Command::ImportSession { owner, file } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| "session".to_string());
            bridge.import_session(owner, &filename, &data).await?;
            println!("session {filename} stored for owner {owner}");
            Ok(())
        }
        Command::CheckFilter { .. } => Ok(()),
    }
}

async fn run(
    config: Arc<Config>,
    bridge: Arc<BridgeCore>,
    control_bot: Bot,
    owner_override: Option<i64>,
) -> Result<()> {
    info!("telegram channel relay starting up");

    if let Some(owner_id) = owner_override.or(config.listener.autostart_owner) {
        match bridge.start_listener(owner_id).await {
            Ok(status) => info!(
                "listener autostarted owner={owner_id} monitored={}",
                status.monitored.len()
            ),
            Err(err) => warn!("listener autostart failed owner={owner_id}: {err}"),
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    if config.auth.owner_ids.is_empty() {
        warn!("auth.owner_ids is empty, command menu disabled");
    } else {
        let service = Arc::new(CommandService::new(
            control_bot,
            TelegramCommandHandler::new(bridge.clone()),
            config.auth.owner_ids.iter().copied(),
            config.auth.command_poll_timeout_secs,
            !config.auth.disable_command_menu,
        ));
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = service.run(shutdown).await {
                error!("command service error: {}", e);
            }
        }));
    }

    if config.provisioning.enabled {
        let web_server = WebServer::new(config.provisioning.clone(), bridge.clone());
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = web_server.start(shutdown).await {
                error!("web server error: {}", e);
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Err(err) = bridge.stop_listener().await {
        warn!("listener stop during shutdown failed: {err}");
    }
    for handle in handles {
        let _ = handle.await;
    }

    info!("telegram channel relay shut down");
    Ok(())
}
