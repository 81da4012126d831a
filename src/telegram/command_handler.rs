use std::sync::Arc;

use teloxide::types::BotCommand;
use tracing::{debug, info};

use crate::bridge::listener::{ListenerError, ListenerStatus};
use crate::bridge::routing::RouteError;
use crate::bridge::{BridgeCore, BridgeError};
use crate::db::RouteEntry;
use crate::parsers::{MessageUtils, ParsedCommand, parse_prefixed_command};

const COMMAND_PREFIX: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Ignored,
    Reply(String),
}

pub fn command_menu() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Show the relay menu"),
        BotCommand::new("help", "List available commands"),
        BotCommand::new("routes", "List your routes"),
        BotCommand::new("addroute", "Add a route: /addroute <source> <dest>[,<dest>...]"),
        BotCommand::new("delroute", "Delete a route: /delroute <id>"),
        BotCommand::new("toggle", "Pause or resume a route: /toggle <id>"),
        BotCommand::new("status", "Show listener status"),
        BotCommand::new("restart", "Start or restart the listener"),
        BotCommand::new("stop", "Stop the listener"),
        BotCommand::new("reload", "Reload routes into the running listener"),
    ]
}

fn help_text() -> String {
    let mut lines = vec!["Relay commands:".to_string()];
    for command in command_menu() {
        lines.push(format!("/{} - {}", command.command, command.description));
    }
    lines.join("\n")
}

/// Turns operator commands into core calls. `owner_id` is the Telegram user
/// id of the sender, already checked against the configured owners.
pub struct TelegramCommandHandler {
    core: Arc<BridgeCore>,
}

impl TelegramCommandHandler {
    pub fn new(core: Arc<BridgeCore>) -> Self {
        Self { core }
    }

    pub async fn handle(&self, owner_id: i64, text: &str) -> CommandOutcome {
        let Some(command) = parse_prefixed_command(COMMAND_PREFIX, text) else {
            return CommandOutcome::Ignored;
        };
        debug!("operator command owner={owner_id} name={}", command.name);

        let reply = match command.name.as_str() {
            "start" | "help" => help_text(),
            "routes" => self.list_routes(owner_id).await,
            "addroute" => self.add_route(owner_id, &command).await,
            "delroute" => self.delete_route(owner_id, &command).await,
            "toggle" => self.toggle_route(owner_id, &command).await,
            "status" => format_status(&self.core.status()),
            "restart" => match self.core.start_listener(owner_id).await {
                Ok(status) => format!("Listener started.\n{}", format_status(&status)),
                Err(err) => format!("Could not start listener: {}", describe(&err)),
            },
            "stop" => match self.core.stop_listener().await {
                Ok(_) => "Listener stopped.".to_string(),
                Err(err) => format!("Could not stop listener: {}", describe(&err)),
            },
            "reload" => match self.core.reload_listener().await {
                Ok(status) => format!("Reloaded, {} source(s) monitored.", status.monitored.len()),
                Err(err) => describe(&err),
            },
            other => format!("Unknown command /{other}. Send /help for the list."),
        };

        CommandOutcome::Reply(reply)
    }

    async fn list_routes(&self, owner_id: i64) -> String {
        match self.core.list_routes(owner_id).await {
            Ok(routes) if routes.is_empty() => {
                "No routes yet. Add one with /addroute <source> <dest>.".to_string()
            }
            Ok(routes) => routes.iter().map(format_route).collect::<Vec<_>>().join("\n"),
            Err(err) => describe(&err),
        }
    }

    async fn add_route(&self, owner_id: i64, command: &ParsedCommand) -> String {
        let Some(source) = command.arg(0) else {
            return "Usage: /addroute <source> <dest>[,<dest>...]".to_string();
        };
        let destinations = MessageUtils::split_handle_list(&command.args[1..].join(" "));

        match self.core.add_route(owner_id, source, &destinations).await {
            Ok(entry) => {
                info!("route added via command owner={owner_id} id={}", entry.id);
                format!("Route added.\n{}", format_route(&entry))
            }
            Err(err) => describe(&err),
        }
    }

    async fn delete_route(&self, owner_id: i64, command: &ParsedCommand) -> String {
        let Some(route_id) = route_id_arg(command) else {
            return "Usage: /delroute <id>".to_string();
        };
        match self.core.remove_route(owner_id, route_id).await {
            Ok(entry) => format!("Route #{} ({}) deleted.", entry.id, entry.source),
            Err(err) => describe(&err),
        }
    }

    async fn toggle_route(&self, owner_id: i64, command: &ParsedCommand) -> String {
        let Some(route_id) = route_id_arg(command) else {
            return "Usage: /toggle <id>".to_string();
        };
        match self.core.toggle_route(owner_id, route_id).await {
            Ok(entry) => format!(
                "Route #{} is now {}.",
                entry.id,
                if entry.active { "active" } else { "paused" }
            ),
            Err(err) => describe(&err),
        }
    }
}

fn route_id_arg(command: &ParsedCommand) -> Option<i64> {
    command
        .arg(0)
        .map(|raw| raw.trim_start_matches('#'))
        .and_then(|raw| raw.parse().ok())
}

fn format_route(entry: &RouteEntry) -> String {
    format!(
        "#{} {} -> {} [{}]",
        entry.id,
        entry.source,
        entry.destinations.join(", "),
        if entry.active { "active" } else { "paused" }
    )
}

fn format_status(status: &ListenerStatus) -> String {
    let mut lines = vec![format!("Listener: {}", status.state)];
    if let Some(owner_id) = status.owner_id {
        lines.push(format!("Owner: {owner_id}"));
    }
    if !status.monitored.is_empty() {
        lines.push(format!("Monitoring: {}", status.monitored.join(", ")));
    }
    if let Some(error) = &status.last_error {
        lines.push(format!("Last error: {error}"));
    }
    lines.join("\n")
}

fn describe(err: &BridgeError) -> String {
    match err {
        BridgeError::Route(RouteError::Duplicate { handle, .. }) => {
            format!("{handle} is already routed. Delete or toggle the existing route.")
        }
        BridgeError::Route(RouteError::NotFound(id)) => format!("Route #{id} not found."),
        BridgeError::Listener(ListenerError::NotRunning) => {
            "Listener is not running. Use /restart first.".to_string()
        }
        other => other.to_string(),
    }
}
