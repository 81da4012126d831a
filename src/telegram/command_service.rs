use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use teloxide::payloads::GetUpdatesSetters;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, UpdateKind};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::command_handler::{CommandOutcome, TelegramCommandHandler, command_menu};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Long-polls the control bot and answers operator commands in private chats.
pub struct CommandService {
    bot: Bot,
    handler: TelegramCommandHandler,
    owners: HashSet<i64>,
    poll_timeout_secs: u32,
    publish_menu: bool,
}

impl CommandService {
    pub fn new(
        bot: Bot,
        handler: TelegramCommandHandler,
        owners: impl IntoIterator<Item = i64>,
        poll_timeout_secs: u64,
        publish_menu: bool,
    ) -> Self {
        Self {
            bot,
            handler,
            owners: owners.into_iter().collect(),
            poll_timeout_secs: u32::try_from(poll_timeout_secs).unwrap_or(u32::MAX),
            publish_menu,
        }
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owners.contains(&user_id)
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.publish_menu {
            if let Err(err) = self.bot.set_my_commands(command_menu()).await {
                warn!("failed to publish command menu: {err}");
            }
        }
        info!("command service polling owners={}", self.owners.len());

        let mut offset: i32 = 0;
        loop {
            let request = self
                .bot
                .get_updates()
                .offset(offset)
                .timeout(self.poll_timeout_secs)
                .allowed_updates(vec![AllowedUpdate::Message]);

            let updates = tokio::select! {
                _ = shutdown.changed() => break,
                result = request.send() => result,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(err) => {
                    error!("control bot getUpdates failed: {err}");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => continue,
                    }
                }
            };

            for update in updates {
                #[allow(clippy::cast_possible_wrap)]
                let id = update.id.0 as i32;
                offset = id + 1;

                if let UpdateKind::Message(msg) = update.kind {
                    self.handle_message(&msg).await;
                }
            }
        }

        info!("command service stopped");
        Ok(())
    }

    async fn handle_message(&self, msg: &Message) {
        if !msg.chat.is_private() {
            return;
        }
        let Some(text) = msg.text() else {
            return;
        };
        #[allow(clippy::cast_possible_wrap)]
        let Some(user_id) = msg.from.as_ref().map(|user| user.id.0 as i64) else {
            return;
        };

        if !self.is_owner(user_id) {
            debug!("ignoring command from non-owner user={user_id}");
            if text.starts_with('/') {
                self.reply(msg.chat.id, "You are not allowed to operate this relay.")
                    .await;
            }
            return;
        }

        if let CommandOutcome::Reply(reply) = self.handler.handle(user_id, text).await {
            self.reply(msg.chat.id, &reply).await;
        }
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(err) = self.bot.send_message(chat_id, text).await {
            warn!("failed to reply to chat={}: {err}", chat_id.0);
        }
    }
}
