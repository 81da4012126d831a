use async_trait::async_trait;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::Recipient;
use tracing::debug;

use crate::bridge::transport::{MessageSender, SendError};

/// Sends cleaned text through the control bot.
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn from_bot(bot: Bot) -> Self {
        Self { bot }
    }
}

pub(crate) fn recipient(destination: &str) -> Recipient {
    match destination.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(destination.to_string()),
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send(&self, destination: &str, text: &str) -> Result<(), SendError> {
        match self.bot.send_message(recipient(destination), text).await {
            Ok(message) => {
                debug!("delivered to {destination} message_id={}", message.id.0);
                Ok(())
            }
            Err(RequestError::Api(api)) => Err(SendError::Rejected(
                destination.to_string(),
                api.to_string(),
            )),
            Err(err) => Err(SendError::Transport(err.to_string())),
        }
    }
}
