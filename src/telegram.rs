//! teloxide adapters: the source stream, the outbound sender and the operator
//! command menu served by the control bot.

use teloxide::types::Message;

use crate::bridge::transport::SourceEvent;

pub mod command_handler;
pub mod command_service;
pub mod sender;
pub mod source;

pub use self::command_handler::TelegramCommandHandler;
pub use self::command_service::CommandService;
pub use self::sender::TelegramSender;
pub use self::source::TelegramConnector;

/// Converts a chat message or channel post into the transport-neutral event.
pub fn source_event(msg: &Message) -> SourceEvent {
    SourceEvent {
        source: msg.chat.username().map(str::to_string),
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        has_media: has_media(msg),
    }
}

pub fn has_media(msg: &Message) -> bool {
    msg.photo().is_some()
        || msg.video().is_some()
        || msg.document().is_some()
        || msg.audio().is_some()
        || msg.voice().is_some()
        || msg.animation().is_some()
        || msg.sticker().is_some()
        || msg.video_note().is_some()
}
