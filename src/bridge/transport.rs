//! Seams between the relay core and the Telegram transport.

use async_trait::async_trait;
use thiserror::Error;

use crate::db::{CredentialSet, SessionArtifact};

use super::listener::ListenerError;

/// One inbound message as seen by the core. The transport adapter computes
/// `has_media` once so the core never inspects message types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    pub source: Option<String>,
    pub text: Option<String>,
    pub has_media: bool,
}

impl SourceEvent {
    pub fn text(source: &str, text: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            text: Some(text.to_string()),
            has_media: false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("destination `{0}` rejected the message: {1}")]
    Rejected(String, String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, destination: &str, text: &str) -> Result<(), SendError>;
}

#[async_trait]
pub trait SourceStream: Send {
    /// `None` means the stream ended.
    async fn next_event(&mut self) -> Option<Result<SourceEvent, ListenerError>>;
    async fn close(&mut self) -> Result<(), ListenerError>;
}

#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: &CredentialSet,
        session: &SessionArtifact,
    ) -> Result<Box<dyn SourceStream>, ListenerError>;
}
