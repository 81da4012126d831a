use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::payloads::GetUpdatesSetters;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, UpdateKind};
use tracing::{debug, info, warn};

use crate::bridge::listener::ListenerError;
use crate::bridge::transport::{SourceConnector, SourceEvent, SourceStream};
use crate::db::{CredentialSet, SessionArtifact};

use super::source_event;

const MAX_CONSECUTIVE_POLL_FAILURES: u32 = 3;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Opens the reader bot whose token is carried by the session artifact.
///
/// The Bot API authenticates with a token alone, so the owner's api id and
/// hash are only checked for completeness before a stream is opened.
pub struct TelegramConnector {
    poll_timeout_secs: u32,
}

impl TelegramConnector {
    pub fn new(poll_timeout_secs: u64) -> Self {
        Self {
            poll_timeout_secs: u32::try_from(poll_timeout_secs).unwrap_or(u32::MAX),
        }
    }
}

pub(crate) fn session_token(session: &SessionArtifact) -> Result<String, ListenerError> {
    let token = std::str::from_utf8(&session.data)
        .map_err(|_| ListenerError::Connect(format!("session {} is not valid UTF-8", session.filename)))?
        .trim();
    if token.is_empty() || !token.contains(':') {
        return Err(ListenerError::Connect(format!(
            "session {} does not hold a bot token",
            session.filename
        )));
    }
    Ok(token.to_string())
}

#[async_trait]
impl SourceConnector for TelegramConnector {
    async fn connect(
        &self,
        credentials: &CredentialSet,
        session: &SessionArtifact,
    ) -> Result<Box<dyn SourceStream>, ListenerError> {
        let bot = Bot::new(session_token(session)?);
        let me = bot
            .get_me()
            .await
            .map_err(|err| ListenerError::Connect(err.to_string()))?;

        info!(
            "source stream connected owner={} api_id={} reader=@{}",
            credentials.owner_id,
            credentials.api_id,
            me.username()
        );

        Ok(Box::new(TelegramSourceStream {
            bot,
            offset: 0,
            poll_timeout_secs: self.poll_timeout_secs,
            pending: VecDeque::new(),
            closed: false,
        }))
    }
}

pub struct TelegramSourceStream {
    bot: Bot,
    offset: i32,
    poll_timeout_secs: u32,
    pending: VecDeque<SourceEvent>,
    closed: bool,
}

impl TelegramSourceStream {
    async fn poll(&mut self) -> Result<(), ListenerError> {
        let mut failures = 0;
        loop {
            let request = self
                .bot
                .get_updates()
                .offset(self.offset)
                .timeout(self.poll_timeout_secs)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost]);

            match request.await {
                Ok(updates) => {
                    for update in updates {
                        #[allow(clippy::cast_possible_wrap)]
                        let id = update.id.0 as i32;
                        self.offset = id + 1;

                        match update.kind {
                            UpdateKind::Message(ref msg) | UpdateKind::ChannelPost(ref msg) => {
                                self.pending.push_back(source_event(msg));
                            }
                            _ => debug!("ignoring update id={id}"),
                        }
                    }
                    return Ok(());
                }
                Err(err) => {
                    failures += 1;
                    if failures >= MAX_CONSECUTIVE_POLL_FAILURES {
                        return Err(ListenerError::Stream(err.to_string()));
                    }
                    warn!("getUpdates failed attempt={failures}: {err}");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    }
}

#[async_trait]
impl SourceStream for TelegramSourceStream {
    async fn next_event(&mut self) -> Option<Result<SourceEvent, ListenerError>> {
        loop {
            if self.closed {
                return None;
            }
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if let Err(err) = self.poll().await {
                return Some(Err(err));
            }
        }
    }

    async fn close(&mut self) -> Result<(), ListenerError> {
        self.closed = true;
        self.pending.clear();
        debug!("source stream closed at offset={}", self.offset);
        Ok(())
    }
}
