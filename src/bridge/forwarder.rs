use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::db::{LogStatus, LogStore, NewLogEntry};
use crate::parsers::{MessageUtils, TextNormalizer, canonical_handle};

use super::decision::{ForwardOutcome, SkipReason, decide};
use super::listener::EventSink;
use super::routing::RouteSnapshot;
use super::transport::{MessageSender, SourceEvent};

/// Result of one destination send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub destination: String,
    pub status: LogStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardReport {
    Skipped(SkipReason),
    Delivered(Vec<Delivery>),
}

/// Applies forwarding decisions and writes the audit trail.
pub struct Forwarder {
    sender: Arc<dyn MessageSender>,
    logs: Arc<dyn LogStore>,
    normalizer: Arc<TextNormalizer>,
}

impl Forwarder {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        logs: Arc<dyn LogStore>,
        normalizer: Arc<TextNormalizer>,
    ) -> Self {
        Self {
            sender,
            logs,
            normalizer,
        }
    }

    pub async fn process(&self, snapshot: &RouteSnapshot, event: &SourceEvent) -> ForwardReport {
        let outcome = decide(event, snapshot, &self.normalizer);
        let source = event
            .source
            .as_deref()
            .map(|raw| canonical_handle(raw).unwrap_or_else(|_| raw.to_string()))
            .unwrap_or_default();
        let original_text = event.text.clone().unwrap_or_default();

        let (destinations, cleaned) = match outcome {
            ForwardOutcome::Skipped(reason) => {
                if reason.is_audited() {
                    let status = if reason == SkipReason::NoDestination {
                        LogStatus::NoTarget
                    } else {
                        LogStatus::Skipped(reason.to_string())
                    };
                    info!("skipping message from {source}: {reason}");
                    let entry = NewLogEntry {
                        owner_id: snapshot.owner_id(),
                        source,
                        original_text,
                        cleaned_text: String::new(),
                        destination: None,
                        status,
                    };
                    record(self.logs.as_ref(), &entry).await;
                } else {
                    debug!("ignoring message source={source:?} reason={reason}");
                }
                return ForwardReport::Skipped(reason);
            }
            ForwardOutcome::Forwarded { destinations, text } => (destinations, text),
        };

        debug!(
            "forwarding from {source} to {} destinations: {}",
            destinations.len(),
            MessageUtils::preview_text(&cleaned)
        );

        let mut sends = JoinSet::new();
        for (index, destination) in destinations.into_iter().enumerate() {
            let sender = self.sender.clone();
            let logs = self.logs.clone();
            let entry = NewLogEntry {
                owner_id: snapshot.owner_id(),
                source: source.clone(),
                original_text: original_text.clone(),
                cleaned_text: cleaned.clone(),
                destination: Some(destination.clone()),
                status: LogStatus::Sent,
            };
            sends.spawn(async move {
                let status = match sender.send(&destination, &entry.cleaned_text).await {
                    Ok(()) => {
                        info!("forwarded {} -> {destination}", entry.source);
                        LogStatus::Sent
                    }
                    Err(err) => {
                        warn!("failed to forward {} -> {destination}: {err}", entry.source);
                        LogStatus::Error(err.to_string())
                    }
                };
                record(logs.as_ref(), &NewLogEntry {
                    status: status.clone(),
                    ..entry
                })
                .await;
                (index, Delivery {
                    destination,
                    status,
                })
            });
        }

        let mut deliveries = Vec::new();
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok(delivery) => deliveries.push(delivery),
                Err(err) => warn!("send task for {source} failed to join: {err}"),
            }
        }
        deliveries.sort_by_key(|(index, _)| *index);
        let deliveries = deliveries.into_iter().map(|(_, delivery)| delivery).collect();

        ForwardReport::Delivered(deliveries)
    }
}

async fn record(logs: &dyn LogStore, entry: &NewLogEntry) {
    if let Err(err) = logs.append_log(entry).await {
        warn!("failed to write forward log for {}: {err}", entry.source);
    }
}

impl EventSink for Arc<Forwarder> {
    fn dispatch(&self, snapshot: Arc<RouteSnapshot>, event: SourceEvent) {
        let forwarder = self.clone();
        tokio::spawn(async move {
            forwarder.process(&snapshot, &event).await;
        });
    }
}
