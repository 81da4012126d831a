use std::fmt;

use serde::Serialize;

use crate::parsers::{TextNormalizer, canonical_handle};

use super::routing::RouteSnapshot;
use super::transport::SourceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NoSource,
    NotMonitored,
    MediaMessage,
    NoText,
    FilteredEmpty,
    NoDestination,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoSource => "no-source",
            SkipReason::NotMonitored => "not-monitored",
            SkipReason::MediaMessage => "media-message",
            SkipReason::NoText => "no-text",
            SkipReason::FilteredEmpty => "filtered-empty",
            SkipReason::NoDestination => "no-destination",
        }
    }

    /// Skips decided before the source is known to be monitored are not audited.
    pub fn is_audited(&self) -> bool {
        !matches!(self, SkipReason::NoSource | SkipReason::NotMonitored)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    Skipped(SkipReason),
    Forwarded {
        destinations: Vec<String>,
        text: String,
    },
}

/// Decides whether `event` is relayed and where. Pure: performs no I/O.
pub fn decide(
    event: &SourceEvent,
    snapshot: &RouteSnapshot,
    normalizer: &TextNormalizer,
) -> ForwardOutcome {
    let Some(source) = event
        .source
        .as_deref()
        .and_then(|raw| canonical_handle(raw).ok())
    else {
        return ForwardOutcome::Skipped(SkipReason::NoSource);
    };

    if !snapshot.is_monitored(&source) {
        return ForwardOutcome::Skipped(SkipReason::NotMonitored);
    }

    if event.has_media {
        return ForwardOutcome::Skipped(SkipReason::MediaMessage);
    }

    let Some(raw_text) = event.text.as_deref().filter(|text| !text.trim().is_empty()) else {
        return ForwardOutcome::Skipped(SkipReason::NoText);
    };

    let cleaned = normalizer.normalize(raw_text);
    if cleaned.is_empty() {
        return ForwardOutcome::Skipped(SkipReason::FilteredEmpty);
    }

    match snapshot.destinations(&source) {
        Some(destinations) if !destinations.is_empty() => ForwardOutcome::Forwarded {
            destinations: destinations.to_vec(),
            text: cleaned,
        },
        _ => ForwardOutcome::Skipped(SkipReason::NoDestination),
    }
}
