use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub id: i64,
    pub owner_id: i64,
    pub source: String,
    pub destinations: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Transport credentials of one owner. `api_hash` never leaves the process in logs.
#[derive(Debug, Clone)]
pub struct CredentialSet {
    pub owner_id: i64,
    pub api_id: i32,
    pub api_hash: SecretString,
}

impl CredentialSet {
    pub fn is_complete(&self) -> bool {
        self.api_id > 0 && !self.api_hash.expose_secret().trim().is_empty()
    }
}

#[derive(Clone)]
pub struct SessionArtifact {
    pub id: i64,
    pub owner_id: i64,
    pub filename: String,
    pub data: Vec<u8>,
    pub uploaded_at: DateTime<Utc>,
}

impl fmt::Debug for SessionArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionArtifact")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("filename", &self.filename)
            .field("bytes", &self.data.len())
            .field("uploaded_at", &self.uploaded_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum LogStatus {
    Sent,
    Error(String),
    NoTarget,
    Skipped(String),
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStatus::Sent => f.write_str("sent"),
            LogStatus::Error(detail) => write!(f, "error:{detail}"),
            LogStatus::NoTarget => f.write_str("no-target"),
            LogStatus::Skipped(reason) => write!(f, "skipped:{reason}"),
        }
    }
}

impl From<String> for LogStatus {
    fn from(value: String) -> Self {
        if value == "sent" {
            LogStatus::Sent
        } else if value == "no-target" {
            LogStatus::NoTarget
        } else if let Some(detail) = value.strip_prefix("error:") {
            LogStatus::Error(detail.to_string())
        } else if let Some(reason) = value.strip_prefix("skipped:") {
            LogStatus::Skipped(reason.to_string())
        } else {
            LogStatus::Error(value)
        }
    }
}

impl From<LogStatus> for String {
    fn from(value: LogStatus) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub owner_id: i64,
    pub source: String,
    pub original_text: String,
    pub cleaned_text: String,
    pub destination: Option<String>,
    pub status: LogStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub owner_id: i64,
    pub source: String,
    pub original_text: String,
    pub cleaned_text: String,
    pub destination: Option<String>,
    pub status: LogStatus,
}

#[cfg(test)]
mod tests {
    use super::{CredentialSet, LogStatus};
    use secrecy::SecretString;

    #[test]
    fn log_status_string_form() {
        assert_eq!(LogStatus::Sent.to_string(), "sent");
        assert_eq!(LogStatus::NoTarget.to_string(), "no-target");
        assert_eq!(
            LogStatus::Error("timeout".to_string()).to_string(),
            "error:timeout"
        );
        assert_eq!(
            LogStatus::from("skipped:media-message".to_string()),
            LogStatus::Skipped("media-message".to_string())
        );
        assert_eq!(
            LogStatus::from("error:a:b".to_string()),
            LogStatus::Error("a:b".to_string())
        );
    }

    #[test]
    fn credential_set_completeness() {
        let complete = CredentialSet {
            owner_id: 1,
            api_id: 12345,
            api_hash: SecretString::from("abcdef".to_string()),
        };
        assert!(complete.is_complete());

        let missing_hash = CredentialSet {
            api_hash: SecretString::from(" ".to_string()),
            ..complete.clone()
        };
        assert!(!missing_hash.is_complete());

        let missing_id = CredentialSet {
            api_id: 0,
            ..complete
        };
        assert!(!missing_id.is_complete());
    }
}
