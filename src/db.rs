pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{CredentialSet, LogEntry, LogStatus, NewLogEntry, RouteEntry, SessionArtifact};
pub use self::stores::{CredentialStore, LogStore, RouteStore, SessionStore};

pub mod error;
pub mod manager;
pub mod models;
pub mod stores;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod schema_sqlite;
