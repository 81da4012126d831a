use async_trait::async_trait;

use super::DatabaseError;
use super::models::{CredentialSet, LogEntry, NewLogEntry, RouteEntry, SessionArtifact};

#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn get_route(&self, id: i64) -> Result<Option<RouteEntry>, DatabaseError>;
    /// Newest first.
    async fn list_routes(&self, owner_id: i64) -> Result<Vec<RouteEntry>, DatabaseError>;
    async fn list_active_routes(&self, owner_id: i64) -> Result<Vec<RouteEntry>, DatabaseError>;
    /// Fails with [`DatabaseError::Conflict`] when `(owner_id, source)` already exists.
    async fn create_route(
        &self,
        owner_id: i64,
        source: &str,
        destinations: &[String],
    ) -> Result<RouteEntry, DatabaseError>;
    /// Returns `false` when no row matched.
    async fn set_route_active(&self, id: i64, active: bool) -> Result<bool, DatabaseError>;
    async fn delete_route(&self, id: i64) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credentials(&self, owner_id: i64)
    -> Result<Option<CredentialSet>, DatabaseError>;
    async fn upsert_credentials(&self, credentials: &CredentialSet) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_session(
        &self,
        owner_id: i64,
        filename: &str,
        data: &[u8],
    ) -> Result<(), DatabaseError>;
    async fn latest_session(&self, owner_id: i64)
    -> Result<Option<SessionArtifact>, DatabaseError>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append_log(&self, entry: &NewLogEntry) -> Result<(), DatabaseError>;
    /// Newest first. `owner_id` restricts the page to one owner's rows.
    async fn recent_logs(
        &self,
        owner_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LogEntry>, DatabaseError>;
}
