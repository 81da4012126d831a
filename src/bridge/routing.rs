use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::db::{DatabaseError, RouteEntry, RouteStore};
use crate::parsers::{HandleError, canonical_handle, canonical_handles};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid handle: {0}")]
    InvalidHandle(#[from] HandleError),
    #[error("a route needs at least one destination")]
    NoDestinations,
    #[error("source {handle} is already routed for owner {owner_id}")]
    Duplicate { owner_id: i64, handle: String },
    #[error("route {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for RouteError {
    fn from(value: DatabaseError) -> Self {
        RouteError::Database(value)
    }
}

/// Immutable view of one owner's active routes, keyed by canonical source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSnapshot {
    owner_id: i64,
    routes: HashMap<String, Vec<String>>,
}

impl RouteSnapshot {
    pub fn new(owner_id: i64, routes: HashMap<String, Vec<String>>) -> Self {
        Self { owner_id, routes }
    }

    pub fn from_routes(owner_id: i64, entries: &[RouteEntry]) -> Self {
        let routes = entries
            .iter()
            .filter(|entry| entry.active && entry.owner_id == owner_id)
            .map(|entry| (entry.source.clone(), entry.destinations.clone()))
            .collect();
        Self { owner_id, routes }
    }

    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }

    pub fn is_monitored(&self, source: &str) -> bool {
        self.routes.contains_key(source)
    }

    pub fn destinations(&self, source: &str) -> Option<&[String]> {
        self.routes.get(source).map(Vec::as_slice)
    }

    pub fn monitored_sources(&self) -> HashSet<String> {
        self.routes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

pub struct RoutingTable {
    store: Arc<dyn RouteStore>,
}

impl RoutingTable {
    pub fn new(store: Arc<dyn RouteStore>) -> Self {
        Self { store }
    }

    pub async fn add_route<S: AsRef<str>>(
        &self,
        owner_id: i64,
        source: &str,
        destinations: &[S],
    ) -> Result<RouteEntry, RouteError> {
        let source = canonical_handle(source)?;
        let destinations = canonical_handles(destinations)?;
        if destinations.is_empty() {
            return Err(RouteError::NoDestinations);
        }

        let entry = self
            .store
            .create_route(owner_id, &source, &destinations)
            .await
            .map_err(|err| match err {
                DatabaseError::Conflict(_) => RouteError::Duplicate {
                    owner_id,
                    handle: source.clone(),
                },
                other => RouteError::Database(other),
            })?;

        info!(
            "route added id={} owner={} source={} destinations={:?}",
            entry.id, owner_id, entry.source, entry.destinations
        );
        Ok(entry)
    }

    /// Deletes the route and returns it, so callers can reload its owner's listener.
    pub async fn remove_route(&self, route_id: i64) -> Result<RouteEntry, RouteError> {
        let entry = self
            .store
            .get_route(route_id)
            .await?
            .ok_or(RouteError::NotFound(route_id))?;

        if !self.store.delete_route(route_id).await? {
            return Err(RouteError::NotFound(route_id));
        }

        info!(
            "route removed id={} owner={} source={}",
            entry.id, entry.owner_id, entry.source
        );
        Ok(entry)
    }

    pub async fn set_active(&self, route_id: i64, active: bool) -> Result<RouteEntry, RouteError> {
        if !self.store.set_route_active(route_id, active).await? {
            return Err(RouteError::NotFound(route_id));
        }
        let entry = self
            .store
            .get_route(route_id)
            .await?
            .ok_or(RouteError::NotFound(route_id))?;

        info!(
            "route active flag changed id={} owner={} active={}",
            entry.id, entry.owner_id, entry.active
        );
        Ok(entry)
    }

    pub async fn toggle_active(&self, route_id: i64) -> Result<RouteEntry, RouteError> {
        let entry = self
            .store
            .get_route(route_id)
            .await?
            .ok_or(RouteError::NotFound(route_id))?;
        self.set_active(route_id, !entry.active).await
    }

    pub async fn get_route(&self, route_id: i64) -> Result<Option<RouteEntry>, RouteError> {
        Ok(self.store.get_route(route_id).await?)
    }

    pub async fn list_routes(&self, owner_id: i64) -> Result<Vec<RouteEntry>, RouteError> {
        Ok(self.store.list_routes(owner_id).await?)
    }

    pub async fn monitored_sources(&self, owner_id: i64) -> Result<HashSet<String>, RouteError> {
        Ok(self.snapshot(owner_id).await?.monitored_sources())
    }

    /// Rebuilt from storage on every call.
    pub async fn snapshot(&self, owner_id: i64) -> Result<RouteSnapshot, RouteError> {
        let active = self.store.list_active_routes(owner_id).await?;
        let snapshot = RouteSnapshot::from_routes(owner_id, &active);
        debug!(
            "route snapshot built owner={} monitored={}",
            owner_id,
            snapshot.len()
        );
        Ok(snapshot)
    }
}
