use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{CredentialSet, DatabaseError, DatabaseManager, LogEntry, RouteEntry};
use crate::parsers::TextNormalizer;

pub mod decision;
pub mod forwarder;
pub mod listener;
pub mod routing;
pub mod transport;

use self::forwarder::Forwarder;
use self::listener::{EventSink, ListenerError, ListenerLifecycle, ListenerStatus};
use self::routing::{RouteError, RoutingTable};
use self::transport::{MessageSender, SourceConnector};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Entry point for every control surface: command menu, provisioning API and CLI.
#[derive(Clone)]
pub struct BridgeCore {
    db_manager: Arc<DatabaseManager>,
    routing: Arc<RoutingTable>,
    listener: Arc<ListenerLifecycle>,
}

impl BridgeCore {
    pub fn new(
        config: &Config,
        db_manager: Arc<DatabaseManager>,
        connector: Arc<dyn SourceConnector>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        let normalizer = Arc::new(TextNormalizer::new(
            config.filter.arabic_mode,
            &config.filter.extra_stopwords,
        ));
        let routing = Arc::new(RoutingTable::new(db_manager.route_store()));
        let forwarder = Arc::new(Forwarder::new(sender, db_manager.log_store(), normalizer));
        let sink: Arc<dyn EventSink> = Arc::new(forwarder);
        let listener = Arc::new(ListenerLifecycle::new(
            routing.clone(),
            connector,
            sink,
            Duration::from_secs(config.listener.stop_timeout_secs),
        ));

        Self {
            db_manager,
            routing,
            listener,
        }
    }

    pub async fn add_route(
        &self,
        owner_id: i64,
        source: &str,
        destinations: &[String],
    ) -> Result<RouteEntry, BridgeError> {
        let entry = self.routing.add_route(owner_id, source, destinations).await?;
        self.reload_after_change(owner_id).await;
        Ok(entry)
    }

    /// Only routes belonging to `owner_id` may be removed through this path.
    pub async fn remove_route(&self, owner_id: i64, route_id: i64) -> Result<RouteEntry, BridgeError> {
        self.owned_route(owner_id, route_id).await?;
        let entry = self.routing.remove_route(route_id).await?;
        self.reload_after_change(entry.owner_id).await;
        Ok(entry)
    }

    pub async fn toggle_route(&self, owner_id: i64, route_id: i64) -> Result<RouteEntry, BridgeError> {
        self.owned_route(owner_id, route_id).await?;
        let entry = self.routing.toggle_active(route_id).await?;
        self.reload_after_change(entry.owner_id).await;
        Ok(entry)
    }

    pub async fn list_routes(&self, owner_id: i64) -> Result<Vec<RouteEntry>, BridgeError> {
        Ok(self.routing.list_routes(owner_id).await?)
    }

    pub async fn set_credentials(
        &self,
        owner_id: i64,
        api_id: i32,
        api_hash: SecretString,
    ) -> Result<(), BridgeError> {
        let credentials = CredentialSet {
            owner_id,
            api_id,
            api_hash,
        };
        if !credentials.is_complete() {
            return Err(ListenerError::IncompleteCredentials(owner_id).into());
        }
        self.db_manager
            .credential_store()
            .upsert_credentials(&credentials)
            .await?;
        info!("credentials stored owner={owner_id} api_id={api_id}");
        Ok(())
    }

    pub async fn import_session(
        &self,
        owner_id: i64,
        filename: &str,
        data: &[u8],
    ) -> Result<(), BridgeError> {
        if data.is_empty() {
            return Err(ListenerError::MissingSession.into());
        }
        self.db_manager
            .session_store()
            .save_session(owner_id, filename, data)
            .await?;
        info!(
            "session artifact stored owner={owner_id} filename={filename} bytes={}",
            data.len()
        );
        Ok(())
    }

    /// Loads the owner's credentials and newest session, then (re)starts the listener.
    pub async fn start_listener(&self, owner_id: i64) -> Result<ListenerStatus, BridgeError> {
        let credentials = self
            .db_manager
            .credential_store()
            .get_credentials(owner_id)
            .await?;
        let session = self
            .db_manager
            .session_store()
            .latest_session(owner_id)
            .await?;

        self.listener.start(credentials, session).await?;
        Ok(self.listener.status())
    }

    pub async fn stop_listener(&self) -> Result<ListenerStatus, BridgeError> {
        self.listener.stop().await?;
        Ok(self.listener.status())
    }

    pub async fn reload_listener(&self) -> Result<ListenerStatus, BridgeError> {
        self.listener.reload().await?;
        Ok(self.listener.status())
    }

    pub fn status(&self) -> ListenerStatus {
        self.listener.status()
    }

    /// Newest first. `None` for `owner_id` pages across every owner.
    pub async fn recent_logs(
        &self,
        owner_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LogEntry>, BridgeError> {
        Ok(self
            .db_manager
            .log_store()
            .recent_logs(owner_id, limit.clamp(1, 500), offset.max(0))
            .await?)
    }

    async fn owned_route(&self, owner_id: i64, route_id: i64) -> Result<RouteEntry, BridgeError> {
        match self.routing.get_route(route_id).await? {
            Some(entry) if entry.owner_id == owner_id => Ok(entry),
            _ => Err(RouteError::NotFound(route_id).into()),
        }
    }

    async fn reload_after_change(&self, owner_id: i64) {
        match self.listener.reload_owner(owner_id).await {
            Ok(true) => info!("listener reloaded after route change owner={owner_id}"),
            Ok(false) => {}
            Err(err) => warn!("listener reload after route change failed owner={owner_id}: {err}"),
        }
    }
}
