use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use once_cell::sync::OnceCell;
use salvo::prelude::*;
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::info;

use crate::bridge::BridgeCore;
use crate::config::ProvisioningConfig;

pub mod handlers;
pub mod middleware;

use self::middleware::auth::create_router;

#[derive(Clone)]
pub struct WebState {
    pub bridge: Arc<BridgeCore>,
    pub shared_secret: Option<SecretString>,
    pub started_at: Instant,
}

static WEB_STATE: OnceCell<WebState> = OnceCell::new();

pub fn web_state() -> &'static WebState {
    WEB_STATE
        .get()
        .expect("web state is not initialized before handler execution")
}

pub(crate) fn init_web_state(state: WebState) {
    let _ = WEB_STATE.set(state);
}

#[derive(Clone)]
pub struct WebServer {
    config: ProvisioningConfig,
}

impl WebServer {
    pub fn new(config: ProvisioningConfig, bridge: Arc<BridgeCore>) -> Self {
        init_web_state(WebState {
            bridge,
            shared_secret: config.shared_secret.clone(),
            started_at: Instant::now(),
        });

        Self { config }
    }

    pub async fn start(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.bind_address, self.config.port);
        info!("starting provisioning API on {}", bind_addr);

        let acceptor = TcpListener::new(bind_addr).bind().await;
        let server = Server::new(acceptor);
        let handle = server.handle();
        tokio::spawn(async move {
            let _ = shutdown.changed().await;
            handle.stop_graceful(None);
        });
        server.serve(create_router()).await;

        info!("provisioning API stopped");
        Ok(())
    }
}
