use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::{CredentialSet, SessionArtifact};

use super::routing::{RouteSnapshot, RoutingTable};
use super::transport::{SourceConnector, SourceEvent, SourceStream};

#[derive(Debug, Clone, Error)]
pub enum ListenerError {
    #[error("no credential set is stored for this owner")]
    MissingCredentials,
    #[error("credential set for owner {0} is incomplete")]
    IncompleteCredentials(i64),
    #[error("no session artifact is stored for this owner")]
    MissingSession,
    #[error("session artifact belongs to owner {session_owner}, credentials to owner {credentials_owner}")]
    OwnerMismatch {
        credentials_owner: i64,
        session_owner: i64,
    },
    #[error("failed to establish source stream: {0}")]
    Connect(String),
    #[error("source stream failed: {0}")]
    Stream(String),
    #[error("listener is not running")]
    NotRunning,
    #[error("failed to load routes: {0}")]
    Routing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerState::Stopped => "stopped",
            ListenerState::Starting => "starting",
            ListenerState::Running => "running",
            ListenerState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListenerStatus {
    pub state: ListenerState,
    pub owner_id: Option<i64>,
    pub monitored: Vec<String>,
    pub last_error: Option<String>,
}

/// Receives every event delivered by the running stream. Must not block:
/// slow work such as sending is expected to be spawned.
pub trait EventSink: Send + Sync {
    fn dispatch(&self, snapshot: Arc<RouteSnapshot>, event: SourceEvent);
}

struct SharedState {
    state: RwLock<ListenerState>,
    owner_id: RwLock<Option<i64>>,
    snapshot: RwLock<Arc<RouteSnapshot>>,
    last_error: RwLock<Option<String>>,
    // Bumped on every start and stop so a finished pump never clobbers newer state.
    epoch: AtomicU64,
}

impl SharedState {
    fn mark_stopped(&self, reason: Option<String>) {
        *self.state.write() = ListenerState::Stopped;
        *self.owner_id.write() = None;
        *self.snapshot.write() = Arc::new(RouteSnapshot::default());
        if reason.is_some() {
            *self.last_error.write() = reason;
        }
    }
}

struct ActiveStream {
    owner_id: i64,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Owns the single source stream of the process and the monitored-set
/// snapshot the stream's events are judged against.
pub struct ListenerLifecycle {
    routing: Arc<RoutingTable>,
    connector: Arc<dyn SourceConnector>,
    sink: Arc<dyn EventSink>,
    stop_timeout: Duration,
    active: AsyncMutex<Option<ActiveStream>>,
    shared: Arc<SharedState>,
}

impl ListenerLifecycle {
    pub fn new(
        routing: Arc<RoutingTable>,
        connector: Arc<dyn SourceConnector>,
        sink: Arc<dyn EventSink>,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            routing,
            connector,
            sink,
            stop_timeout,
            active: AsyncMutex::new(None),
            shared: Arc::new(SharedState {
                state: RwLock::new(ListenerState::Stopped),
                owner_id: RwLock::new(None),
                snapshot: RwLock::new(Arc::new(RouteSnapshot::default())),
                last_error: RwLock::new(None),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.shared.state.read()
    }

    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.shared.snapshot.read().clone()
    }

    pub fn status(&self) -> ListenerStatus {
        let mut monitored: Vec<String> = self.snapshot().monitored_sources().into_iter().collect();
        monitored.sort();
        ListenerStatus {
            state: self.state(),
            owner_id: *self.shared.owner_id.read(),
            monitored,
            last_error: self.shared.last_error.read().clone(),
        }
    }

    /// Starts the stream for the credentials' owner. A running stream is
    /// stopped first. Failures leave the listener `Stopped`.
    pub async fn start(
        &self,
        credentials: Option<CredentialSet>,
        session: Option<SessionArtifact>,
    ) -> Result<(), ListenerError> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!(
                "listener restart requested, stopping stream for owner={}",
                previous.owner_id
            );
            self.shutdown_stream(previous).await;
        }
        self.shared.mark_stopped(None);

        let (credentials, session) = match check_preconditions(credentials, session) {
            Ok(inputs) => inputs,
            Err(err) => {
                warn!("listener start rejected: {err}");
                self.shared.mark_stopped(Some(err.to_string()));
                return Err(err);
            }
        };
        let owner_id = credentials.owner_id;

        *self.shared.state.write() = ListenerState::Starting;
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "listener starting owner={} session={}",
            owner_id, session.filename
        );

        let mut stream = match self.connector.connect(&credentials, &session).await {
            Ok(stream) => stream,
            Err(err) => {
                error!("listener failed to connect owner={owner_id}: {err}");
                self.shared.mark_stopped(Some(err.to_string()));
                return Err(err);
            }
        };

        let snapshot = match self.routing.snapshot(owner_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let err = ListenerError::Routing(err.to_string());
                error!("listener failed to load routes owner={owner_id}: {err}");
                if let Err(close_err) = stream.close().await {
                    warn!("failed to close source stream after route load error: {close_err}");
                }
                self.shared.mark_stopped(Some(err.to_string()));
                return Err(err);
            }
        };

        let monitored = snapshot.len();
        *self.shared.snapshot.write() = Arc::new(snapshot);
        *self.shared.owner_id.write() = Some(owner_id);
        *self.shared.last_error.write() = None;
        *self.shared.state.write() = ListenerState::Running;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(pump_events(
            self.shared.clone(),
            self.sink.clone(),
            stream,
            shutdown_rx,
            epoch,
        ));
        *active = Some(ActiveStream {
            owner_id,
            shutdown: Some(shutdown_tx),
            task,
        });

        info!("listener running owner={owner_id} monitored={monitored}");
        Ok(())
    }

    /// Idempotent; a no-op when nothing is running.
    pub async fn stop(&self) -> Result<(), ListenerError> {
        let mut active = self.active.lock().await;
        let Some(current) = active.take() else {
            debug!("listener stop requested while no stream is active");
            self.shared.mark_stopped(None);
            return Ok(());
        };

        self.shutdown_stream(current).await;
        self.shared.mark_stopped(None);
        info!("listener stopped");
        Ok(())
    }

    /// Re-reads the running owner's active routes and swaps the snapshot.
    pub async fn reload(&self) -> Result<usize, ListenerError> {
        let active = self.active.lock().await;
        let owner_id = match active.as_ref() {
            Some(current) if self.state() == ListenerState::Running => current.owner_id,
            _ => return Err(ListenerError::NotRunning),
        };

        let snapshot = self
            .routing
            .snapshot(owner_id)
            .await
            .map_err(|err| ListenerError::Routing(err.to_string()))?;
        let monitored = snapshot.len();
        *self.shared.snapshot.write() = Arc::new(snapshot);

        info!("listener reloaded owner={owner_id} monitored={monitored}");
        Ok(monitored)
    }

    /// Reloads only when the running stream belongs to `owner_id`.
    pub async fn reload_owner(&self, owner_id: i64) -> Result<bool, ListenerError> {
        let status = self.status();
        if status.state != ListenerState::Running || status.owner_id != Some(owner_id) {
            return Ok(false);
        }

        match self.reload().await {
            Ok(_) => Ok(true),
            Err(ListenerError::NotRunning) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn shutdown_stream(&self, mut current: ActiveStream) {
        *self.shared.state.write() = ListenerState::Stopping;
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(shutdown) = current.shutdown.take() {
            let _ = shutdown.send(());
        }

        match tokio::time::timeout(self.stop_timeout, &mut current.task).await {
            Ok(Ok(())) => debug!("source stream task exited owner={}", current.owner_id),
            Ok(Err(join_err)) => {
                warn!("source stream task join error owner={}: {join_err}", current.owner_id)
            }
            Err(_) => {
                warn!(
                    "source stream did not stop within {:?} owner={}, discarding it",
                    self.stop_timeout, current.owner_id
                );
                current.task.abort();
            }
        }
    }
}

fn check_preconditions(
    credentials: Option<CredentialSet>,
    session: Option<SessionArtifact>,
) -> Result<(CredentialSet, SessionArtifact), ListenerError> {
    let credentials = credentials.ok_or(ListenerError::MissingCredentials)?;
    if !credentials.is_complete() {
        return Err(ListenerError::IncompleteCredentials(credentials.owner_id));
    }
    let session = session.ok_or(ListenerError::MissingSession)?;
    if session.data.is_empty() {
        return Err(ListenerError::MissingSession);
    }
    if session.owner_id != credentials.owner_id {
        return Err(ListenerError::OwnerMismatch {
            credentials_owner: credentials.owner_id,
            session_owner: session.owner_id,
        });
    }
    Ok((credentials, session))
}

async fn pump_events(
    shared: Arc<SharedState>,
    sink: Arc<dyn EventSink>,
    mut stream: Box<dyn SourceStream>,
    mut shutdown: oneshot::Receiver<()>,
    epoch: u64,
) {
    let failure = loop {
        tokio::select! {
            _ = &mut shutdown => break None,
            next = stream.next_event() => match next {
                Some(Ok(event)) => {
                    let snapshot = shared.snapshot.read().clone();
                    sink.dispatch(snapshot, event);
                }
                Some(Err(err)) => break Some(err.to_string()),
                None => break Some(ListenerError::Stream("source stream ended".to_string()).to_string()),
            }
        }
    };

    if let Err(err) = stream.close().await {
        warn!("failed to close source stream: {err}");
    }

    if let Some(reason) = failure {
        error!("listener stopped by stream failure: {reason}");
        if shared.epoch.load(Ordering::SeqCst) == epoch {
            shared.mark_stopped(Some(reason));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use secrecy::SecretString;
    use tokio::sync::mpsc;

    use super::{EventSink, ListenerError, ListenerLifecycle, ListenerState};
    use crate::bridge::routing::{RouteSnapshot, RoutingTable};
    use crate::bridge::transport::{SourceConnector, SourceEvent, SourceStream};
    use crate::db::manager::tests::temp_manager;
    use crate::db::{CredentialSet, SessionArtifact};

    type EventResult = Result<SourceEvent, ListenerError>;

    pub(crate) struct ChannelStream {
        rx: mpsc::UnboundedReceiver<EventResult>,
        closed: Arc<AtomicBool>,
        hang_on_close: bool,
    }

    #[async_trait]
    impl SourceStream for ChannelStream {
        async fn next_event(&mut self) -> Option<EventResult> {
            self.rx.recv().await
        }

        async fn close(&mut self) -> Result<(), ListenerError> {
            if self.hang_on_close {
                std::future::pending::<()>().await;
            }
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct ChannelConnector {
        pub(crate) fail: AtomicBool,
        pub(crate) hang_on_close: AtomicBool,
        pub(crate) senders: Mutex<Vec<mpsc::UnboundedSender<EventResult>>>,
        pub(crate) closed_flags: Mutex<Vec<Arc<AtomicBool>>>,
    }

    impl ChannelConnector {
        pub(crate) fn push(&self, event: EventResult) {
            let senders = self.senders.lock();
            let sender = senders.last().expect("a stream was connected");
            sender.send(event).expect("stream is alive");
        }
    }

    #[async_trait]
    impl SourceConnector for ChannelConnector {
        async fn connect(
            &self,
            _credentials: &CredentialSet,
            _session: &SessionArtifact,
        ) -> Result<Box<dyn SourceStream>, ListenerError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ListenerError::Connect("auth key rejected".to_string()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            let closed = Arc::new(AtomicBool::new(false));
            self.senders.lock().push(tx);
            self.closed_flags.lock().push(closed.clone());
            Ok(Box::new(ChannelStream {
                rx,
                closed,
                hang_on_close: self.hang_on_close.load(Ordering::SeqCst),
            }))
        }
    }

    struct RecordingSink {
        tx: mpsc::UnboundedSender<(Arc<RouteSnapshot>, SourceEvent)>,
    }

    impl EventSink for RecordingSink {
        fn dispatch(&self, snapshot: Arc<RouteSnapshot>, event: SourceEvent) {
            let _ = self.tx.send((snapshot, event));
        }
    }

    pub(crate) fn credentials(owner_id: i64) -> CredentialSet {
        CredentialSet {
            owner_id,
            api_id: 12345,
            api_hash: SecretString::from("0123456789abcdef".to_string()),
        }
    }

    pub(crate) fn session(owner_id: i64) -> SessionArtifact {
        SessionArtifact {
            id: 1,
            owner_id,
            filename: "main.session".to_string(),
            data: b"123456:token".to_vec(),
            uploaded_at: Utc::now(),
        }
    }

    struct Harness {
        _file: tempfile::NamedTempFile,
        routing: Arc<RoutingTable>,
        connector: Arc<ChannelConnector>,
        listener: ListenerLifecycle,
        events: mpsc::UnboundedReceiver<(Arc<RouteSnapshot>, SourceEvent)>,
    }

    async fn harness(stop_timeout: Duration) -> Harness {
        let (file, manager) = temp_manager().await;
        let routing = Arc::new(RoutingTable::new(manager.route_store()));
        let connector = Arc::new(ChannelConnector::default());
        let (tx, events) = mpsc::unbounded_channel();
        let listener = ListenerLifecycle::new(
            routing.clone(),
            connector.clone(),
            Arc::new(RecordingSink { tx }),
            stop_timeout,
        );
        Harness {
            _file: file,
            routing,
            connector,
            listener,
            events,
        }
    }

    async fn next_dispatch(
        events: &mut mpsc::UnboundedReceiver<(Arc<RouteSnapshot>, SourceEvent)>,
    ) -> (Arc<RouteSnapshot>, SourceEvent) {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("dispatch in time")
            .expect("sink alive")
    }

    async fn wait_for_state(listener: &ListenerLifecycle, state: ListenerState) {
        for _ in 0..200 {
            if listener.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("listener never reached {state}");
    }

    #[tokio::test]
    async fn start_requires_credentials_and_session() {
        let h = harness(Duration::from_secs(1)).await;

        let err = h.listener.start(None, Some(session(1))).await.unwrap_err();
        assert!(matches!(err, ListenerError::MissingCredentials));
        assert_eq!(h.listener.state(), ListenerState::Stopped);

        let err = h.listener.start(Some(credentials(1)), None).await.unwrap_err();
        assert!(matches!(err, ListenerError::MissingSession));

        let mut incomplete = credentials(1);
        incomplete.api_id = 0;
        let err = h
            .listener
            .start(Some(incomplete), Some(session(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ListenerError::IncompleteCredentials(1)));

        let err = h
            .listener
            .start(Some(credentials(1)), Some(session(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, ListenerError::OwnerMismatch { .. }));

        assert_eq!(h.listener.state(), ListenerState::Stopped);
        assert!(h.listener.status().last_error.is_some());
    }

    #[tokio::test]
    async fn connect_failure_returns_to_stopped() {
        let h = harness(Duration::from_secs(1)).await;
        h.connector.fail.store(true, Ordering::SeqCst);

        let err = h
            .listener
            .start(Some(credentials(1)), Some(session(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ListenerError::Connect(_)));
        assert_eq!(h.listener.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn running_listener_dispatches_with_reloaded_snapshot() {
        let mut h = harness(Duration::from_secs(1)).await;
        h.routing.add_route(1, "@chan", &["@bot"]).await.expect("route");

        h.listener
            .start(Some(credentials(1)), Some(session(1)))
            .await
            .expect("start");
        assert_eq!(h.listener.state(), ListenerState::Running);
        assert_eq!(h.listener.status().monitored, vec!["@chan"]);

        h.connector.push(Ok(SourceEvent::text("@chan", "first")));
        let (snapshot, event) = next_dispatch(&mut h.events).await;
        assert!(snapshot.is_monitored("@chan"));
        assert!(!snapshot.is_monitored("@later"));
        assert_eq!(event.text.as_deref(), Some("first"));

        h.routing.add_route(1, "@later", &["@bot"]).await.expect("route");
        assert!(!h.listener.reload_owner(2).await.expect("other owner"));
        assert!(h.listener.reload_owner(1).await.expect("reload"));

        h.connector.push(Ok(SourceEvent::text("@later", "second")));
        let (snapshot, _) = next_dispatch(&mut h.events).await;
        assert!(snapshot.is_monitored("@later"));
        // Snapshots already handed out are never mutated.
        assert_eq!(snapshot.len(), 2);

        h.listener.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn reload_while_stopped_is_an_error_and_stop_is_idempotent() {
        let h = harness(Duration::from_secs(1)).await;

        assert!(matches!(
            h.listener.reload().await,
            Err(ListenerError::NotRunning)
        ));
        assert!(!h.listener.reload_owner(1).await.expect("no-op"));

        h.listener.stop().await.expect("first stop");
        h.listener.stop().await.expect("second stop");
        assert_eq!(h.listener.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn stream_error_moves_listener_to_stopped() {
        let h = harness(Duration::from_secs(1)).await;
        h.listener
            .start(Some(credentials(1)), Some(session(1)))
            .await
            .expect("start");

        h.connector
            .push(Err(ListenerError::Stream("connection reset".to_string())));
        wait_for_state(&h.listener, ListenerState::Stopped).await;

        let status = h.listener.status();
        assert_eq!(status.owner_id, None);
        assert!(status.last_error.expect("error recorded").contains("connection reset"));
        assert!(matches!(
            h.listener.reload().await,
            Err(ListenerError::NotRunning)
        ));
        h.listener.stop().await.expect("stop after failure");
    }

    #[tokio::test]
    async fn start_again_replaces_previous_stream() {
        let h = harness(Duration::from_secs(1)).await;
        h.listener
            .start(Some(credentials(1)), Some(session(1)))
            .await
            .expect("first start");
        h.listener
            .start(Some(credentials(2)), Some(session(2)))
            .await
            .expect("second start");

        let closed = h.connector.closed_flags.lock().clone();
        assert_eq!(closed.len(), 2);
        assert!(closed[0].load(Ordering::SeqCst));
        assert!(!closed[1].load(Ordering::SeqCst));
        assert_eq!(h.listener.status().owner_id, Some(2));

        h.listener.stop().await.expect("stop");
        assert!(closed[1].load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stop_is_bounded_by_timeout() {
        let h = harness(Duration::from_millis(100)).await;
        h.connector.hang_on_close.store(true, Ordering::SeqCst);
        h.listener
            .start(Some(credentials(1)), Some(session(1)))
            .await
            .expect("start");

        tokio::time::timeout(Duration::from_secs(2), h.listener.stop())
            .await
            .expect("stop returns despite a stuck stream")
            .expect("stop");
        assert_eq!(h.listener.state(), ListenerState::Stopped);
    }
}
