use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::engine::{
    ConflictStream, ConnectionState, Fanout, OperationStream, StatusStream, SyncStatus,
};
use crate::error::{Result, SyncError};
use crate::protocol::{
    fresh_id, ClientMessage, DataConflict, PartialSyncConfig, ReconciliationRequest,
    ReconciliationResponse, ServerMessage, SyncOperation,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tuning knobs for [`WebSocketSync`].
///
/// The defaults are the protocol's: 10 s push/pull and 15 s reconcile
/// deadlines, linear `backoff × attempt` reconnect delay, five attempts
/// before giving up.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// The sync server URL (`ws://` or `wss://`).
    pub url: String,
    /// Deadline for a push to be acknowledged.
    pub push_timeout: Duration,
    /// Deadline for a pull (and partial-sync) answer.
    pub pull_timeout: Duration,
    /// Deadline for a reconciliation answer.
    pub reconcile_timeout: Duration,
    /// Base reconnect delay; attempt `n` waits `n ×` this.
    pub reconnect_backoff: Duration,
    /// Reconnect attempts before the engine goes `Disconnected` for good.
    pub max_reconnect_attempts: u32,
}

impl WebSocketConfig {
    /// Defaults for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            push_timeout: Duration::from_secs(10),
            pull_timeout: Duration::from_secs(10),
            reconcile_timeout: Duration::from_secs(15),
            reconnect_backoff: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
        }
    }
}

/// Response slots are keyed by message type and request id, so an answer
/// can only complete the request that registered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PendingKind {
    Ack,
    Operations,
    ReconcileResponse,
    PartialSyncComplete,
}

type PendingKey = (PendingKind, String);

struct Inner {
    config: WebSocketConfig,
    state: Mutex<ConnectionState>,
    attempts: AtomicU32,
    /// Bumped by connect/disconnect; a session loop whose generation no
    /// longer matches must stand down (a newer session owns the engine).
    session: AtomicU64,
    manual_disconnect: AtomicBool,
    pending: Mutex<HashMap<PendingKey, oneshot::Sender<ServerMessage>>>,
    writer: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
    status: Fanout<SyncStatus>,
    conflicts: Fanout<DataConflict>,
    incoming: Fanout<SyncOperation>,
}

/// Sync engine over a WebSocket connection.
///
/// Owns the connection lifecycle: a reader/writer task pair per session,
/// one-shot response slots correlating requests with answers, and a
/// reconnect loop with linear backoff when the socket drops unexpectedly.
/// Unsolicited `operations` frames feed the incoming stream the
/// replication loop consumes; `conflict` frames feed the conflicts stream.
pub struct WebSocketSync {
    inner: Arc<Inner>,
}

impl WebSocketSync {
    /// Create an engine for `config`. No connection is attempted until
    /// [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                attempts: AtomicU32::new(0),
                session: AtomicU64::new(0),
                manual_disconnect: AtomicBool::new(false),
                pending: Mutex::new(HashMap::new()),
                writer: Mutex::new(None),
                status: Fanout::new(),
                conflicts: Fanout::new(),
                incoming: Fanout::new(),
            }),
        }
    }

    /// Engine with default tuning for `url`.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(WebSocketConfig::new(url))
    }

    /// Open the connection and start the session tasks.
    ///
    /// Idempotent while connected. A failed attempt leaves the engine
    /// `Disconnected`; there is no automatic retry for an explicit
    /// `connect`.
    pub async fn connect(&self) -> Result<()> {
        match self.inner.state() {
            ConnectionState::Online | ConnectionState::Syncing => return Ok(()),
            // An attempt (or the reconnect loop) is already in flight.
            ConnectionState::Connecting | ConnectionState::Reconnecting => return Ok(()),
            ConnectionState::Disconnected => {}
        }
        self.inner.manual_disconnect.store(false, Ordering::SeqCst);
        self.inner.attempts.store(0, Ordering::SeqCst);
        let generation = self.inner.session.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.set_state(ConnectionState::Connecting);

        let stream = match connect_async(self.inner.config.url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                self.inner.set_state(ConnectionState::Disconnected);
                return Err(match e {
                    tokio_tungstenite::tungstenite::Error::Url(_) => {
                        SyncError::Init(e.to_string())
                    }
                    other => SyncError::Connection(other.to_string()),
                });
            }
        };

        info!(url = %self.inner.config.url, "sync connection established");
        self.inner.set_state(ConnectionState::Online);
        self.inner.status.emit(SyncStatus::Online);
        Inner::spawn_session(Arc::clone(&self.inner), stream, generation);
        Ok(())
    }

    /// Close the connection. Infallible; pending requests fail with a
    /// connection error.
    pub async fn disconnect(&self) {
        self.inner.manual_disconnect.store(true, Ordering::SeqCst);
        self.inner.session.fetch_add(1, Ordering::SeqCst);
        // Dropping the writer ends the session task, which sends the
        // close frame.
        self.inner.writer.lock().unwrap().take();
        self.inner.set_state(ConnectionState::Disconnected);
        self.inner.status.emit(SyncStatus::Offline);
    }

    /// Deliver operations and wait for the server's ack.
    pub async fn push(&self, operations: Vec<SyncOperation>) -> Result<()> {
        self.inner.ensure_connected()?;
        self.inner.enter_syncing();

        let id = fresh_id();
        let result = self
            .inner
            .request(
                PendingKind::Ack,
                id.clone(),
                ClientMessage::Push { id, operations },
                self.inner.config.push_timeout,
                "push",
            )
            .await;

        self.inner.leave_syncing();
        match result {
            Ok(_) => Ok(()),
            Err(SyncError::Connection(message)) => Err(SyncError::Send(message)),
            Err(other) => Err(other),
        }
    }

    /// Fetch operations, optionally restricted by a partial-sync config.
    pub async fn pull(&self, config: Option<PartialSyncConfig>) -> Result<Vec<SyncOperation>> {
        self.inner.ensure_connected()?;

        let id = fresh_id();
        let answer = self
            .inner
            .request(
                PendingKind::Operations,
                id.clone(),
                ClientMessage::Pull { id, config },
                self.inner.config.pull_timeout,
                "pull",
            )
            .await;

        match answer {
            Ok(ServerMessage::Operations { operations, .. }) => Ok(operations),
            Ok(other) => Err(SyncError::Pull(format!(
                "unexpected answer to pull: {other:?}"
            ))),
            Err(SyncError::Connection(message)) => Err(SyncError::Pull(message)),
            Err(other) => Err(other),
        }
    }

    /// Run a reconciliation round.
    pub async fn reconcile(&self, request: ReconciliationRequest) -> Result<ReconciliationResponse> {
        self.inner.ensure_connected()?;
        self.inner.enter_syncing();

        let id = request.id.clone();
        let answer = self
            .inner
            .request(
                PendingKind::ReconcileResponse,
                id,
                ClientMessage::Reconcile(request),
                self.inner.config.reconcile_timeout,
                "reconcile",
            )
            .await;

        self.inner.leave_syncing();
        match answer {
            Ok(ServerMessage::ReconcileResponse { response, .. }) => Ok(response),
            Ok(other) => Err(SyncError::Reconcile(format!(
                "unexpected answer to reconcile: {other:?}"
            ))),
            Err(SyncError::Connection(message)) => Err(SyncError::Reconcile(message)),
            Err(other) => Err(other),
        }
    }

    /// Install a partial-sync selection and wait for completion.
    pub async fn partial_sync(&self, config: PartialSyncConfig) -> Result<()> {
        self.inner.ensure_connected()?;

        let answer = self
            .inner
            .request(
                PendingKind::PartialSyncComplete,
                String::new(),
                ClientMessage::PartialSync { config },
                self.inner.config.pull_timeout,
                "partial-sync",
            )
            .await;

        match answer {
            Ok(_) => Ok(()),
            Err(SyncError::Connection(message)) => Err(SyncError::PartialSync(message)),
            Err(other) => Err(other),
        }
    }

    /// Subscribe to status transitions.
    pub fn status(&self) -> StatusStream {
        StatusStream::new(self.inner.status.subscribe())
    }

    /// Subscribe to server-reported conflicts.
    pub fn conflicts(&self) -> ConflictStream {
        ConflictStream::new(self.inner.conflicts.subscribe())
    }

    /// Subscribe to server-initiated operation broadcasts.
    pub fn incoming(&self) -> OperationStream {
        OperationStream::new(self.inner.incoming.subscribe())
    }

    /// The current lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state()
    }
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state().is_connected() {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }

    fn enter_syncing(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == ConnectionState::Online {
            *state = ConnectionState::Syncing;
            drop(state);
            self.status.emit(SyncStatus::Syncing);
        }
    }

    fn leave_syncing(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == ConnectionState::Syncing {
            *state = ConnectionState::Online;
            drop(state);
            self.status.emit(SyncStatus::Online);
        }
    }

    fn send(&self, message: ClientMessage) -> Result<()> {
        match self.writer.lock().unwrap().as_ref() {
            Some(tx) => tx.send(message).map_err(|_| SyncError::NotConnected),
            None => Err(SyncError::NotConnected),
        }
    }

    /// Register a one-shot response slot, send the request, and wait for
    /// the correlated answer or the deadline. The slot is unregistered on
    /// both outcomes.
    async fn request(
        &self,
        kind: PendingKind,
        id: String,
        message: ClientMessage,
        deadline: Duration,
        what: &'static str,
    ) -> Result<ServerMessage> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert((kind, id.clone()), tx);

        if let Err(e) = self.send(message) {
            self.pending.lock().unwrap().remove(&(kind, id));
            return Err(e);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_closed)) => Err(SyncError::Connection(
                "connection closed while waiting for the server".into(),
            )),
            Err(_elapsed) => {
                self.pending.lock().unwrap().remove(&(kind, id));
                Err(SyncError::Timeout(what))
            }
        }
    }

    fn complete(&self, kind: PendingKind, id: &str, answer: ServerMessage) -> bool {
        let slot = self.pending.lock().unwrap().remove(&(kind, id.to_string()));
        match slot {
            Some(tx) => tx.send(answer).is_ok(),
            None => false,
        }
    }

    fn fail_pending(&self) {
        // Dropping the senders wakes every waiter with a closed error.
        self.pending.lock().unwrap().clear();
    }

    fn handle_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::Ack { ref id } => {
                let id = id.clone();
                if !self.complete(PendingKind::Ack, &id, message) {
                    debug!(id = %id, "ack with no matching push");
                }
            }
            ServerMessage::Operations {
                request_id: Some(ref rid),
                ..
            } => {
                let rid = rid.clone();
                if !self.complete(PendingKind::Operations, &rid, message) {
                    debug!(request_id = %rid, "operations answer with no matching pull");
                }
            }
            ServerMessage::Operations {
                request_id: None,
                operations,
            } => {
                debug!(count = operations.len(), "server broadcast");
                for operation in operations {
                    self.incoming.emit(operation);
                }
            }
            ServerMessage::ReconcileResponse { ref id, .. } => {
                let id = id.clone();
                if !self.complete(PendingKind::ReconcileResponse, &id, message) {
                    debug!(id = %id, "reconcile answer with no matching request");
                }
            }
            ServerMessage::PartialSyncComplete => {
                self.complete(PendingKind::PartialSyncComplete, "", message);
            }
            ServerMessage::Conflict { conflict } => {
                debug!(key = %conflict.key, "server reported a conflict");
                self.conflicts.emit(conflict);
            }
        }
    }

    /// Drive one connection, then reconnect with linear backoff until the
    /// attempt cap or a manual disconnect.
    fn spawn_session(inner: Arc<Inner>, stream: WsStream, generation: u64) {
        tokio::spawn(async move {
            let mut current = Some(stream);
            loop {
                if let Some(stream) = current.take() {
                    Inner::run_connection(&inner, stream).await;

                    if inner.session.load(Ordering::SeqCst) != generation {
                        // A newer connect/disconnect owns the engine.
                        return;
                    }
                    inner.writer.lock().unwrap().take();
                    inner.fail_pending();

                    if inner.manual_disconnect.load(Ordering::SeqCst) {
                        inner.set_state(ConnectionState::Disconnected);
                        return;
                    }
                    // Unexpected close.
                    inner.status.emit(SyncStatus::Offline);
                }

                let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt > inner.config.max_reconnect_attempts {
                    warn!(attempt, "giving up on reconnecting");
                    inner.set_state(ConnectionState::Disconnected);
                    return;
                }

                inner.set_state(ConnectionState::Reconnecting);
                let delay = inner.config.reconnect_backoff * attempt;
                debug!(attempt, ?delay, "reconnecting after backoff");
                tokio::time::sleep(delay).await;

                if inner.session.load(Ordering::SeqCst) != generation
                    || inner.manual_disconnect.load(Ordering::SeqCst)
                {
                    return;
                }

                inner.set_state(ConnectionState::Connecting);
                match connect_async(inner.config.url.as_str()).await {
                    Ok((stream, _response)) => {
                        info!(attempt, "reconnected");
                        inner.attempts.store(0, Ordering::SeqCst);
                        inner.set_state(ConnectionState::Online);
                        inner.status.emit(SyncStatus::Online);
                        current = Some(stream);
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "reconnect attempt failed");
                    }
                }
            }
        });
    }

    /// Pump one socket until it closes: outbound frames from the writer
    /// channel, inbound frames into [`handle_message`](Self::handle_message).
    async fn run_connection(inner: &Arc<Inner>, stream: WsStream) {
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<ClientMessage>();
        *inner.writer.lock().unwrap() = Some(write_tx);

        let (mut sink, mut source) = stream.split();
        loop {
            tokio::select! {
                outbound = write_rx.recv() => match outbound {
                    Some(message) => {
                        let text = match serde_json::to_string(&message) {
                            Ok(text) => text,
                            Err(e) => {
                                error!(error = %e, "dropping unserializable frame");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(WsMessage::Text(text)).await {
                            warn!(error = %e, "send failed, closing connection");
                            return;
                        }
                    }
                    None => {
                        // Writer taken: manual disconnect.
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return;
                    }
                },
                inbound = source.next() => match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => inner.handle_message(message),
                            Err(e) => warn!(error = %e, "ignoring unparseable frame"),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("connection closed by server");
                        return;
                    }
                    Some(Ok(_other_frame)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "read failed, closing connection");
                        return;
                    }
                },
            }
        }
    }
}
