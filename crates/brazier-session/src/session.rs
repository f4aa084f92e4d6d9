//! The session: one per live connection.
//!
//! A session owns the write half of its connection (behind the packet queue
//! and its writer task), the export and import tables negotiated by the bind
//! handshake, the in-flight request correlation map, the state machine, and
//! the notification-handler slots. The read half is owned by the packet pump
//! in the server crate, which feeds [`Session::handle_packet`].
//!
//! Concurrency: the tables are mutated by the session's own dispatch path
//! but read by request-issuing code on arbitrary tasks, so every mutable
//! table sits behind a mutex. Locks are never held across an await.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use brazier_protocol::{Header, Notification, encode_frame, service_hash};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::state::StateTracker;
use crate::{GameServer, NotifyHandler, Service, ServiceRegistry, SessionError, SessionState};

/// Counter for generating unique session IDs.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a session, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Tunables for a session's queue and correlation behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the outgoing packet queue.
    pub packet_queue_depth: usize,

    /// How long `queue_packet` may wait on a full queue before declaring the
    /// writer stalled and failing with `SessionError::WriteStalled`.
    pub write_stall_timeout: Duration,

    /// Per-request response timeout for [`Session::call`].
    ///
    /// `None` preserves the reference behavior: a request whose response
    /// never arrives leaves its correlation entry registered forever.
    /// `Some(d)` times the call out and removes the entry.
    pub response_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            packet_queue_depth: 64,
            write_stall_timeout: Duration::from_secs(5),
            response_timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

type ExportTable = Vec<Option<Arc<dyn Service>>>;

/// A live connection's state: tables, queue, correlation, and lifecycle.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    registry: Arc<ServiceRegistry>,
    game_servers: Arc<HashMap<String, Arc<dyn GameServer>>>,

    /// Services the peer may invoke on us, by export index. Slot 0 is always
    /// the connection service, bound before any handshake.
    exports: Mutex<ExportTable>,
    /// Services we may invoke on the peer, by the indices the peer assigned.
    imports: Mutex<ExportTable>,
    /// Imported service hash → index into `imports`; the hot path for
    /// outbound-request construction.
    import_map: Mutex<HashMap<u32, usize>>,
    /// Exported service hash → index into `exports`; lets the bind
    /// handshake report the slot a service already occupies instead of
    /// binding it twice.
    export_map: Mutex<HashMap<u32, usize>>,

    /// In-flight requests awaiting a reply, by token.
    pending: Mutex<HashMap<u32, oneshot::Sender<Vec<u8>>>>,
    /// The next request token. Strictly increasing, wraps at u32::MAX.
    last_token: AtomicU32,
    /// Token of the most recently received request; handlers that reply
    /// asynchronously capture it before registering their continuation.
    received_token: AtomicU32,

    packet_tx: mpsc::Sender<Vec<u8>>,
    state: StateTracker,

    /// One-shot notification handlers, one slot per kind.
    pub(crate) handlers: Mutex<HashMap<String, NotifyHandler>>,
    /// Sender for platform → game notifications, installed by the game
    /// server at connect time.
    pub(crate) to_game: Mutex<Option<mpsc::UnboundedSender<Notification>>>,
}

impl Session {
    /// Creates a session over the given write half, pre-binds the connection
    /// service at index 0 of both tables, and spawns the writer task.
    ///
    /// The caller keeps the read half and drives [`Self::handle_packet`].
    pub fn spawn<W>(
        registry: Arc<ServiceRegistry>,
        game_servers: Arc<HashMap<String, Arc<dyn GameServer>>>,
        config: SessionConfig,
        writer: W,
    ) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (packet_tx, packet_rx) = mpsc::channel(config.packet_queue_depth.max(1));
        let session = Arc::new(Self {
            id: SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)),
            config,
            registry,
            game_servers,
            exports: Mutex::new(Vec::new()),
            imports: Mutex::new(Vec::new()),
            import_map: Mutex::new(HashMap::new()),
            export_map: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            last_token: AtomicU32::new(0),
            received_token: AtomicU32::new(0),
            packet_tx,
            state: StateTracker::new(),
            handlers: Mutex::new(HashMap::new()),
            to_game: Mutex::new(None),
        });

        // The connection service export is implicitly bound at index 0.
        let connection_hash = service_hash(crate::CONNECTION_SERVICE_NAME);
        session.bind_export(0, connection_hash);
        session.bind_import(0, connection_hash);

        session.spawn_writer(writer, packet_rx);
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -- State machine ----------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    /// Sets the state and broadcasts to waiters; returns only after every
    /// waiter for this target state has observed it (see [`crate::state`]).
    pub async fn transition(&self, state: SessionState) {
        tracing::debug!(id = %self.id, %state, "state transition");
        self.state.transition(state).await;
    }

    /// Blocks until the session state matches `state`.
    pub async fn wait_for(&self, state: SessionState) {
        self.state.wait_for(state).await;
    }

    /// Returns a single-shot signal fired once `state` is reached,
    /// implemented as a spawned waiter.
    pub fn signal_on(self: &Arc<Self>, state: SessionState) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.wait_for(state).await;
            let _ = tx.send(());
        });
        rx
    }

    /// Tears the session down: forces `Disconnected` (releasing every
    /// waiter), fails all in-flight requests, and lets the writer and the
    /// packet pump exit on their quit signals.
    pub async fn disconnect(&self) {
        self.transition(SessionState::Disconnected).await;
        // Dropping the senders fails the corresponding `call`s.
        self.pending.lock().unwrap().clear();
        self.handlers.lock().unwrap().clear();
    }

    // -- Export / import binding ------------------------------------------

    /// Installs the service with the given hash at `exports[index]`.
    ///
    /// An unknown hash installs an empty placeholder rather than failing —
    /// invoking that slot later is what actually fails the session.
    /// Re-binding an index overwrites it.
    pub fn bind_export(self: &Arc<Self>, index: usize, hash: u32) {
        let service = self.instantiate(index, hash, "export");
        let mut exports = self.exports.lock().unwrap();
        grow_to(&mut exports, index);
        exports[index] = service;
        drop(exports);
        self.export_map.lock().unwrap().insert(hash, index);
    }

    /// The export slot already holding the service with this hash, if any.
    pub fn export_index(&self, hash: u32) -> Option<usize> {
        self.export_map.lock().unwrap().get(&hash).copied()
    }

    /// Installs the service at `imports[index]` and records the hash → index
    /// mapping used when constructing outbound requests.
    pub fn bind_import(self: &Arc<Self>, index: usize, hash: u32) {
        let service = self.instantiate(index, hash, "import");
        let mut imports = self.imports.lock().unwrap();
        grow_to(&mut imports, index);
        imports[index] = service;
        drop(imports);
        self.import_map.lock().unwrap().insert(hash, index);
    }

    fn instantiate(self: &Arc<Self>, index: usize, hash: u32, table: &str) -> Option<Arc<dyn Service>> {
        match self.registry.lookup(hash) {
            Some(binder) => Some(binder.bind(Some(self))),
            None => {
                tracing::warn!(id = %self.id, index, hash, table, "unknown service");
                None
            }
        }
    }

    /// Number of occupied-or-placeholder export slots.
    pub fn export_count(&self) -> usize {
        self.exports.lock().unwrap().len()
    }

    /// Looks up an already-bound import by name. Linear scan; use the hash
    /// map via [`Self::make_request_header`] on hot paths.
    pub fn imported_service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.imports
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .find(|service| service.name() == name)
            .cloned()
    }

    // -- Request / response correlation -----------------------------------

    /// Builds the header for an outbound request to an imported service,
    /// allocating the next correlation token.
    pub fn make_request_header(
        &self,
        service: &dyn Service,
        method_id: u32,
        body_len: usize,
    ) -> Result<Header, SessionError> {
        let hash = service_hash(service.name());
        let service_id = self
            .import_map
            .lock()
            .unwrap()
            .get(&hash)
            .copied()
            .ok_or(SessionError::UndeclaredImport {
                name: service.name(),
            })?;
        let token = self.last_token.fetch_add(1, Ordering::SeqCst);
        Ok(Header::request(
            service_id as u32,
            method_id,
            token,
            body_len as u32,
        ))
    }

    /// Encodes and enqueues a frame for the writer task.
    ///
    /// Waits at most `write_stall_timeout` for queue room: outgoing frames
    /// leave in queue order, and a queue that stays full means the writer is
    /// dead, which is itself the signal to tear the session down.
    pub async fn queue_packet(&self, header: &Header, body: &[u8]) -> Result<(), SessionError> {
        let packet = encode_frame(header, body)?;
        self.packet_tx
            .send_timeout(packet, self.config.write_stall_timeout)
            .await
            .map_err(|err| match err {
                mpsc::error::SendTimeoutError::Timeout(_) => SessionError::WriteStalled,
                mpsc::error::SendTimeoutError::Closed(_) => SessionError::Disconnected,
            })
    }

    /// Replies to the inbound request identified by `token`.
    pub async fn respond(&self, token: u32, body: &[u8]) -> Result<(), SessionError> {
        self.queue_packet(&Header::response(token, body.len() as u32), body)
            .await
    }

    /// Token of the most recently received request.
    pub fn received_token(&self) -> u32 {
        self.received_token.load(Ordering::SeqCst)
    }

    /// Issues a request to an imported service and awaits the correlated
    /// response body.
    ///
    /// With `response_timeout` unset this waits indefinitely; a peer that
    /// never answers parks the call and its correlation entry forever, as in
    /// the reference behavior.
    pub async fn call(
        &self,
        service: &dyn Service,
        method_id: u32,
        body: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        let header = self.make_request_header(service, method_id, body.len())?;
        let token = header.token;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(token, tx);
        if let Err(e) = self.queue_packet(&header, body).await {
            self.pending.lock().unwrap().remove(&token);
            return Err(e);
        }

        match self.config.response_timeout {
            None => rx.await.map_err(|_| SessionError::ResponseDropped { token }),
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(result) => result.map_err(|_| SessionError::ResponseDropped { token }),
                Err(_) => {
                    self.pending.lock().unwrap().remove(&token);
                    Err(SessionError::ResponseTimeout { token })
                }
            },
        }
    }

    // -- Packet dispatch ---------------------------------------------------

    /// Routes one inbound frame: replies to correlation, requests to export
    /// dispatch. Called from the packet pump; any error tears the session
    /// down.
    pub async fn handle_packet(
        self: &Arc<Self>,
        header: &Header,
        body: Vec<u8>,
    ) -> Result<(), SessionError> {
        if self.state() == SessionState::Disconnected {
            return Err(SessionError::ProtocolViolation(
                "cannot handle packets from a disconnected peer".into(),
            ));
        }
        self.received_token.store(header.token, Ordering::SeqCst);

        if header.is_response() {
            self.handle_response(header.token, body);
            return Ok(());
        }

        if let Some(resp) = self.handle_request(header.service_id, header.method_id, &body).await? {
            self.respond(header.token, &resp).await?;
        }
        Ok(())
    }

    /// Delivers a reply body to the registered waiter. A token with no
    /// waiter is stale or the peer is misbehaving: logged and dropped,
    /// never fatal.
    fn handle_response(&self, token: u32, body: Vec<u8>) {
        match self.pending.lock().unwrap().remove(&token) {
            Some(tx) => {
                // The caller may have timed out and dropped the receiver.
                let _ = tx.send(body);
            }
            None => {
                tracing::warn!(id = %self.id, token, "response token not found");
            }
        }
    }

    async fn handle_request(
        self: &Arc<Self>,
        service_id: u32,
        method_id: u32,
        body: &[u8],
    ) -> Result<Option<Vec<u8>>, SessionError> {
        let service = {
            let exports = self.exports.lock().unwrap();
            exports.get(service_id as usize).cloned().flatten()
        };
        let Some(service) = service else {
            return Err(SessionError::UnknownService { service_id });
        };

        tracing::debug!(
            id = %self.id,
            service = service.name(),
            method = service.method_name(method_id),
            "invoking"
        );
        service
            .invoke(method_id, body)
            .await
            .map_err(|source| SessionError::Handler {
                service: service.name(),
                method: service.method_name(method_id).to_string(),
                source,
            })
    }

    // -- Game-server table -------------------------------------------------

    /// Hands this session to the game server registered for `product`,
    /// which attaches the notification channels.
    pub fn connect_game_server(self: &Arc<Self>, product: &str) -> Result<(), SessionError> {
        match self.game_servers.get(product) {
            Some(server) => {
                server.connect(self);
                Ok(())
            }
            None => Err(SessionError::UnknownGameServer {
                product: product.to_string(),
            }),
        }
    }

    // -- Writer task -------------------------------------------------------

    fn spawn_writer<W>(self: &Arc<Self>, mut writer: W, mut packet_rx: mpsc::Receiver<Vec<u8>>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let session = Arc::clone(self);
        let mut quit = self.signal_on(SessionState::Disconnected);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    packet = packet_rx.recv() => match packet {
                        Some(packet) => {
                            if let Err(e) = writer.write_all(&packet).await {
                                tracing::error!(id = %session.id, error = %e, "write failed");
                                session.disconnect().await;
                                break;
                            }
                            tracing::trace!(id = %session.id, bytes = packet.len(), "wrote packet");
                        }
                        None => break,
                    },
                    _ = &mut quit => break,
                }
            }
            let _ = writer.shutdown().await;
        });
    }
}

fn grow_to(table: &mut ExportTable, index: usize) {
    if index >= table.len() {
        table.resize_with(index + 1, || None);
    }
}
