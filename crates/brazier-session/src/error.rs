//! Error types for the session layer.
//!
//! Every protocol violation is an explicit variant, propagated up to a
//! single "tear down this session" boundary at the top of the per-connection
//! task — any of these kills only the session, never the process.

use brazier_protocol::ProtocolError;

use crate::ServiceError;

/// Errors that can occur on a live session. All variants except the
/// response-delivery ones are fatal to the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Framing or decode failure on the wire. The stream position is lost.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A request arrived for a service id with no bound export. The peer is
    /// invoking something it never successfully bound.
    #[error("no export is bound at service id {service_id}")]
    UnknownService { service_id: u32 },

    /// An outbound request targeted a service the peer never declared as an
    /// import during the bind handshake.
    #[error("peer never declared an import for {name}")]
    UndeclaredImport { name: &'static str },

    /// A bound service's handler reported an error. There is no per-call
    /// error frame in this protocol; handler failure ends the session.
    #[error("{service}.{method} failed: {source}")]
    Handler {
        service: &'static str,
        method: String,
        #[source]
        source: ServiceError,
    },

    /// The peer broke a protocol rule that is not covered by a more
    /// specific variant.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The outgoing packet queue stayed full past the stall timeout; the
    /// writer task is presumed dead.
    #[error("outgoing packet queue stalled; writer presumed dead")]
    WriteStalled,

    /// The session was torn down while the operation was in flight.
    #[error("session is disconnected")]
    Disconnected,

    /// A one-shot notification handler for this kind is already registered
    /// and has not fired yet. At most one outstanding registration per kind
    /// is supported.
    #[error("a one-shot handler for {kind:?} is already pending")]
    OnceAlreadyPending { kind: String },

    /// A notification arrived with no one-shot handler and no
    /// `forwardToClient` fallback.
    #[error("unhandled notification kind {kind:?}")]
    UnhandledNotification { kind: String },

    /// A notification needed the game layer, but no game server has
    /// attached channels to this session.
    #[error("no game layer is attached to this session")]
    NoGameLayer,

    /// No game server is registered for the product the client selected.
    #[error("no game server is registered for product {product:?}")]
    UnknownGameServer { product: String },

    /// The in-flight request's response channel was dropped during teardown.
    #[error("no response will arrive for token {token}")]
    ResponseDropped { token: u32 },

    /// The configured response timeout elapsed (see
    /// `SessionConfig::response_timeout`).
    #[error("timed out waiting for the response to token {token}")]
    ResponseTimeout { token: u32 },
}
