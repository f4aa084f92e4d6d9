//! Unified error type for the Brazier server.

use brazier_protocol::ProtocolError;
use brazier_services::StoreError;
use brazier_session::SessionError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `brazier` meta-crate, you deal with this single error type
/// instead of importing errors from each sub-crate.
#[derive(Debug, thiserror::Error)]
pub enum BrazierError {
    /// A framing or decode error on the wire.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (binding, dispatch, correlation, bus).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A record-store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An I/O error from the listener or a connection.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
