//! The Brazier session engine.
//!
//! This crate is the stateful heart of the platform server: the service
//! contract and registry, the per-connection [`Session`] with its bind
//! tables, request/response correlation, state machine, and outgoing packet
//! queue, and the asynchronous notification bus joining the platform layer
//! to a game layer.
//!
//! The accept loop and the per-connection read pump live in the `brazier`
//! crate; concrete platform services live in `brazier-services`.

mod bus;
mod connection;
mod error;
mod service;
mod session;
mod state;

pub use bus::{GameServer, NOTIFICATION_LISTENER_NAME, NotifyFuture, NotifyHandler};
pub use connection::{CONNECTION_SERVICE_NAME, ConnectionService, ConnectionServiceBinder};
pub use error::SessionError;
pub use service::{
    Service, ServiceBinder, ServiceError, ServiceFuture, ServiceRegistry, ServiceResult,
};
pub use session::{Session, SessionConfig, SessionId};
pub use state::SessionState;
