//! # Brazier
//!
//! A platform server speaking a binary RPC protocol that multiplexes many
//! named services over a single persistent TCP connection per client.
//!
//! The `brazier` meta-crate ties the layers together: wire codec
//! (`brazier-protocol`) → session engine (`brazier-session`) → platform
//! services (`brazier-services`). Implement
//! [`GameServer`](brazier_session::GameServer) for your game layer, register
//! it under its product FourCC, and run:
//!
//! ```rust,no_run
//! use brazier::prelude::*;
//! # async fn run(game: std::sync::Arc<dyn GameServer>) -> Result<(), BrazierError> {
//! let server = Server::builder()
//!     .bind("0.0.0.0:1119")
//!     .register_game_server("WTCG", game)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::BrazierError;
pub use server::{Server, ServerBuilder};

pub mod prelude {
    pub use crate::{BrazierError, Server, ServerBuilder};
    pub use brazier_protocol::{
        Attribute, AttributeValue, EntityId, Header, Notification, service_hash,
    };
    pub use brazier_services::{AccountRecord, MemoryStore, RecordStore};
    pub use brazier_session::{
        GameServer, Service, ServiceBinder, ServiceError, ServiceRegistry, Session, SessionConfig,
        SessionError, SessionState,
    };
}
