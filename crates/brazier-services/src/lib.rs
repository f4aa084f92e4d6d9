//! Platform services for the Brazier server.
//!
//! Everything here plugs into the session engine through the uniform
//! [`Service`](brazier_session::Service) contract: the authentication flow,
//! the challenge push, the notification listener, game utilities and game
//! master (the two bus-driven request arbiters), presence with subscription
//! fan-out, the account manager, and the record-store boundary.

mod accounts;
mod auth;
mod challenge;
mod game_master;
mod game_utilities;
mod listener;
mod presence;
mod store;

pub use accounts::{AccountEntry, AccountManager, PresenceKey};
pub use auth::{
    AUTH_CLIENT_NAME, AUTH_SERVER_NAME, AuthClientService, AuthClientServiceBinder,
    AuthServerService, AuthServerServiceBinder,
};
pub use challenge::{CHALLENGE_NOTIFY_NAME, ChallengeNotifyService, ChallengeNotifyServiceBinder};
pub use game_master::{GAME_MASTER_NAME, GameMasterService, GameMasterServiceBinder};
pub use game_utilities::{GAME_UTILITIES_NAME, GameUtilitiesService, GameUtilitiesServiceBinder};
pub use listener::{NotificationListenerService, NotificationListenerServiceBinder};
pub use presence::{
    PRESENCE_NAME, PRESENCE_UPDATE_KIND, PresenceService, PresenceServiceBinder,
};
pub use store::{AccountField, AccountRecord, MemoryStore, RecordStore, StoreError};

/// Maps a lower-layer failure into a handler-internal service error.
pub(crate) fn internal(err: impl std::fmt::Display) -> brazier_session::ServiceError {
    brazier_session::ServiceError::Internal(err.to_string())
}
