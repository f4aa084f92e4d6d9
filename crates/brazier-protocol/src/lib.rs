//! Wire protocol for the Brazier RPC engine.
//!
//! This crate defines everything that travels "on the wire" between a client
//! and the platform server: the length-prefixed frame layout, the RPC header
//! record, the service-name hash used by the bind handshake, and the value
//! types (attributes, notifications, entity ids) shared between the wire
//! protocol and the in-process notification bus.
//!
//! The codecs here are pure and stateless — both the read and the write path
//! of a session go through them, and nothing in this crate knows about
//! sessions, sockets, or dispatch.

mod attribute;
mod buf;
mod connect;
mod entity;
mod error;
mod hash;
mod messages;
mod notification;
mod presence;
mod wire;

pub use attribute::{Attribute, AttributeValue, decode_attributes, encode_attributes};
pub use connect::{ConnectRequest, ConnectResponse, ProcessId};
pub use entity::{
    ENTITY_GAME_APP, ENTITY_GAME_NONE, ENTITY_GAME_PEGASUS, ENTITY_KIND_ACCOUNT,
    ENTITY_KIND_CHANNEL, ENTITY_KIND_GAME_ACCOUNT, ENTITY_REGION_TEST, EntityId, fourcc,
};
pub use error::ProtocolError;
pub use hash::service_hash;
pub use messages::{
    ChallengeExternalRequest, ClientRequest, ClientResponse, ERROR_NO_AUTH, ERROR_OK,
    FindGameRequest, FindGameResponse, LogonQueueUpdate, LogonRequest, LogonResult,
    VerifyWebCredentialsRequest,
};
pub use notification::{
    ATTR_FORWARD_TO_CLIENT, ATTR_SENDER_ID, ATTR_TARGET_ID, NOTIFY_CLIENT_REQUEST,
    NOTIFY_CLIENT_RESPONSE, NOTIFY_FIND_GAME_REQUEST, NOTIFY_FIND_GAME_RESPONSE,
    NOTIFY_MATCHMAKER_END, NOTIFY_MATCHMAKER_START, NOTIFY_QUEUE_ENTRY, NOTIFY_QUEUE_EXIT,
    NOTIFY_QUEUE_RESULT, NOTIFY_QUEUE_UPDATE, NOTIFY_SPECTATOR_INVITE, NOTIFY_WHISPER,
    Notification, WireNotification,
};
pub use presence::{
    FieldKey, FieldOperation, PresenceField, PresenceQueryRequest, PresenceQueryResponse,
    PresenceSubscribeRequest, PresenceUnsubscribeRequest, PresenceUpdateRequest,
};
pub use wire::{Header, MAX_BODY_LEN, RESPONSE_SERVICE_ID, encode_frame, read_frame};
