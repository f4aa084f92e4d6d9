//! Notifications: typed, attribute-keyed messages.
//!
//! A [`Notification`] serves two roles. In process, it is the payload of the
//! cross-layer bus between the platform layer and the game layer. On the
//! wire, the [`WireNotification`] form is what the platform pushes down to a
//! connected client through its imported notification-listener service.

use std::collections::HashMap;

use crate::attribute::{read_attributes, write_attributes};
use crate::buf::{ByteReader, ByteWriter};
use crate::{Attribute, AttributeValue, EntityId, ProtocolError};

// Notification kinds exchanged between the platform layer and game layers.
pub const NOTIFY_CLIENT_REQUEST: &str = "GS_CL_REQ";
pub const NOTIFY_CLIENT_RESPONSE: &str = "GS_CL_RES";
pub const NOTIFY_FIND_GAME_REQUEST: &str = "GS_FG_REQ";
pub const NOTIFY_FIND_GAME_RESPONSE: &str = "GS_FG_RES";
pub const NOTIFY_QUEUE_ENTRY: &str = "GQ_ENTRY";
pub const NOTIFY_QUEUE_UPDATE: &str = "GQ_UPDATE";
pub const NOTIFY_QUEUE_EXIT: &str = "GQ_EXIT";
pub const NOTIFY_QUEUE_RESULT: &str = "G_RESULT";
pub const NOTIFY_MATCHMAKER_START: &str = "MM_START";
pub const NOTIFY_MATCHMAKER_END: &str = "MM_END";
pub const NOTIFY_WHISPER: &str = "WHISPER";
pub const NOTIFY_SPECTATOR_INVITE: &str = "WTCG.SpectatorInvite";

// Reserved attribute names consumed by the dispatch fallback rather than
// forwarded as payload.
pub const ATTR_FORWARD_TO_CLIENT: &str = "forwardToClient";
pub const ATTR_TARGET_ID: &str = "targetId";
pub const ATTR_SENDER_ID: &str = "senderId";

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A typed message with an ordered attribute list.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: String,
    pub attributes: Vec<Attribute>,
}

impl Notification {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    /// Builder-style attribute append.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.push(Attribute::new(name, value));
    }

    /// First attribute with the given name, if any.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| &attr.value)
    }

    /// The flattened-map view of the attribute list.
    ///
    /// Attribute names are expected to be unique within one notification; if
    /// they are not, later entries shadow earlier ones and the shadowed
    /// values are silently lost. Callers that care about duplicates must
    /// walk `attributes` directly.
    pub fn flattened(&self) -> HashMap<&str, &AttributeValue> {
        self.attributes
            .iter()
            .map(|attr| (attr.name.as_str(), &attr.value))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// WireNotification
// ---------------------------------------------------------------------------

/// The on-the-wire form pushed to a client: kind, optional addressing, and
/// the payload attributes that survived the reserved-name filter.
#[derive(Debug, Clone, PartialEq)]
pub struct WireNotification {
    pub kind: String,
    pub sender_id: Option<EntityId>,
    pub target_id: Option<EntityId>,
    pub attributes: Vec<Attribute>,
}

const FLAG_SENDER: u8 = 0b01;
const FLAG_TARGET: u8 = 0b10;

impl WireNotification {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_str(&self.kind);
        let mut flags = 0u8;
        if self.sender_id.is_some() {
            flags |= FLAG_SENDER;
        }
        if self.target_id.is_some() {
            flags |= FLAG_TARGET;
        }
        w.put_u8(flags);
        if let Some(id) = self.sender_id {
            w.put_u64(id.high);
            w.put_u64(id.low);
        }
        if let Some(id) = self.target_id {
            w.put_u64(id.high);
            w.put_u64(id.low);
        }
        write_attributes(&mut w, &self.attributes);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("notification", buf);
        let kind = r.str()?;
        let flags = r.u8()?;
        let sender_id = if flags & FLAG_SENDER != 0 {
            Some(EntityId::new(r.u64()?, r.u64()?))
        } else {
            None
        };
        let target_id = if flags & FLAG_TARGET != 0 {
            Some(EntityId::new(r.u64()?, r.u64()?))
        } else {
            None
        };
        let attributes = read_attributes(&mut r)?;
        r.finish()?;
        Ok(Self {
            kind,
            sender_id,
            target_id,
            attributes,
        })
    }
}
