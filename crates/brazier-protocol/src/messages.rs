//! Message bodies for the authentication, game-utilities, and game-master
//! services.
//!
//! Reproducing the original's serialization of these records is a non-goal;
//! the field sets are what matter. Each body encodes with the same cursor
//! discipline as the rest of the protocol and rejects trailing bytes.

use crate::attribute::{read_attributes, write_attributes};
use crate::buf::{ByteReader, ByteWriter};
use crate::{Attribute, EntityId, ProtocolError};

/// Logon result codes.
pub const ERROR_OK: u32 = 0;
pub const ERROR_NO_AUTH: u32 = 3003;

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Client → server: start the logon flow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogonRequest {
    /// FourCC of the product being logged into (e.g. "WTCG").
    pub program: String,
    pub email: String,
}

impl LogonRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_str(&self.program);
        w.put_str(&self.email);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("logon request", buf);
        let program = r.str()?;
        let email = r.str()?;
        r.finish()?;
        Ok(Self { program, email })
    }
}

/// Client → server: prove identity with a pre-shared web credential.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerifyWebCredentialsRequest {
    pub credentials: Vec<u8>,
}

impl VerifyWebCredentialsRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_blob(&self.credentials);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("verify web credentials request", buf);
        let credentials = r.blob()?;
        r.finish()?;
        Ok(Self { credentials })
    }
}

/// Server → client (via the imported authentication-client service):
/// the outcome of the logon flow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogonResult {
    pub error_code: u32,
    pub account: Option<EntityId>,
    pub game_accounts: Vec<EntityId>,
    pub connected_region: u32,
}

impl LogonResult {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_u32(self.error_code);
        w.put_u8(u8::from(self.account.is_some()));
        if let Some(id) = self.account {
            w.put_u64(id.high);
            w.put_u64(id.low);
        }
        w.put_u16(self.game_accounts.len().min(u16::MAX as usize) as u16);
        for id in &self.game_accounts {
            w.put_u64(id.high);
            w.put_u64(id.low);
        }
        w.put_u32(self.connected_region);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("logon result", buf);
        let error_code = r.u32()?;
        let account = if r.u8()? != 0 {
            Some(EntityId::new(r.u64()?, r.u64()?))
        } else {
            None
        };
        let count = r.u16()? as usize;
        let mut game_accounts = Vec::with_capacity(count);
        for _ in 0..count {
            game_accounts.push(EntityId::new(r.u64()?, r.u64()?));
        }
        let connected_region = r.u32()?;
        r.finish()?;
        Ok(Self {
            error_code,
            account,
            game_accounts,
            connected_region,
        })
    }
}

/// Server → client: position in the logon queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogonQueueUpdate {
    pub position: u32,
    pub estimated_time: u64,
    pub eta_deviation_secs: u64,
}

impl LogonQueueUpdate {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(20);
        w.put_u32(self.position);
        w.put_u64(self.estimated_time);
        w.put_u64(self.eta_deviation_secs);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("logon queue update", buf);
        let update = Self {
            position: r.u32()?,
            estimated_time: r.u64()?,
            eta_deviation_secs: r.u64()?,
        };
        r.finish()?;
        Ok(update)
    }
}

/// Server → client (via the imported challenge-notify service): an external
/// challenge the client must satisfy, e.g. a web-auth URL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChallengeExternalRequest {
    pub payload_type: String,
    pub payload: Vec<u8>,
}

impl ChallengeExternalRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_str(&self.payload_type);
        w.put_blob(&self.payload);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("external challenge request", buf);
        let payload_type = r.str()?;
        let payload = r.blob()?;
        r.finish()?;
        Ok(Self {
            payload_type,
            payload,
        })
    }
}

// ---------------------------------------------------------------------------
// Game utilities
// ---------------------------------------------------------------------------

/// Client → server: an opaque game request expressed as attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientRequest {
    pub attributes: Vec<Attribute>,
}

impl ClientRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        write_attributes(&mut w, &self.attributes);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("client request", buf);
        let attributes = read_attributes(&mut r)?;
        r.finish()?;
        Ok(Self { attributes })
    }
}

/// Server → client: the attribute payload answering a [`ClientRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientResponse {
    pub attributes: Vec<Attribute>,
}

impl ClientResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        write_attributes(&mut w, &self.attributes);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("client response", buf);
        let attributes = read_attributes(&mut r)?;
        r.finish()?;
        Ok(Self { attributes })
    }
}

// ---------------------------------------------------------------------------
// Game master
// ---------------------------------------------------------------------------

/// Client → server: enter matchmaking.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindGameRequest {
    pub advanced_notification: bool,
    /// Attributes of the requesting player (deck, scenario, game type, ...).
    pub player_attributes: Vec<Attribute>,
}

impl FindGameRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_u8(u8::from(self.advanced_notification));
        write_attributes(&mut w, &self.player_attributes);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("find game request", buf);
        let advanced_notification = r.u8()? != 0;
        let player_attributes = read_attributes(&mut r)?;
        r.finish()?;
        Ok(Self {
            advanced_notification,
            player_attributes,
        })
    }
}

/// Server → client: matchmaking acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FindGameResponse {
    pub queued: bool,
    pub request_id: u64,
    pub factory_id: u64,
}

impl FindGameResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(17);
        w.put_u8(u8::from(self.queued));
        w.put_u64(self.request_id);
        w.put_u64(self.factory_id);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("find game response", buf);
        let resp = Self {
            queued: r.u8()? != 0,
            request_id: r.u64()?,
            factory_id: r.u64()?,
        };
        r.finish()?;
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logon_request_round_trip() {
        let req = LogonRequest {
            program: "WTCG".into(),
            email: "innkeeper@example.com".into(),
        };
        assert_eq!(LogonRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn test_verify_web_credentials_round_trip() {
        let req = VerifyWebCredentialsRequest {
            credentials: b"secret-token".to_vec(),
        };
        assert_eq!(
            VerifyWebCredentialsRequest::decode(&req.encode()).unwrap(),
            req
        );
    }

    #[test]
    fn test_logon_result_success_round_trip() {
        let res = LogonResult {
            error_code: ERROR_OK,
            account: Some(EntityId::account(11)),
            game_accounts: vec![EntityId::game_account(crate::ENTITY_GAME_PEGASUS, 11)],
            connected_region: 0x5553,
        };
        assert_eq!(LogonResult::decode(&res.encode()).unwrap(), res);
    }

    #[test]
    fn test_logon_result_failure_has_no_account() {
        let res = LogonResult {
            error_code: ERROR_NO_AUTH,
            ..Default::default()
        };
        let decoded = LogonResult::decode(&res.encode()).unwrap();
        assert_eq!(decoded.error_code, ERROR_NO_AUTH);
        assert!(decoded.account.is_none());
        assert!(decoded.game_accounts.is_empty());
    }

    #[test]
    fn test_logon_queue_update_round_trip() {
        let update = LogonQueueUpdate {
            position: 0,
            estimated_time: 0,
            eta_deviation_secs: 0,
        };
        assert_eq!(LogonQueueUpdate::decode(&update.encode()).unwrap(), update);
    }

    #[test]
    fn test_challenge_external_request_round_trip() {
        let req = ChallengeExternalRequest {
            payload_type: "web_auth_url".into(),
            payload: b"https://auth.example.com".to_vec(),
        };
        assert_eq!(
            ChallengeExternalRequest::decode(&req.encode()).unwrap(),
            req
        );
    }

    #[test]
    fn test_client_request_round_trip() {
        let req = ClientRequest {
            attributes: vec![
                Attribute::new("p", vec![1u8, 0, 9]),
                Attribute::new("v", 3i64),
            ],
        };
        assert_eq!(ClientRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn test_find_game_request_round_trip() {
        let req = FindGameRequest {
            advanced_notification: true,
            player_attributes: vec![
                Attribute::new("type", 1i64),
                Attribute::new("deck", 42i64),
                Attribute::new("scenario", 2i64),
            ],
        };
        assert_eq!(FindGameRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn test_find_game_response_round_trip() {
        let resp = FindGameResponse {
            queued: true,
            request_id: 1,
            factory_id: 0,
        };
        assert_eq!(FindGameResponse::decode(&resp.encode()).unwrap(), resp);
    }
}
