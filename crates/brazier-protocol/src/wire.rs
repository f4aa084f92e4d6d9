//! Frame layout and the RPC header record.
//!
//! Every packet on the wire is one frame:
//!
//! ```text
//! ┌──────────────────┬──────────────────────┬─────────────────┐
//! │ u16 BE headerLen │ headerLen bytes:     │ size bytes:     │
//! │                  │ serialized Header    │ body (may be 0) │
//! └──────────────────┴──────────────────────┴─────────────────┘
//! ```
//!
//! The header record carries `service_id`, `method_id`, `token`, and `size`
//! as big-endian u32s, plus a fifth `status` word on replies. The header
//! length on the wire (16 or 20 bytes) selects which form is present;
//! anything else is a decode error.
//!
//! Decoding reads exactly `headerLen` bytes and then exactly `size` bytes. A
//! short read anywhere — even on the 2-byte prefix — is a fatal connection
//! error; there is no partial-frame recovery.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::ProtocolError;

/// The reserved service id marking a frame as a reply. The token of a reply
/// matches the original request's token; `method_id` is unused.
pub const RESPONSE_SERVICE_ID: u32 = 254;

/// Upper bound on a frame body. Large enough for any message this protocol
/// carries, small enough that a hostile size field cannot exhaust memory.
pub const MAX_BODY_LEN: usize = 1 << 24;

const HEADER_LEN_REQUEST: usize = 16;
const HEADER_LEN_REPLY: usize = 20;

/// The RPC header preceding every frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// For requests: the export index the peer is invoking. For replies:
    /// [`RESPONSE_SERVICE_ID`].
    pub service_id: u32,
    /// Positional index into the target service's method table. Unused (0)
    /// on replies.
    pub method_id: u32,
    /// Correlation token pairing a request with its eventual reply.
    pub token: u32,
    /// Exact length of the body that follows the header.
    pub size: u32,
    /// Reply status word; present on replies only.
    pub status: Option<u32>,
}

impl Header {
    /// Header for an outbound request.
    pub fn request(service_id: u32, method_id: u32, token: u32, size: u32) -> Self {
        Self {
            service_id,
            method_id,
            token,
            size,
            status: None,
        }
    }

    /// Header for a reply to the request identified by `token`.
    pub fn response(token: u32, size: u32) -> Self {
        Self {
            service_id: RESPONSE_SERVICE_ID,
            method_id: 0,
            token,
            size,
            status: Some(0),
        }
    }

    /// True if this frame is a reply rather than a request.
    pub fn is_response(&self) -> bool {
        self.service_id == RESPONSE_SERVICE_ID
    }

    /// Serializes the header record (without the frame's length prefix).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN_REPLY);
        buf.extend_from_slice(&self.service_id.to_be_bytes());
        buf.extend_from_slice(&self.method_id.to_be_bytes());
        buf.extend_from_slice(&self.token.to_be_bytes());
        buf.extend_from_slice(&self.size.to_be_bytes());
        if let Some(status) = self.status {
            buf.extend_from_slice(&status.to_be_bytes());
        }
        buf
    }

    /// Parses a header record of exactly 16 (request) or 20 (reply) bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let status = match buf.len() {
            HEADER_LEN_REQUEST => None,
            HEADER_LEN_REPLY => Some(u32::from_be_bytes(buf[16..20].try_into().unwrap())),
            n => {
                return Err(ProtocolError::decode(
                    "header",
                    format!("length {n} is neither {HEADER_LEN_REQUEST} nor {HEADER_LEN_REPLY}"),
                ));
            }
        };
        Ok(Self {
            service_id: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            method_id: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            token: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            size: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
            status,
        })
    }
}

/// Serializes a complete frame: length prefix, header, body.
///
/// The header's `size` field must already equal `body.len()`; the caller
/// constructs headers through [`Header::request`]/[`Header::response`], which
/// take the size explicitly, so a mismatch is a programming error surfaced as
/// [`ProtocolError::SizeMismatch`] rather than silently re-stamped.
pub fn encode_frame(header: &Header, body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if header.size as usize != body.len() {
        return Err(ProtocolError::SizeMismatch {
            declared: header.size,
            actual: body.len(),
        });
    }
    let head = header.encode();
    let mut packet = Vec::with_capacity(2 + head.len() + body.len());
    packet.extend_from_slice(&(head.len() as u16).to_be_bytes());
    packet.extend_from_slice(&head);
    packet.extend_from_slice(body);
    Ok(packet)
}

/// Reads one frame from the stream: exactly two prefix bytes, exactly
/// `headerLen` header bytes, exactly `size` body bytes.
pub async fn read_frame<R>(stream: &mut R) -> Result<(Header, Vec<u8>), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 2];
    stream
        .read_exact(&mut prefix)
        .await
        .map_err(|source| ProtocolError::Framing {
            stage: "length prefix",
            source,
        })?;
    let header_len = u16::from_be_bytes(prefix) as usize;

    let mut head = vec![0u8; header_len];
    stream
        .read_exact(&mut head)
        .await
        .map_err(|source| ProtocolError::Framing {
            stage: "header",
            source,
        })?;
    let header = Header::decode(&head)?;

    let size = header.size as usize;
    if size > MAX_BODY_LEN {
        return Err(ProtocolError::BodyTooLarge {
            size: header.size,
            limit: MAX_BODY_LEN,
        });
    }
    let mut body = vec![0u8; size];
    if size > 0 {
        stream
            .read_exact(&mut body)
            .await
            .map_err(|source| ProtocolError::Framing {
                stage: "body",
                source,
            })?;
    }
    Ok((header, body))
}
