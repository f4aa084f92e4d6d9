//! Error types for the protocol layer.
//!
//! Protocol errors are never recoverable locally: a short read or a malformed
//! header means the stream position is lost, and the session that hit it must
//! be torn down. The distinction between the variants matters for logging and
//! for tests, not for recovery.

/// Errors that can occur while framing or decoding wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A read on the underlying stream came up short — on the 2-byte length
    /// prefix, the header, or the body. There is no partial-frame recovery.
    #[error("framing error while reading the {stage}: {source}")]
    Framing {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The bytes were all there but did not parse as the expected record.
    #[error("malformed {what}: {detail}")]
    Decode { what: &'static str, detail: String },

    /// The header declares a body larger than [`MAX_BODY_LEN`](crate::MAX_BODY_LEN).
    #[error("frame body of {size} bytes exceeds the {limit}-byte limit")]
    BodyTooLarge { size: u32, limit: usize },

    /// The header's size field disagrees with the body actually supplied to
    /// the encoder.
    #[error("header declares a {declared}-byte body but {actual} bytes were supplied")]
    SizeMismatch { declared: u32, actual: usize },
}

impl ProtocolError {
    pub(crate) fn decode(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Decode {
            what,
            detail: detail.into(),
        }
    }
}
