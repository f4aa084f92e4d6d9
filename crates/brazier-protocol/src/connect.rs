//! Connect handshake message bodies (connection service, method 1).
//!
//! The client opens a session by enumerating the hashes of the services it
//! wants to import; the server assigns consecutive export indices in request
//! order and reports them back alongside its process identity and clock.

use crate::ProtocolError;
use crate::buf::{ByteReader, ByteWriter};

/// Process identity: an opaque label plus the epoch second it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessId {
    pub label: u32,
    pub epoch: u32,
}

/// Client → server: the bind request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectRequest {
    /// Hashes of the services the client wants to import (invoke on the
    /// server), in the order it wants export indices assigned.
    pub imported_service_hashes: Vec<u32>,
    /// Hashes of the services the client itself exports (the server may
    /// invoke these on the client), positionally assigned client-side
    /// indices starting at 1 — index 0 is the connection service on both
    /// ends.
    pub exported_service_hashes: Vec<u32>,
}

fn write_hashes(w: &mut ByteWriter, hashes: &[u32]) {
    w.put_u16(hashes.len().min(u16::MAX as usize) as u16);
    for hash in hashes {
        w.put_u32(*hash);
    }
}

fn read_hashes(r: &mut ByteReader<'_>) -> Result<Vec<u32>, ProtocolError> {
    let count = r.u16()? as usize;
    let mut hashes = Vec::with_capacity(count);
    for _ in 0..count {
        hashes.push(r.u32()?);
    }
    Ok(hashes)
}

impl ConnectRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(
            4 + 4 * (self.imported_service_hashes.len() + self.exported_service_hashes.len()),
        );
        write_hashes(&mut w, &self.imported_service_hashes);
        write_hashes(&mut w, &self.exported_service_hashes);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("connect request", buf);
        let imported_service_hashes = read_hashes(&mut r)?;
        let exported_service_hashes = read_hashes(&mut r)?;
        r.finish()?;
        Ok(Self {
            imported_service_hashes,
            exported_service_hashes,
        })
    }
}

/// Server → client: the bind result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub server_id: ProcessId,
    pub client_id: ProcessId,
    /// 0 on success.
    pub bind_result: u32,
    /// Export indices assigned to the requested hashes, positionally
    /// matching the request order.
    pub imported_service_ids: Vec<u32>,
    pub server_time_nanos: u64,
}

impl ConnectResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_u32(self.server_id.label);
        w.put_u32(self.server_id.epoch);
        w.put_u32(self.client_id.label);
        w.put_u32(self.client_id.epoch);
        w.put_u32(self.bind_result);
        w.put_u16(self.imported_service_ids.len().min(u16::MAX as usize) as u16);
        for id in &self.imported_service_ids {
            w.put_u32(*id);
        }
        w.put_u64(self.server_time_nanos);
        w.into_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new("connect response", buf);
        let server_id = ProcessId {
            label: r.u32()?,
            epoch: r.u32()?,
        };
        let client_id = ProcessId {
            label: r.u32()?,
            epoch: r.u32()?,
        };
        let bind_result = r.u32()?;
        let count = r.u16()? as usize;
        let mut imported_service_ids = Vec::with_capacity(count);
        for _ in 0..count {
            imported_service_ids.push(r.u32()?);
        }
        let server_time_nanos = r.u64()?;
        r.finish()?;
        Ok(Self {
            server_id,
            client_id,
            bind_result,
            imported_service_ids,
            server_time_nanos,
        })
    }
}
