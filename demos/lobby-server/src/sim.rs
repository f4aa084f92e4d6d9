//! Bridge to an external game-simulation process.
//!
//! The simulator is a sibling process speaking its own length-prefixed JSON
//! protocol: a u32 big-endian length followed by a JSON array of packets —
//! the same framing discipline as the platform's wire codec, with JSON in
//! place of the binary header.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Refuse to read absurd length prefixes from a confused simulator.
const MAX_PACKET_LEN: usize = 1 << 22;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatePlayer {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Hero")]
    pub hero: String,
    #[serde(rename = "Cards")]
    pub cards: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateGame {
    #[serde(rename = "Players")]
    pub players: Vec<CreatePlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimPacket {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "GameID")]
    pub game_id: String,
    #[serde(rename = "CreateGame", skip_serializing_if = "Option::is_none")]
    pub create_game: Option<CreateGame>,
}

impl SimPacket {
    pub fn create_game(game_id: impl Into<String>, init: CreateGame) -> Self {
        Self {
            kind: "CreateGame".into(),
            game_id: game_id.into(),
            create_game: Some(init),
        }
    }
}

/// Serializes a packet batch with its length prefix.
pub fn encode_packets(packets: &[SimPacket]) -> std::io::Result<Vec<u8>> {
    let json = serde_json::to_vec(packets)?;
    let mut framed = Vec::with_capacity(4 + json.len());
    framed.extend_from_slice(&(json.len() as u32).to_be_bytes());
    framed.extend_from_slice(&json);
    Ok(framed)
}

/// Parses one length-delimited packet batch from a buffer that already
/// excludes the prefix.
pub fn decode_packets(json: &[u8]) -> std::io::Result<Vec<SimPacket>> {
    serde_json::from_slice(json).map_err(Into::into)
}

/// A connection to the simulator process.
pub struct SimBridge {
    stream: TcpStream,
}

impl SimBridge {
    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        tracing::info!(addr, "connected to simulator");
        Ok(Self { stream })
    }

    pub async fn send(&mut self, packets: &[SimPacket]) -> std::io::Result<()> {
        let framed = encode_packets(packets)?;
        self.stream.write_all(&framed).await
    }

    pub async fn recv(&mut self) -> std::io::Result<Vec<SimPacket>> {
        let mut prefix = [0u8; 4];
        self.stream.read_exact(&mut prefix).await?;
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_PACKET_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("simulator packet of {len} bytes exceeds the limit"),
            ));
        }
        let mut json = vec![0u8; len];
        self.stream.read_exact(&mut json).await?;
        decode_packets(&json)
    }
}
