//! The per-connection packet pump and teardown boundary.
//!
//! Each accepted connection gets one task running this pump: read the
//! 2-byte length prefix, the header, and the body, then hand the frame to
//! the session for dispatch. The session's writer task drains the outgoing
//! queue independently, so request handling never contends with socket
//! writes.
//!
//! This function is also the session's single recovery boundary: every
//! fatal condition — framing, decode, unknown export, handler failure,
//! unhandled notification — surfaces here as an error, closes this session,
//! and touches nothing else.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use brazier_protocol::{ProtocolError, read_frame};
use brazier_session::{GameServer, ServiceRegistry, Session, SessionConfig, SessionState};
use tokio::net::TcpStream;

use crate::BrazierError;

pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<ServiceRegistry>,
    game_servers: Arc<HashMap<String, Arc<dyn GameServer>>>,
    config: SessionConfig,
) -> Result<(), BrazierError> {
    let (mut read_half, write_half) = stream.into_split();
    let session = Session::spawn(registry, game_servers, config, write_half);
    session.transition(SessionState::Connected).await;
    tracing::info!(id = %session.id(), %addr, "session started");

    let mut quit = session.signal_on(SessionState::Disconnected);
    let result = loop {
        tokio::select! {
            frame = read_frame(&mut read_half) => match frame {
                Ok((header, body)) => {
                    if let Err(e) = session.handle_packet(&header, body).await {
                        break Err(BrazierError::Session(e));
                    }
                }
                Err(e) if is_clean_close(&e) => break Ok(()),
                Err(e) => break Err(BrazierError::Protocol(e)),
            },
            _ = &mut quit => break Ok(()),
        }
    };

    if let Err(e) = &result {
        tracing::error!(id = %session.id(), error = %e, "session error; closing");
    }
    session.disconnect().await;
    tracing::info!(id = %session.id(), "session closed");
    result
}

/// An EOF on the length prefix is the peer hanging up between frames — a
/// normal close, not a framing violation.
fn is_clean_close(err: &ProtocolError) -> bool {
    matches!(
        err,
        ProtocolError::Framing {
            stage: "length prefix",
            source,
        } if source.kind() == std::io::ErrorKind::UnexpectedEof
    )
}
