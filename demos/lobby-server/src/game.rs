//! The demo game layer: answers utility and find-game traffic on the bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use brazier_protocol::{
    ATTR_FORWARD_TO_CLIENT, ATTR_TARGET_ID, AttributeValue, EntityId, NOTIFY_CLIENT_REQUEST,
    NOTIFY_CLIENT_RESPONSE, NOTIFY_FIND_GAME_REQUEST, NOTIFY_FIND_GAME_RESPONSE,
    NOTIFY_QUEUE_RESULT, Notification,
};
use brazier_session::{GameServer, Session};
use tokio::sync::mpsc;

use crate::sim::{CreateGame, CreatePlayer, SimBridge, SimPacket};

/// Demo game layer. One instance serves every session; per-session state
/// lives in the spawned task.
pub struct LobbyGameServer {
    /// Address of an external simulator, if one is running.
    sim_addr: Option<String>,
    next_game_id: AtomicU64,
}

impl LobbyGameServer {
    pub fn new(sim_addr: Option<String>) -> Self {
        Self {
            sim_addr,
            next_game_id: AtomicU64::new(1),
        }
    }
}

impl GameServer for LobbyGameServer {
    fn connect(&self, session: &Arc<Session>) {
        let (to_game_tx, mut to_game_rx) = mpsc::unbounded_channel();
        let (from_game_tx, from_game_rx) = mpsc::unbounded_channel();
        session.attach_game_channels(to_game_tx, from_game_rx);

        let session_id = session.id();
        let sim_addr = self.sim_addr.clone();
        let game_id = self.next_game_id.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            while let Some(notification) = to_game_rx.recv().await {
                match notification.kind.as_str() {
                    NOTIFY_CLIENT_REQUEST => {
                        let _ = from_game_tx.send(answer_util_request(&notification));
                    }
                    NOTIFY_FIND_GAME_REQUEST => {
                        if let Some(addr) = &sim_addr {
                            start_simulation(addr, game_id).await;
                        }
                        let _ = from_game_tx.send(
                            Notification::new(NOTIFY_FIND_GAME_RESPONSE)
                                .with("queued", true)
                                .with("requestId", game_id),
                        );
                        // Queue result follows once the game is up; the demo
                        // reports it immediately.
                        let _ = from_game_tx.send(
                            Notification::new(NOTIFY_QUEUE_RESULT)
                                .with(ATTR_FORWARD_TO_CLIENT, true)
                                .with(ATTR_TARGET_ID, EntityId::new(0, 0))
                                .with("game", game_id),
                        );
                    }
                    other => {
                        tracing::warn!(id = %session_id, kind = other, "unhandled notification");
                    }
                }
            }
            tracing::debug!(id = %session_id, "game layer detached");
        });
    }
}

/// Echo-style utility handler: report the packet id back with the payload.
fn answer_util_request(request: &Notification) -> Notification {
    let payload = request
        .get("p")
        .and_then(AttributeValue::as_blob)
        .map(<[u8]>::to_vec)
        .unwrap_or_default();
    // The first two bytes of the payload are the little-endian packet id.
    let packet_id = match payload.as_slice() {
        [lo, hi, ..] => i64::from(*lo) | (i64::from(*hi) << 8),
        _ => 0,
    };
    Notification::new(NOTIFY_CLIENT_RESPONSE)
        .with("t", packet_id)
        .with("p", payload)
}

async fn start_simulation(addr: &str, game_id: u64) {
    let init = CreateGame {
        players: vec![
            CreatePlayer {
                name: "Player".into(),
                hero: "HERO_01".into(),
                cards: Vec::new(),
            },
            CreatePlayer {
                name: "The Innkeeper".into(),
                hero: "HERO_02".into(),
                cards: Vec::new(),
            },
        ],
    };
    match SimBridge::connect(addr).await {
        Ok(mut bridge) => {
            let packet = SimPacket::create_game(game_id.to_string(), init);
            if let Err(e) = bridge.send(&[packet]).await {
                tracing::warn!(error = %e, "simulator rejected game creation");
            }
        }
        Err(e) => {
            tracing::warn!(addr, error = %e, "simulator unreachable; continuing without it");
        }
    }
}
