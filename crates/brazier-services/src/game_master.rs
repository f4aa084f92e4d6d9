//! The game-master service: matchmaking entry points.
//!
//! `FindGame` mirrors the game-utilities bus round trip: the request becomes
//! a find-game notification for the game layer, and a one-shot continuation
//! answers the client once matchmaking reports back.

use std::sync::{Arc, Weak};

use brazier_protocol::{
    AttributeValue, FindGameRequest, FindGameResponse, NOTIFY_FIND_GAME_REQUEST,
    NOTIFY_FIND_GAME_RESPONSE, Notification,
};
use brazier_session::{Service, ServiceBinder, ServiceError, ServiceFuture, Session, SessionError};

use crate::internal;

pub const GAME_MASTER_NAME: &str = "bnet.protocol.game_master.GameMaster";

const METHODS: &[&str] = &[
    "",
    "JoinGame",
    "ListFactories",
    "FindGame",
    "CancelGameEntry",
    "GameEnded",
    "PlayerLeft",
    "RegisterServer",
    "UnregisterServer",
    "RegisterUtilities",
    "UnregisterUtilities",
    "Subscribe",
    "Unsubscribe",
    "ChangeGame",
    "GetFactoryInfo",
    "GetGameStats",
];

pub struct GameMasterServiceBinder;

impl ServiceBinder for GameMasterServiceBinder {
    fn bind(&self, session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        Arc::new(GameMasterService {
            sess: session.map(Arc::downgrade).unwrap_or_default(),
        })
    }
}

pub struct GameMasterService {
    sess: Weak<Session>,
}

impl GameMasterService {
    fn session(&self) -> Result<Arc<Session>, ServiceError> {
        self.sess
            .upgrade()
            .ok_or_else(|| ServiceError::Internal("session is gone".into()))
    }

    async fn find_game(&self, body: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        let req = FindGameRequest::decode(body)?;
        let sess = self.session()?;
        let token = sess.received_token();
        tracing::debug!(
            id = %sess.id(),
            advanced = req.advanced_notification,
            attributes = req.player_attributes.len(),
            "find game"
        );

        let mut notify = Notification::new(NOTIFY_FIND_GAME_REQUEST)
            .with("advanced_notification", req.advanced_notification);
        notify.attributes.extend(req.player_attributes);

        let responder = Arc::clone(&sess);
        sess.once_notified(
            NOTIFY_FIND_GAME_RESPONSE,
            Box::new(move |n| {
                Box::pin(async move {
                    let map = n.flattened();
                    let queued = map
                        .get("queued")
                        .and_then(|v| v.as_bool())
                        .ok_or_else(|| missing_attr(&n.kind, "queued"))?;
                    let request_id = map
                        .get("requestId")
                        .and_then(|v| v.as_uint())
                        .ok_or_else(|| missing_attr(&n.kind, "requestId"))?;
                    let body = FindGameResponse {
                        queued,
                        request_id,
                        factory_id: 0,
                    }
                    .encode();
                    responder.respond(token, &body).await
                })
            }),
        )
        .map_err(internal)?;

        sess.notify_game(notify).map_err(internal)?;
        Ok(None)
    }

    async fn cancel_game_entry(&self, _body: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        let sess = self.session()?;
        tracing::debug!(id = %sess.id(), "game entry cancelled");
        Ok(Some(Vec::new()))
    }
}

fn missing_attr(kind: &str, name: &str) -> SessionError {
    SessionError::ProtocolViolation(format!("{kind} notification lacks the {name} attribute"))
}

impl Service for GameMasterService {
    fn name(&self) -> &'static str {
        GAME_MASTER_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn invoke<'a>(&'a self, method_id: u32, body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move {
            match method_id as usize {
                3 => self.find_game(body).await,
                4 => self.cancel_game_entry(body).await,
                1 | 2 | 5..=15 => Err(ServiceError::NotImplemented {
                    service: GAME_MASTER_NAME,
                    method: METHODS[method_id as usize],
                }),
                _ => Err(ServiceError::UnknownMethod {
                    service: GAME_MASTER_NAME,
                    method_id,
                }),
            }
        })
    }
}
