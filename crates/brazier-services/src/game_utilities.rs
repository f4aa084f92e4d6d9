//! The game-utilities service: arbitrates opaque packets between the client
//! and the game layer.
//!
//! `ProcessClientRequest` is the canonical bus round trip: capture the
//! inbound token, register a one-shot continuation for the game layer's
//! response, and forward the request attributes across the bus. The reply
//! frame goes out when — and only when — the game layer answers.

use std::sync::{Arc, Weak};

use brazier_protocol::{
    ClientRequest, ClientResponse, NOTIFY_CLIENT_REQUEST, NOTIFY_CLIENT_RESPONSE, Notification,
};
use brazier_session::{Service, ServiceBinder, ServiceError, ServiceFuture, Session};

use crate::internal;

pub const GAME_UTILITIES_NAME: &str = "bnet.protocol.game_utilities.GameUtilities";

const METHODS: &[&str] = &[
    "",
    "ProcessClientRequest",
    "PresenceChannelCreated",
    "GetPlayerVariables",
    "",
    "GetLoad",
    "ProcessServerRequest",
    "NotifyGameAccountOnline",
    "NotifyGameAccountOffline",
];

pub struct GameUtilitiesServiceBinder;

impl ServiceBinder for GameUtilitiesServiceBinder {
    fn bind(&self, session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        Arc::new(GameUtilitiesService {
            sess: session.map(Arc::downgrade).unwrap_or_default(),
        })
    }
}

pub struct GameUtilitiesService {
    sess: Weak<Session>,
}

impl GameUtilitiesService {
    fn session(&self) -> Result<Arc<Session>, ServiceError> {
        self.sess
            .upgrade()
            .ok_or_else(|| ServiceError::Internal("session is gone".into()))
    }

    async fn process_client_request(&self, body: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        let req = ClientRequest::decode(body)?;
        let sess = self.session()?;
        let token = sess.received_token();

        let responder = Arc::clone(&sess);
        sess.once_notified(
            NOTIFY_CLIENT_RESPONSE,
            Box::new(move |n| {
                Box::pin(async move {
                    if n.attributes.len() < 2 {
                        // An underfilled response would error on the client;
                        // swallow it and leave the request unanswered.
                        tracing::warn!(
                            id = %responder.id(),
                            attributes = n.attributes.len(),
                            "dropping underfilled client response"
                        );
                        return Ok(());
                    }
                    let body = ClientResponse {
                        attributes: n.attributes,
                    }
                    .encode();
                    responder.respond(token, &body).await
                })
            }),
        )
        .map_err(internal)?;

        sess.notify_game(Notification {
            kind: NOTIFY_CLIENT_REQUEST.to_string(),
            attributes: req.attributes,
        })
        .map_err(internal)?;

        // No immediate reply; the one-shot continuation responds.
        Ok(None)
    }
}

impl Service for GameUtilitiesService {
    fn name(&self) -> &'static str {
        GAME_UTILITIES_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn invoke<'a>(&'a self, method_id: u32, body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move {
            match method_id as usize {
                1 => self.process_client_request(body).await,
                2 | 3 | 5 | 6 | 7 | 8 => Err(ServiceError::NotImplemented {
                    service: GAME_UTILITIES_NAME,
                    method: METHODS[method_id as usize],
                }),
                _ => Err(ServiceError::UnknownMethod {
                    service: GAME_UTILITIES_NAME,
                    method_id,
                }),
            }
        })
    }
}
