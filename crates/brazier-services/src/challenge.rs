//! The challenge-notify service: a client export the server uses to demand
//! proof of authentication.
//!
//! Binding it arms a task that waits for the session to reach LoggingIn and
//! then pushes an external web-auth challenge. The state machine's
//! synchronous-handoff guarantee is what makes this reliable: the logon flow
//! cannot complete before this task has observed LoggingIn.

use std::sync::{Arc, Weak};

use brazier_protocol::ChallengeExternalRequest;
use brazier_session::{Service, ServiceBinder, ServiceError, ServiceFuture, Session, SessionState};

pub const CHALLENGE_NOTIFY_NAME: &str = "bnet.protocol.challenge.ChallengeNotify";

/// Method index of `OnExternalChallenge` on the client's export.
const ON_EXTERNAL_CHALLENGE: u32 = 3;

const METHODS: &[&str] = &[
    "",
    "ChallengeUser",
    "ChallengeResult",
    "OnExternalChallenge",
    "OnExternalChallengeResult",
];

pub struct ChallengeNotifyServiceBinder {
    /// URL the client is sent to for web authentication.
    pub web_auth_url: String,
}

impl ServiceBinder for ChallengeNotifyServiceBinder {
    fn bind(&self, session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        let service = Arc::new(ChallengeNotifyService {
            sess: session.map(Arc::downgrade).unwrap_or_default(),
            web_auth_url: self.web_auth_url.clone(),
        });
        if let Some(session) = session {
            tokio::spawn(run(Arc::clone(&service), Arc::clone(session)));
        }
        service
    }
}

pub struct ChallengeNotifyService {
    sess: Weak<Session>,
    web_auth_url: String,
}

async fn run(service: Arc<ChallengeNotifyService>, session: Arc<Session>) {
    tokio::select! {
        _ = session.wait_for(SessionState::LoggingIn) => {}
        _ = session.wait_for(SessionState::Disconnected) => return,
    }
    tracing::debug!(id = %session.id(), "issuing external challenge");

    let body = ChallengeExternalRequest {
        payload_type: "web_auth_url".into(),
        payload: service.web_auth_url.clone().into_bytes(),
    }
    .encode();

    let result = match session.make_request_header(&*service, ON_EXTERNAL_CHALLENGE, body.len()) {
        Ok(header) => session.queue_packet(&header, &body).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::error!(id = %session.id(), error = %e, "challenge delivery failed; closing session");
        session.disconnect().await;
    }
}

impl Service for ChallengeNotifyService {
    fn name(&self) -> &'static str {
        CHALLENGE_NOTIFY_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn invoke<'a>(&'a self, _method_id: u32, _body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move { Err(ServiceError::ClientExport(CHALLENGE_NOTIFY_NAME)) })
    }
}
