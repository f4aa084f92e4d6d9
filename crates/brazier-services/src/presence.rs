//! The presence service: per-entity presence fields with subscription
//! fan-out.
//!
//! Fan-out design: the account manager keeps a single-writer map from
//! subscribed entity to subscriber accounts, with explicit subscribe and
//! unsubscribe. An update is stored, then pushed to every subscriber whose
//! session is Ready, as a wire notification through that subscriber's
//! imported notification listener.

use std::sync::{Arc, Mutex, Weak};

use brazier_protocol::{
    Attribute, EntityId, FieldOperation, PresenceField, PresenceQueryRequest,
    PresenceQueryResponse, PresenceSubscribeRequest, PresenceUnsubscribeRequest,
    PresenceUpdateRequest, WireNotification,
};
use brazier_session::{
    NOTIFICATION_LISTENER_NAME, Service, ServiceBinder, ServiceError, ServiceFuture, Session,
};

use crate::internal;
use crate::{AccountManager, PresenceKey};

pub const PRESENCE_NAME: &str = "bnet.protocol.presence.PresenceService";

/// Kind tag of the fan-out notification pushed to subscribers.
pub const PRESENCE_UPDATE_KIND: &str = "BN.PresenceUpdate";

/// Method index of `OnNotificationReceived` on the listener import.
const ON_NOTIFICATION_RECEIVED: u32 = 1;

const METHODS: &[&str] = &["", "Subscribe", "Unsubscribe", "Update", "Query"];

pub struct PresenceServiceBinder {
    pub accounts: Arc<Mutex<AccountManager>>,
}

impl ServiceBinder for PresenceServiceBinder {
    fn bind(&self, session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        Arc::new(PresenceService {
            sess: session.map(Arc::downgrade).unwrap_or_default(),
            accounts: Arc::clone(&self.accounts),
        })
    }
}

pub struct PresenceService {
    sess: Weak<Session>,
    accounts: Arc<Mutex<AccountManager>>,
}

impl PresenceService {
    fn session(&self) -> Result<Arc<Session>, ServiceError> {
        self.sess
            .upgrade()
            .ok_or_else(|| ServiceError::Internal("session is gone".into()))
    }

    /// The account logged in on this session; presence operations before
    /// login are a protocol violation.
    fn own_account(&self, sess: &Session) -> Result<EntityId, ServiceError> {
        self.accounts
            .lock()
            .unwrap()
            .account_for_session(sess.id())
            .ok_or_else(|| internal("presence operation before login"))
    }

    async fn subscribe(&self, body: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        let req = PresenceSubscribeRequest::decode(body)?;
        let sess = self.session()?;
        let me = self.own_account(&sess)?;
        self.accounts.lock().unwrap().subscribe(req.entity_id, me);
        tracing::debug!(id = %sess.id(), target = %req.entity_id, "presence subscribed");
        Ok(Some(Vec::new()))
    }

    async fn unsubscribe(&self, body: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        let req = PresenceUnsubscribeRequest::decode(body)?;
        let sess = self.session()?;
        let me = self.own_account(&sess)?;
        let removed = self
            .accounts
            .lock()
            .unwrap()
            .unsubscribe(req.entity_id, me);
        if !removed {
            tracing::debug!(
                id = %sess.id(),
                target = %req.entity_id,
                "unsubscribe without subscription"
            );
        }
        Ok(Some(Vec::new()))
    }

    async fn update(&self, body: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        let req = PresenceUpdateRequest::decode(body)?;
        let sess = self.session()?;

        let fanout = {
            let mut accounts = self.accounts.lock().unwrap();
            for op in &req.operations {
                match op {
                    FieldOperation::Set { key, value } => accounts.update_presence(
                        PresenceKey {
                            entity: req.entity_id,
                            field: *key,
                        },
                        value.clone(),
                    ),
                    FieldOperation::Clear { key } => accounts.clear_presence(PresenceKey {
                        entity: req.entity_id,
                        field: *key,
                    }),
                }
            }
            accounts.fanout_sessions(req.entity_id)
        };

        for subscriber in fanout {
            if let Err(e) = push_update(&subscriber, &req).await {
                // A slow or half-dead subscriber must not fail the updater.
                tracing::warn!(
                    id = %sess.id(),
                    subscriber = %subscriber.id(),
                    error = %e,
                    "presence fan-out skipped"
                );
            }
        }
        Ok(Some(Vec::new()))
    }

    async fn query(&self, body: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        let req = PresenceQueryRequest::decode(body)?;
        self.session()?;

        let accounts = self.accounts.lock().unwrap();
        let fields = req
            .keys
            .iter()
            .filter_map(|key| {
                accounts
                    .presence(PresenceKey {
                        entity: req.entity_id,
                        field: *key,
                    })
                    .map(|value| PresenceField {
                        key: *key,
                        value: value.clone(),
                    })
            })
            .collect();
        drop(accounts);

        Ok(Some(PresenceQueryResponse { fields }.encode()))
    }
}

/// Re-encodes the update as a wire notification and queues it on the
/// subscriber's session via its listener import.
async fn push_update(
    subscriber: &Arc<Session>,
    req: &PresenceUpdateRequest,
) -> Result<(), brazier_session::SessionError> {
    let listener = subscriber.imported_service(NOTIFICATION_LISTENER_NAME).ok_or(
        brazier_session::SessionError::UndeclaredImport {
            name: NOTIFICATION_LISTENER_NAME,
        },
    )?;

    let mut attributes = Vec::with_capacity(req.operations.len());
    for op in &req.operations {
        if let FieldOperation::Set { key, value } = op {
            attributes.push(Attribute {
                name: format!("p:{}:{}:{}:{}", key.program, key.group, key.field, key.index),
                value: value.clone(),
            });
        }
    }
    let wire = WireNotification {
        kind: PRESENCE_UPDATE_KIND.to_string(),
        sender_id: Some(req.entity_id),
        target_id: None,
        attributes,
    };
    let body = wire.encode();
    let header =
        subscriber.make_request_header(listener.as_ref(), ON_NOTIFICATION_RECEIVED, body.len())?;
    subscriber.queue_packet(&header, &body).await
}

impl Service for PresenceService {
    fn name(&self) -> &'static str {
        PRESENCE_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn invoke<'a>(&'a self, method_id: u32, body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move {
            match method_id {
                1 => self.subscribe(body).await,
                2 => self.unsubscribe(body).await,
                3 => self.update(body).await,
                4 => self.query(body).await,
                _ => Err(ServiceError::UnknownMethod {
                    service: PRESENCE_NAME,
                    method_id,
                }),
            }
        })
    }
}
