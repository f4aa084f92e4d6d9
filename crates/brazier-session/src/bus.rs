//! The cross-layer notification bus.
//!
//! The platform layer and the game layer evolve independently and must not
//! import each other's types; they talk through per-session channels of
//! [`Notification`] values instead. A request arriving on one side can be
//! serviced by logic living entirely on the other side: the platform handler
//! registers a one-shot continuation for the response kind, pushes the
//! request onto the bus, and the game layer answers on its own schedule.
//!
//! The handler table is a per-session keyed single-slot mailbox registry —
//! never process-wide, so nothing leaks across connections.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use brazier_protocol::{
    ATTR_FORWARD_TO_CLIENT, ATTR_SENDER_ID, ATTR_TARGET_ID, Notification, WireNotification,
};
use tokio::sync::mpsc;

use crate::{Session, SessionError, SessionState};

/// Fully qualified name of the client's notification-listener export, the
/// target of the `forwardToClient` fallback.
pub const NOTIFICATION_LISTENER_NAME: &str = "bnet.protocol.notification.NotificationListener";

/// Method index of `OnNotificationReceived` on the notification listener.
pub(crate) const NOTIFICATION_LISTENER_NOTIFY: u32 = 1;

/// Future returned by a one-shot notification handler.
pub type NotifyFuture = Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send>>;

/// A one-shot notification consumer: fires on the next matching-kind
/// message, then is automatically deregistered.
pub type NotifyHandler = Box<dyn FnOnce(Notification) -> NotifyFuture + Send>;

/// A game layer that accepts platform sessions.
pub trait GameServer: Send + Sync {
    /// Connects the platform session to the game layer. The implementation
    /// creates the two notification channels and installs them via
    /// [`Session::attach_game_channels`].
    fn connect(&self, session: &Arc<Session>);
}

impl Session {
    /// Installs the platform → game sender and spawns the dispatch loop for
    /// game → platform notifications. Called by [`GameServer::connect`]
    /// implementations.
    pub fn attach_game_channels(
        self: &Arc<Self>,
        to_game: mpsc::UnboundedSender<Notification>,
        mut from_game: mpsc::UnboundedReceiver<Notification>,
    ) {
        *self.to_game.lock().unwrap() = Some(to_game);

        let session = Arc::clone(self);
        let mut quit = self.signal_on(SessionState::Disconnected);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    notification = from_game.recv() => match notification {
                        Some(notification) => {
                            if let Err(e) = session.dispatch_notification(notification).await {
                                tracing::error!(
                                    id = %session.id(),
                                    error = %e,
                                    "notification dispatch failed; closing session"
                                );
                                session.disconnect().await;
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = &mut quit => break,
                }
            }
        });
    }

    /// Pushes a notification onto the platform → game channel.
    pub fn notify_game(&self, notification: Notification) -> Result<(), SessionError> {
        let guard = self.to_game.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => tx.send(notification).map_err(|_| SessionError::NoGameLayer),
            None => Err(SessionError::NoGameLayer),
        }
    }

    /// Registers `handler` to be invoked the next time a notification of
    /// `kind` arrives; the registration is consumed by that delivery.
    ///
    /// Only one outstanding registration per kind is supported: a second
    /// registration before the first fires is the typed error
    /// [`SessionError::OnceAlreadyPending`].
    pub fn once_notified(
        &self,
        kind: impl Into<String>,
        handler: NotifyHandler,
    ) -> Result<(), SessionError> {
        let kind = kind.into();
        let mut handlers = self.handlers.lock().unwrap();
        if handlers.contains_key(&kind) {
            return Err(SessionError::OnceAlreadyPending { kind });
        }
        tracing::debug!(id = %self.id(), %kind, "one-shot handler registered");
        handlers.insert(kind, handler);
        Ok(())
    }

    /// Routes one game → platform notification: a pending one-shot handler
    /// consumes it; otherwise the `forwardToClient` fallback re-encodes the
    /// remaining attributes down the wire; otherwise the kind is unhandled
    /// and the session dies.
    pub(crate) async fn dispatch_notification(
        self: &Arc<Self>,
        notification: Notification,
    ) -> Result<(), SessionError> {
        tracing::debug!(
            id = %self.id(),
            kind = %notification.kind,
            attributes = notification.attributes.len(),
            "notification received"
        );

        let handler = self.handlers.lock().unwrap().remove(&notification.kind);
        if let Some(handler) = handler {
            return handler(notification).await;
        }

        let kind = notification.kind;
        let mut forward_to_client = false;
        let mut sender_id = None;
        let mut target_id = None;
        let mut payload = Vec::new();
        for attr in notification.attributes {
            match attr.name.as_str() {
                ATTR_FORWARD_TO_CLIENT => {
                    forward_to_client = attr.value.as_bool().unwrap_or(false);
                }
                ATTR_SENDER_ID => sender_id = attr.value.as_entity(),
                ATTR_TARGET_ID => target_id = attr.value.as_entity(),
                _ => payload.push(attr),
            }
        }

        if forward_to_client {
            let listener = self.imported_service(NOTIFICATION_LISTENER_NAME).ok_or(
                SessionError::UndeclaredImport {
                    name: NOTIFICATION_LISTENER_NAME,
                },
            )?;
            let wire = WireNotification {
                kind,
                sender_id,
                target_id,
                attributes: payload,
            };
            let body = wire.encode();
            let header =
                self.make_request_header(listener.as_ref(), NOTIFICATION_LISTENER_NOTIFY, body.len())?;
            return self.queue_packet(&header, &body).await;
        }

        Err(SessionError::UnhandledNotification { kind })
    }
}
