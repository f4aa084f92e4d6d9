//! The notification-listener service: the client export notifications are
//! pushed through. The session's `forwardToClient` fallback and the presence
//! fan-out both address their frames at this service's import slot; this
//! descriptor is what gives the slot its name and method table.

use std::sync::Arc;

use brazier_session::{
    NOTIFICATION_LISTENER_NAME, Service, ServiceBinder, ServiceError, ServiceFuture, Session,
};

const METHODS: &[&str] = &["", "OnNotificationReceived"];

pub struct NotificationListenerServiceBinder;

impl ServiceBinder for NotificationListenerServiceBinder {
    fn bind(&self, _session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        Arc::new(NotificationListenerService)
    }
}

pub struct NotificationListenerService;

impl Service for NotificationListenerService {
    fn name(&self) -> &'static str {
        NOTIFICATION_LISTENER_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn invoke<'a>(&'a self, _method_id: u32, _body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move { Err(ServiceError::ClientExport(NOTIFICATION_LISTENER_NAME)) })
    }
}
