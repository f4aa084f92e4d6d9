//! The service contract and the process-wide service registry.
//!
//! A service is a named, versionless collection of numbered methods
//! invocable over a session. The core never sees concrete request or
//! response types — it dispatches by positional method index and moves
//! opaque bodies. Business logic plugs in behind this contract.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use brazier_protocol::{ProtocolError, service_hash};

use crate::Session;

/// Future type returned by [`Service::invoke`]. Boxed so services stay
/// object-safe and can live in the session's dispatch tables.
pub type ServiceFuture<'a> = Pin<Box<dyn Future<Output = ServiceResult> + Send + 'a>>;

/// What a method invocation produces: `Some(body)` to reply, `None` when the
/// method has no reply frame.
pub type ServiceResult = Result<Option<Vec<u8>>, ServiceError>;

/// Errors a service handler can report. Any of these is fatal to the
/// session that issued the invocation (see `SessionError::Handler`).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The method index is outside the service's method table, or names a
    /// reserved slot.
    #[error("{service} has no method {method_id}")]
    UnknownMethod { service: &'static str, method_id: u32 },

    /// The service is an export of the *client*; the server-side instance
    /// exists only to build outbound requests and must never be invoked.
    #[error("{0} is a client export, not a server export")]
    ClientExport(&'static str),

    /// The method is part of the wire contract but has no implementation.
    #[error("{service}.{method} is not implemented")]
    NotImplemented {
        service: &'static str,
        method: &'static str,
    },

    /// The request body did not decode.
    #[error("malformed request body: {0}")]
    BadRequest(#[from] ProtocolError),

    /// The handler ran and failed.
    #[error("{0}")]
    Internal(String),
}

/// A set of RPC methods bound to a particular session.
pub trait Service: Send + Sync {
    /// The fully qualified name of the service.
    fn name(&self) -> &'static str;

    /// The names of the service's invokable methods, positionally indexed
    /// by wire method id. An empty string marks a reserved slot.
    fn methods(&self) -> &'static [&'static str];

    /// Executes a method.
    fn invoke<'a>(&'a self, method_id: u32, body: &'a [u8]) -> ServiceFuture<'a>;

    /// The name of a method, for logging. Out-of-range or reserved indices
    /// report as "(unknown)".
    fn method_name(&self, method_id: u32) -> &'static str {
        match self.methods().get(method_id as usize) {
            Some(name) if !name.is_empty() => name,
            _ => "(unknown)",
        }
    }
}

/// Creates instances of a service bound to individual sessions.
pub trait ServiceBinder: Send + Sync {
    /// Binds a service to a session. Passing `None` gives a descriptor-only
    /// instance used to inspect the service and method names.
    fn bind(&self, session: Option<&Arc<Session>>) -> Arc<dyn Service>;
}

/// Process-wide table mapping service-name hashes to binders.
///
/// Built once at startup and read-only thereafter — sessions hold it behind
/// an `Arc` and never mutate it, so lookups need no locking.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<u32, Arc<dyn ServiceBinder>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a binder under the hash of its service name and returns
    /// that hash.
    ///
    /// Two services whose names hash identically silently overwrite each
    /// other — last registrant wins. Name hashes are well distributed in
    /// practice, but this is a real hazard and is pinned by a test.
    pub fn register(&mut self, binder: Arc<dyn ServiceBinder>) -> u32 {
        let descriptor = binder.bind(None);
        let hash = service_hash(descriptor.name());
        tracing::debug!(name = descriptor.name(), hash, "registered service");
        self.services.insert(hash, binder);
        hash
    }

    /// Looks up the binder for a service hash.
    ///
    /// "Not found" is a warning-level condition during import binding (the
    /// peer referenced a service this process does not carry) and a fatal
    /// one when a bound export slot is later invoked.
    pub fn lookup(&self, hash: u32) -> Option<&Arc<dyn ServiceBinder>> {
        self.services.get(&hash)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
