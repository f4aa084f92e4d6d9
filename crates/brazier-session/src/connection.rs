//! The connection service: export index 0 on every session, bound before
//! any handshake.
//!
//! `Connect` (method 1) performs the bind handshake: the client enumerates
//! the hashes of the services it wants to import, and the server assigns
//! consecutive export indices in request order.

use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use brazier_protocol::{ConnectRequest, ConnectResponse, ProcessId};

use crate::{Service, ServiceBinder, ServiceError, ServiceFuture, Session};

/// Fully qualified name of the connection service.
pub const CONNECTION_SERVICE_NAME: &str = "bnet.protocol.connection.ConnectionService";

// Process-identity labels reported in the connect response.
const SERVER_PROCESS_LABEL: u32 = 3_868_510_373;
const CLIENT_PROCESS_LABEL: u32 = 1_255_760;

const METHODS: &[&str] = &[
    "",
    "Connect",
    "Bind",
    "Echo",
    "ForceDisconnect",
    "KeepAlive",
    "Encrypt",
    "RequestDisconnect",
];

pub struct ConnectionServiceBinder;

impl ServiceBinder for ConnectionServiceBinder {
    fn bind(&self, session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        Arc::new(ConnectionService {
            sess: session.map(Arc::downgrade).unwrap_or_default(),
        })
    }
}

pub struct ConnectionService {
    sess: Weak<Session>,
}

impl ConnectionService {
    fn session(&self) -> Result<Arc<Session>, ServiceError> {
        self.sess
            .upgrade()
            .ok_or_else(|| ServiceError::Internal("session is gone".into()))
    }

    async fn connect(&self, body: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        let req = ConnectRequest::decode(body)?;
        let sess = self.session()?;

        let mut assigned = Vec::with_capacity(req.imported_service_hashes.len());
        for hash in &req.imported_service_hashes {
            // A service that already occupies an export slot (the connection
            // service itself, or a re-sent bind) keeps its index.
            let index = match sess.export_index(*hash) {
                Some(index) => index,
                None => {
                    let index = sess.export_count();
                    sess.bind_export(index, *hash);
                    index
                }
            };
            assigned.push(index as u32);
        }

        // The client's own exports become our imports, at the client-side
        // indices implied by request order (0 is the connection service).
        for (offset, hash) in req.exported_service_hashes.iter().enumerate() {
            sess.bind_import(offset + 1, *hash);
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let epoch = now.as_secs() as u32;
        let resp = ConnectResponse {
            server_id: ProcessId {
                label: SERVER_PROCESS_LABEL,
                epoch,
            },
            client_id: ProcessId {
                label: CLIENT_PROCESS_LABEL,
                epoch,
            },
            bind_result: 0,
            imported_service_ids: assigned,
            server_time_nanos: now.as_nanos() as u64,
        };
        Ok(Some(resp.encode()))
    }
}

impl Service for ConnectionService {
    fn name(&self) -> &'static str {
        CONNECTION_SERVICE_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    fn invoke<'a>(&'a self, method_id: u32, body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move {
            match method_id as usize {
                1 => self.connect(body).await,
                2..=7 => Err(ServiceError::NotImplemented {
                    service: CONNECTION_SERVICE_NAME,
                    method: METHODS[method_id as usize],
                }),
                _ => Err(ServiceError::UnknownMethod {
                    service: CONNECTION_SERVICE_NAME,
                    method_id,
                }),
            }
        })
    }
}
