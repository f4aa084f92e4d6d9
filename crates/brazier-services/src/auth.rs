//! The authentication services.
//!
//! [`AuthServerService`] is the server export driving the logon flow; it
//! relies on a pre-shared web credential checked against the record store
//! rather than an auth-module system. [`AuthClientService`] is the *client's*
//! export — the server-side instance exists only so the logon flow can build
//! outbound requests (queue updates, logon completion) against its method
//! table.
//!
//! The logon sequence the client observes, in frame order:
//!
//! 1. `Logon` → `LogonQueueUpdate` (position 0), `LogonQueueEnd`
//! 2. state transition to LoggingIn (the challenge flow observes this and
//!    pushes its external challenge)
//! 3. `VerifyWebCredentials` → `LogonComplete` with the logon result
//! 4. state transition to Ready, or AuthenticationFailed

use std::sync::{Arc, Mutex, Weak};

use brazier_protocol::{
    ENTITY_GAME_PEGASUS, ERROR_NO_AUTH, ERROR_OK, EntityId, LogonQueueUpdate, LogonRequest,
    LogonResult, VerifyWebCredentialsRequest,
};
use brazier_session::{
    Service, ServiceBinder, ServiceError, ServiceFuture, Session, SessionState,
};
use rand::Rng;

use crate::internal;
use crate::{AccountField, AccountManager, RecordStore};

pub const AUTH_SERVER_NAME: &str = "bnet.protocol.authentication.AuthenticationServer";
pub const AUTH_CLIENT_NAME: &str = "bnet.protocol.authentication.AuthenticationClient";

/// Region reported to successfully logged-in clients ('US').
const CONNECTED_REGION_US: u32 = 0x5553;

// Method indices on the client's authentication export.
const LOGON_COMPLETE: u32 = 5;
const LOGON_QUEUE_UPDATE: u32 = 12;
const LOGON_QUEUE_END: u32 = 13;

// ---------------------------------------------------------------------------
// AuthServerService
// ---------------------------------------------------------------------------

const SERVER_METHODS: &[&str] = &[
    "",
    "Logon",
    "ModuleNotify",
    "ModuleMessage",
    "SelectGameAccount_DEPRECATED",
    "GenerateTempCookie",
    "SelectGameAccount",
    "VerifyWebCredentials",
];

pub struct AuthServerServiceBinder {
    pub store: Arc<dyn RecordStore>,
    pub accounts: Arc<Mutex<AccountManager>>,
}

impl ServiceBinder for AuthServerServiceBinder {
    fn bind(&self, session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        Arc::new(AuthServerService {
            sess: session.map(Arc::downgrade).unwrap_or_default(),
            store: Arc::clone(&self.store),
            accounts: Arc::clone(&self.accounts),
            logon: Mutex::new(LogonState::default()),
        })
    }
}

#[derive(Default)]
struct LogonState {
    program: String,
    email: String,
}

pub struct AuthServerService {
    sess: Weak<Session>,
    store: Arc<dyn RecordStore>,
    accounts: Arc<Mutex<AccountManager>>,
    logon: Mutex<LogonState>,
}

impl AuthServerService {
    fn session(&self) -> Result<Arc<Session>, ServiceError> {
        self.sess
            .upgrade()
            .ok_or_else(|| ServiceError::Internal("session is gone".into()))
    }

    async fn logon(&self, body: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        let req = LogonRequest::decode(body)?;
        let sess = self.session()?;
        tracing::info!(
            id = %sess.id(),
            program = %req.program,
            email = %req.email,
            "logon request"
        );
        {
            let mut logon = self.logon.lock().unwrap();
            logon.program = req.program;
            logon.email = req.email;
        }

        // The queue frames must precede the LoggingIn broadcast so the
        // client sees them before any challenge traffic.
        self.finish_queue(&sess).await?;
        sess.transition(SessionState::LoggingIn).await;
        Ok(Some(Vec::new()))
    }

    /// Reports an empty logon queue: one position-0 update, then queue end.
    async fn finish_queue(&self, sess: &Arc<Session>) -> Result<(), ServiceError> {
        let client = sess
            .imported_service(AUTH_CLIENT_NAME)
            .ok_or_else(|| internal("client did not import the authentication client"))?;

        let update = LogonQueueUpdate::default().encode();
        let header = sess
            .make_request_header(client.as_ref(), LOGON_QUEUE_UPDATE, update.len())
            .map_err(internal)?;
        sess.queue_packet(&header, &update).await.map_err(internal)?;

        let header = sess
            .make_request_header(client.as_ref(), LOGON_QUEUE_END, 0)
            .map_err(internal)?;
        sess.queue_packet(&header, &[]).await.map_err(internal)?;
        Ok(())
    }

    async fn verify_web_credentials(&self, body: &[u8]) -> Result<Option<Vec<u8>>, ServiceError> {
        let req = VerifyWebCredentialsRequest::decode(body)?;
        let sess = self.session()?;
        let (program, email) = {
            let logon = self.logon.lock().unwrap();
            (logon.program.clone(), logon.email.clone())
        };
        let credential = String::from_utf8(req.credentials)
            .map_err(|_| internal("web credential is not UTF-8"))?;

        let record = self.store.find_first(&[
            AccountField::Email(email.clone()),
            AccountField::WebCredential(credential),
        ]);
        if record.is_none() {
            tracing::warn!(id = %sess.id(), %email, "credentials rejected");
        }

        self.complete_login(&sess, &program, record).await?;
        Ok(Some(Vec::new()))
    }

    async fn complete_login(
        &self,
        sess: &Arc<Session>,
        program: &str,
        record: Option<crate::AccountRecord>,
    ) -> Result<(), ServiceError> {
        let client = sess
            .imported_service(AUTH_CLIENT_NAME)
            .ok_or_else(|| internal("client did not import the authentication client"))?;

        let result = match record {
            Some(record) => {
                let account = EntityId::account(record.id);
                let game_account = EntityId::game_account(ENTITY_GAME_PEGASUS, record.id);
                tracing::info!(
                    id = %sess.id(),
                    battle_tag = %record.battle_tag,
                    %account,
                    "account authorized"
                );
                {
                    let mut accounts = self.accounts.lock().unwrap();
                    accounts.add_account(account, record.battle_tag.clone(), sess);
                    accounts.add_game_account(game_account);
                }
                LogonResult {
                    error_code: ERROR_OK,
                    account: Some(account),
                    game_accounts: vec![game_account],
                    connected_region: CONNECTED_REGION_US,
                }
            }
            None => LogonResult {
                error_code: ERROR_NO_AUTH,
                ..LogonResult::default()
            },
        };

        let success = result.error_code == ERROR_OK;
        if success {
            // Hand the session to the game layer before the client learns
            // the logon finished, so the bus is live when it starts talking.
            sess.connect_game_server(program).map_err(internal)?;
        }

        let body = result.encode();
        let header = sess
            .make_request_header(client.as_ref(), LOGON_COMPLETE, body.len())
            .map_err(internal)?;
        sess.queue_packet(&header, &body).await.map_err(internal)?;

        let next = if success {
            SessionState::Ready
        } else {
            SessionState::AuthenticationFailed
        };
        sess.transition(next).await;
        Ok(())
    }

    async fn select_game_account_deprecated(
        &self,
        body: &[u8],
    ) -> Result<Option<Vec<u8>>, ServiceError> {
        let id = decode_entity(body)?;
        let sess = self.session()?;
        tracing::debug!(id = %sess.id(), game_account = %id, "game account selected");
        Ok(Some(Vec::new()))
    }

    fn generate_temp_cookie(&self) -> Result<Option<Vec<u8>>, ServiceError> {
        let cookie: [u8; 16] = rand::rng().random();
        Ok(Some(cookie.to_vec()))
    }
}

fn decode_entity(body: &[u8]) -> Result<EntityId, ServiceError> {
    if body.len() != 16 {
        return Err(internal(format!(
            "entity id body must be 16 bytes, got {}",
            body.len()
        )));
    }
    Ok(EntityId::new(
        u64::from_be_bytes(body[0..8].try_into().unwrap()),
        u64::from_be_bytes(body[8..16].try_into().unwrap()),
    ))
}

impl Service for AuthServerService {
    fn name(&self) -> &'static str {
        AUTH_SERVER_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        SERVER_METHODS
    }

    fn invoke<'a>(&'a self, method_id: u32, body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move {
            match method_id as usize {
                1 => self.logon(body).await,
                4 => self.select_game_account_deprecated(body).await,
                5 => self.generate_temp_cookie(),
                7 => self.verify_web_credentials(body).await,
                2 | 3 | 6 => Err(ServiceError::NotImplemented {
                    service: AUTH_SERVER_NAME,
                    method: SERVER_METHODS[method_id as usize],
                }),
                _ => Err(ServiceError::UnknownMethod {
                    service: AUTH_SERVER_NAME,
                    method_id,
                }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// AuthClientService
// ---------------------------------------------------------------------------

// Sparse table: the client reserves several indices.
const CLIENT_METHODS: &[&str] = &[
    "",
    "ModuleLoad",
    "ModuleMessage",
    "AccountSettings",
    "ServerStateChange",
    "LogonComplete",
    "MemModuleLoad",
    "",
    "",
    "",
    "LogonUpdate",
    "VersionInfoUpdated",
    "LogonQueueUpdate",
    "LogonQueueEnd",
    "GameAccountSelected",
];

pub struct AuthClientServiceBinder;

impl ServiceBinder for AuthClientServiceBinder {
    fn bind(&self, _session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        Arc::new(AuthClientService)
    }
}

/// The client's authentication export. Invoking it server-side is a
/// protocol violation; it exists to address outbound requests.
pub struct AuthClientService;

impl Service for AuthClientService {
    fn name(&self) -> &'static str {
        AUTH_CLIENT_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        CLIENT_METHODS
    }

    fn invoke<'a>(&'a self, _method_id: u32, _body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move { Err(ServiceError::ClientExport(AUTH_CLIENT_NAME)) })
    }
}
