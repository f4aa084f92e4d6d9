//! `Server` builder and accept loop.
//!
//! This is the entry point for running a Brazier platform server. It builds
//! the read-only service registry (connection, authentication, game
//! utilities, game master, presence, plus the client-export descriptors),
//! owns the product → game-server table, and runs sessions for accepted
//! connections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use brazier_services::{
    AccountManager, AuthClientServiceBinder, AuthServerServiceBinder, ChallengeNotifyServiceBinder,
    GameMasterServiceBinder, GameUtilitiesServiceBinder, MemoryStore,
    NotificationListenerServiceBinder, PresenceServiceBinder, RecordStore,
};
use brazier_session::{
    ConnectionServiceBinder, GameServer, ServiceBinder, ServiceRegistry, SessionConfig,
};
use tokio::net::TcpListener;

use crate::BrazierError;
use crate::handler::handle_connection;

/// Builder for configuring and starting a Brazier server.
///
/// # Example
///
/// ```rust,no_run
/// use brazier::prelude::*;
/// # async fn run(game: std::sync::Arc<dyn GameServer>) -> Result<(), BrazierError> {
/// let server = Server::builder()
///     .bind("0.0.0.0:1119")
///     .register_game_server("WTCG", game)
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    web_auth_url: String,
    store: Option<Arc<dyn RecordStore>>,
    game_servers: HashMap<String, Arc<dyn GameServer>>,
    extra_services: Vec<Arc<dyn ServiceBinder>>,
}

impl ServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:1119".to_string(),
            session_config: SessionConfig::default(),
            web_auth_url: "https://localhost/login".to_string(),
            store: None,
            game_servers: HashMap::new(),
            extra_services: Vec::new(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the per-session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets the URL issued in the external web-auth challenge.
    pub fn web_auth_url(mut self, url: &str) -> Self {
        self.web_auth_url = url.to_string();
        self
    }

    /// Sets the account record store. Defaults to an empty in-memory store,
    /// which rejects every logon.
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Registers a game server under its product FourCC (e.g. "WTCG").
    pub fn register_game_server(
        mut self,
        product: &str,
        game_server: Arc<dyn GameServer>,
    ) -> Self {
        self.game_servers.insert(product.to_string(), game_server);
        self
    }

    /// Registers an additional service binder beyond the built-in set.
    pub fn register_service(mut self, binder: Arc<dyn ServiceBinder>) -> Self {
        self.extra_services.push(binder);
        self
    }

    /// Binds the listener and assembles the registry.
    pub async fn build(self) -> Result<Server, BrazierError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "listening");

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn RecordStore>);
        let accounts = Arc::new(Mutex::new(AccountManager::new()));

        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(ConnectionServiceBinder));
        // Server exports:
        registry.register(Arc::new(AuthServerServiceBinder {
            store,
            accounts: Arc::clone(&accounts),
        }));
        registry.register(Arc::new(GameUtilitiesServiceBinder));
        registry.register(Arc::new(GameMasterServiceBinder));
        registry.register(Arc::new(PresenceServiceBinder {
            accounts: Arc::clone(&accounts),
        }));
        // Client exports:
        registry.register(Arc::new(AuthClientServiceBinder));
        registry.register(Arc::new(ChallengeNotifyServiceBinder {
            web_auth_url: self.web_auth_url,
        }));
        registry.register(Arc::new(NotificationListenerServiceBinder));
        for binder in self.extra_services {
            registry.register(binder);
        }

        Ok(Server {
            listener,
            registry: Arc::new(registry),
            game_servers: Arc::new(self.game_servers),
            session_config: self.session_config,
            accounts,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Brazier platform server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct Server {
    listener: TcpListener,
    registry: Arc<ServiceRegistry>,
    game_servers: Arc<HashMap<String, Arc<dyn GameServer>>>,
    session_config: SessionConfig,
    accounts: Arc<Mutex<AccountManager>>,
}

impl Server {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// The shared account manager, for embedders that want to observe or
    /// seed accounts.
    pub fn accounts(&self) -> Arc<Mutex<AccountManager>> {
        Arc::clone(&self.accounts)
    }

    /// Runs the accept loop, handling each connection as a new session.
    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), BrazierError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let registry = Arc::clone(&self.registry);
                    let game_servers = Arc::clone(&self.game_servers);
                    let config = self.session_config.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, addr, registry, game_servers, config).await
                        {
                            tracing::debug!(%addr, error = %e, "session ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
