//! Demo platform server: binds on loopback, seeds one demo account, and
//! serves the toy game layer.
//!
//! Run with `RUST_LOG=debug cargo run -p lobby-server`, then point a client
//! at 127.0.0.1:1119 (email `demo@example.com`, credential `demo`). Set
//! `SIM_ADDR` to hand matchmade games to an external simulator.

use std::sync::Arc;

use brazier::prelude::*;
use tracing_subscriber::EnvFilter;

mod game;
mod sim;

use game::LobbyGameServer;

#[tokio::main]
async fn main() -> Result<(), BrazierError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:1119".to_string());
    let sim_addr = std::env::var("SIM_ADDR").ok();

    let store = MemoryStore::with_accounts([AccountRecord {
        id: 1,
        email: "demo@example.com".into(),
        web_credential: "demo".into(),
        battle_tag: "Demo#1111".into(),
        flags: 0,
    }]);

    let server = Server::builder()
        .bind(&bind_addr)
        .store(Arc::new(store))
        .web_auth_url("https://localhost/demo-login")
        .register_game_server("WTCG", Arc::new(LobbyGameServer::new(sim_addr)))
        .build()
        .await?;

    tracing::info!(addr = %server.local_addr()?, "lobby server running");
    server.run().await
}
