//! Chatter server entry point.
//!
//! Wires together configuration, logging, the broadcaster coordination
//! task, and the TCP accept loop, then runs until Ctrl-C.
//!
//! ```text
//! main()
//!  └─ load_config            -- TOML file (first CLI argument, optional)
//!  └─ Broadcaster::spawn     -- the single coordination loop
//!  └─ listener::serve        -- accept loop, one handler task per client
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chatter_server::application::broadcaster::Broadcaster;
use chatter_server::infrastructure::network::listener;
use chatter_server::infrastructure::storage::config::load_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("chatter.toml"));
    let config = load_config(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    // Initialise structured logging. Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    info!("Chatter server starting");

    let addr: SocketAddr = config
        .server
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen address {:?}", config.server.listen_address))?;
    let policy = config.limits.policy();

    let broadcaster = Broadcaster::spawn(policy);
    let tcp_listener = listener::bind(addr).await?;

    tokio::select! {
        _ = listener::serve(tcp_listener, broadcaster, policy) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    info!("Chatter server stopped");
    Ok(())
}
