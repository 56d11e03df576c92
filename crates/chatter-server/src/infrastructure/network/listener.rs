//! TCP listener setup and the accept loop.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::application::broadcaster::{BroadcasterHandle, Policy};
use crate::infrastructure::network::connection::handle_connection;

/// Error type for listener setup.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Binds the TCP listener on `addr`.
///
/// # Errors
///
/// Returns [`ServeError::BindFailed`] if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServeError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::BindFailed { addr, source })?;
    info!(%addr, "listening");
    Ok(listener)
}

/// Runs the accept loop forever, spawning one handler task per connection.
///
/// Accept errors (a client resetting mid-handshake, transient resource
/// exhaustion) are logged and skipped; they never take the server down.
pub async fn serve(listener: TcpListener, broadcaster: BroadcasterHandle, policy: Policy) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!(%peer, "connection accepted");
                tokio::spawn(handle_connection(
                    stream,
                    peer,
                    broadcaster.clone(),
                    policy,
                ));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}
