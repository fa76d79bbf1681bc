/*!
 * procnet - Echo Listener
 *
 * Drives the socket manager the way a server would:
 * - Non-blocking listener with SO_REUSEADDR
 * - Accept loop that backs off on transient errors
 * - One read/write echo per connection on non-blocking descriptors
 * - Graceful exit on SIGINT/SIGTERM, abandoning idle connections
 */

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use procnet::{init_tracing, Config, ShutdownCoordinator, SocketDescriptor, SocketManager};

const ENV_LISTEN_IP: &str = "PROCNET_LISTEN_IP";
const ENV_LISTEN_PORT: &str = "PROCNET_LISTEN_PORT";
const DEFAULT_LISTEN_IP: &str = "127.0.0.1";
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize structured tracing
    init_tracing();

    info!("procnet starting...");
    let config = Config::from_env()?;
    let socket_manager = SocketManager::with_config(config.socket);
    let shutdown = ShutdownCoordinator::install()?;

    let ip = std::env::var(ENV_LISTEN_IP).unwrap_or_else(|_| DEFAULT_LISTEN_IP.to_string());
    let port = match std::env::var(ENV_LISTEN_PORT) {
        Ok(raw) => raw
            .parse::<u16>()
            .map_err(|e| format!("Invalid {}={}: {}", ENV_LISTEN_PORT, raw, e))?,
        Err(_) => 0,
    };

    let mut listener = socket_manager.create_socket()?;
    socket_manager.set_reuse_address(&mut listener)?;
    socket_manager.set_non_blocking(&mut listener)?;
    socket_manager.bind(&mut listener, &ip, port)?;
    socket_manager.listen(&mut listener)?;

    let addr = socket_manager.local_addr(&listener)?;
    info!(%addr, "Echo listener ready");
    info!("Press Ctrl+C to exit");

    loop {
        match socket_manager.accept(&listener) {
            Ok(conn) => {
                tokio::spawn(echo_connection(
                    socket_manager.clone(),
                    conn,
                    Arc::clone(&shutdown),
                ));
            }
            Err(e) if e.is_retryable() => {
                if !backoff(&shutdown).await {
                    break;
                }
            }
            Err(e) if e.kind().is_connection_scoped() => {
                warn!(error = %e, "Dropping failed connection");
            }
            Err(e) => {
                error!(error = %e, kind = %e.kind(), "Accept failed, stopping listener");
                break;
            }
        }
    }

    socket_manager.close(listener)?;
    info!("procnet stopped");
    Ok(())
}

/// Echo one message back to the peer and close the connection
///
/// Gives up without echoing once shutdown begins.
async fn echo_connection(
    sm: SocketManager,
    mut conn: SocketDescriptor,
    shutdown: Arc<ShutdownCoordinator>,
) {
    // Accepted sockets do not inherit O_NONBLOCK from the listener
    if let Err(e) = sm.set_non_blocking(&mut conn) {
        warn!(error = %e, "Could not make connection non-blocking");
    } else {
        let data = loop {
            match sm.read(&conn) {
                Ok(data) => break data,
                Err(e) if e.is_retryable() => {
                    if !backoff(&shutdown).await {
                        break Vec::new();
                    }
                }
                Err(e) => {
                    warn!(error = %e, kind = %e.kind(), "Echo read failed");
                    break Vec::new();
                }
            }
        };
        if data.is_empty() {
            debug!("Nothing to echo");
        }

        let mut sent = 0;
        while sent < data.len() {
            match sm.write(&conn, &data[sent..]) {
                Ok(n) => sent += n,
                Err(e) if e.is_retryable() => {
                    if !backoff(&shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, kind = %e.kind(), "Echo write failed");
                    break;
                }
            }
        }
    }

    if let Err(e) = sm.close(conn) {
        warn!(error = %e, "Failed to close connection");
    }
}

/// Sleep before retrying; `false` once shutdown has begun
async fn backoff(shutdown: &ShutdownCoordinator) -> bool {
    tokio::select! {
        _ = shutdown.wait() => false,
        _ = tokio::time::sleep(RETRY_BACKOFF) => true,
    }
}
