//! Store service
//!
//! Runs a [`LatestSlot`] behind a Unix socket so the producer and the pollers
//! can live in different processes. Producers push `publish` messages; pollers
//! ask for the current timestamp and fetch the full integration only when it
//! changed.

mod handler;

use crate::socket::SocketError;
use crate::store::LatestSlot;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

use handler::handle_connection;

// Server result type using SocketError for structured error handling
type ServerResult<T> = std::result::Result<T, SocketError>;

pub struct StoreServer {
    inner: Arc<ServerInner>,
    listener: UnixListener,
}

impl StoreServer {
    pub fn bind<P: AsRef<Path>>(socket_path: P, slot: Arc<LatestSlot>) -> ServerResult<Self> {
        let socket_path = socket_path.as_ref();

        if let Some(parent) = socket_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SocketError::Connection(format!(
                    "Failed to create socket directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // Remove existing socket file if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                SocketError::Connection(format!(
                    "Store already running at socket: {}",
                    socket_path.display()
                ))
            } else {
                SocketError::Connection(format!("Failed to bind socket: {}", e))
            }
        })?;

        // Set socket permissions to 0600 (owner read/write only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut permissions = std::fs::metadata(socket_path)
                .map_err(|e| {
                    SocketError::Connection(format!("Failed to read socket metadata: {}", e))
                })?
                .permissions();
            permissions.set_mode(0o600);
            std::fs::set_permissions(socket_path, permissions).map_err(|e| {
                SocketError::Connection(format!("Failed to set socket permissions: {}", e))
            })?;
        }

        let inner = Arc::new(ServerInner {
            slot,
            start_time: Instant::now(),
        });

        Ok(Self { inner, listener })
    }

    /// Serve connections until `shutdown` is cancelled, then remove the socket
    pub async fn run(&mut self, shutdown: CancellationToken) -> ServerResult<()> {
        tracing::info!("store listening for connections");

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("shutdown signal received, stopping store");
                self.cleanup();
                Ok(())
            }
            result = self.accept_loop(shutdown.clone()) => result,
        }
    }

    async fn accept_loop(&mut self, shutdown: CancellationToken) -> ServerResult<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let inner = Arc::clone(&self.inner);
                    let shutdown = shutdown.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, inner, shutdown).await {
                            tracing::warn!(error = %e, "error handling connection");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    fn cleanup(&self) {
        let addr = self.listener.local_addr().ok();

        if let Some(path) = addr
            .as_ref()
            .and_then(|a| a.as_pathname())
            .filter(|p| p.exists())
            && let Err(e) = std::fs::remove_file(path)
        {
            tracing::warn!(error = %e, "failed to remove socket file");
        }
    }
}

/// State shared by all connections
struct ServerInner {
    slot: Arc<LatestSlot>,
    start_time: Instant,
}

impl ServerInner {
    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
