//! Best-effort delivery of integrations toward a store
//!
//! Sends are never acknowledged and never retried: when one fails, the next
//! integration period's value replaces the lost one. The socket transport keeps
//! a single connection, so the store applies publishes in send order and ends up
//! holding the most recently completed send.

use crate::protocol::ClientMessage;
use crate::socket::SocketError;
use crate::spectrum::Integration;
use crate::store::LatestSlot;
use crate::transport::{AsyncConnection, AsyncTransport, CodecError, encode_integration};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("Cannot encode integration: {0}")]
    Codec(#[from] CodecError),
    #[error("Not connected to store, next attempt in {0:?}")]
    Backoff(Duration),
}

/// Push side of the pipeline
pub trait Transport {
    fn send(
        &mut self,
        integration: Integration,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Identity transport for a store living in the same process
#[derive(Debug, Clone)]
pub struct LocalTransport {
    slot: Arc<LatestSlot>,
}

impl LocalTransport {
    pub fn new(slot: Arc<LatestSlot>) -> Self {
        Self { slot }
    }
}

impl Transport for LocalTransport {
    async fn send(&mut self, integration: Integration) -> Result<(), TransportError> {
        self.slot.write(integration);
        Ok(())
    }
}

struct ReconnectState {
    attempt: u32,
    next_retry: Instant,
}

/// Pushes integrations to a store service over its Unix socket
pub struct SocketTransport {
    transport: AsyncTransport,
    connection: Option<AsyncConnection>,
    reconnect_state: ReconnectState,
}

impl SocketTransport {
    pub fn new(socket_path: String) -> Self {
        Self {
            transport: AsyncTransport::new(socket_path),
            connection: None,
            reconnect_state: ReconnectState {
                attempt: 0,
                next_retry: Instant::now(),
            },
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Check if we should attempt reconnection
    pub fn should_reconnect(&self, now: Instant) -> bool {
        !self.is_connected() && now >= self.reconnect_state.next_retry
    }

    /// Schedule next reconnection attempt with stepped backoff
    fn schedule_reconnect(&mut self) {
        self.reconnect_state.attempt += 1;
        let delay = match self.reconnect_state.attempt {
            0..=1 => Duration::from_secs(1),
            2..=3 => Duration::from_secs(2),
            _ => Duration::from_secs(5),
        };
        self.reconnect_state.next_retry = Instant::now() + delay;
    }

    async fn connection(&mut self) -> Result<AsyncConnection, TransportError> {
        if let Some(conn) = self.connection.take() {
            return Ok(conn);
        }

        let now = Instant::now();
        if !self.should_reconnect(now) {
            return Err(TransportError::Backoff(
                self.reconnect_state.next_retry.saturating_duration_since(now),
            ));
        }

        match self.transport.connect().await {
            Ok(conn) => {
                tracing::info!(socket = self.transport.socket_path(), "connected to store");
                self.reconnect_state.attempt = 0;
                Ok(conn)
            }
            Err(e) => {
                self.schedule_reconnect();
                Err(e.into())
            }
        }
    }
}

impl Transport for SocketTransport {
    async fn send(&mut self, integration: Integration) -> Result<(), TransportError> {
        let payload = encode_integration(&integration)?;
        let mut conn = self.connection().await?;

        match conn.write_message(&ClientMessage::new_publish(payload)).await {
            Ok(()) => {
                self.connection = Some(conn);
                Ok(())
            }
            Err(e) => {
                // Drop the broken connection; the next period reconnects
                self.schedule_reconnect();
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        let transport = SocketTransport::new("/tmp/test.sock".to_string());
        assert!(!transport.is_connected());
        assert!(transport.should_reconnect(Instant::now()));
    }

    #[test]
    fn test_reconnect_backoff() {
        let mut transport = SocketTransport::new("/tmp/test.sock".to_string());

        let now = Instant::now();
        transport.schedule_reconnect();
        assert!(!transport.should_reconnect(now));
        assert!(transport.should_reconnect(now + Duration::from_millis(1100)));

        transport.schedule_reconnect();
        assert_eq!(transport.reconnect_state.attempt, 2);
    }

    #[tokio::test]
    async fn test_send_without_store_fails_then_backs_off() {
        let path = std::env::temp_dir().join(format!("rfmon-missing-{}.sock", uuid::Uuid::new_v4()));
        let mut transport = SocketTransport::new(path.to_string_lossy().to_string());

        let first = transport.send(Integration::new(1, vec![0.0])).await;
        assert!(matches!(first, Err(TransportError::Socket(_))));

        let second = transport.send(Integration::new(2, vec![0.0])).await;
        assert!(matches!(second, Err(TransportError::Backoff(_))));
    }

    #[tokio::test]
    async fn test_local_transport_writes_slot() {
        let slot = Arc::new(LatestSlot::new());
        let mut transport = LocalTransport::new(Arc::clone(&slot));

        transport.send(Integration::new(4, vec![1.0])).await.unwrap();
        assert_eq!(slot.current_timestamp(), Some(4));
    }

    #[tokio::test]
    async fn test_non_finite_spectrum_is_not_sent() {
        let mut transport = SocketTransport::new("/tmp/unused.sock".to_string());
        let result = transport.send(Integration::new(1, vec![f32::NAN])).await;
        assert!(matches!(result, Err(TransportError::Codec(CodecError::NonFinite(0)))));
    }
}
