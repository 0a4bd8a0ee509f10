//! Socket client for a store running in another process

use super::{LatestValueStore, StoreError};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::spectrum::{Integration, Timestamp};
use crate::transport::{AsyncConnection, AsyncTransport, decode_integration};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Remote latest-value store reached over the service socket
///
/// Keeps one connection open between requests and reconnects on the next
/// request after any failure.
pub struct StoreClient {
    transport: AsyncTransport,
    connection: Mutex<Option<AsyncConnection>>,
}

impl StoreClient {
    pub fn new(socket_path: String) -> Self {
        Self {
            transport: AsyncTransport::new(socket_path),
            connection: Mutex::new(None),
        }
    }

    async fn request(&self, message: ClientMessage) -> Result<ServerMessage, StoreError> {
        let mut slot = self.connection.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.transport.connect().await?,
        };

        let response = conn.request(&message).await?;
        // Only a connection that completed a full exchange is reused
        *slot = Some(conn);

        match response {
            ServerMessage::Error { error, .. } => Err(StoreError::Remote(error)),
            response => Ok(response),
        }
    }

    /// Service status as reported by the store
    pub async fn status(&self) -> Result<ServerMessage, StoreError> {
        match self.request(ClientMessage::new_status()).await? {
            status @ ServerMessage::Status { .. } => Ok(status),
            other => Err(StoreError::UnexpectedResponse(format!("{:?}", other))),
        }
    }
}

impl LatestValueStore for StoreClient {
    async fn timestamp(&self) -> Result<Option<Timestamp>, StoreError> {
        match self.request(ClientMessage::new_timestamp()).await? {
            ServerMessage::Timestamp { timestamp, .. } => Ok(timestamp),
            other => Err(StoreError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    async fn read(&self) -> Result<Option<Arc<Integration>>, StoreError> {
        match self.request(ClientMessage::new_fetch()).await? {
            ServerMessage::Integration { payload, .. } => Ok(payload
                .map(|payload| decode_integration(&payload))
                .transpose()?
                .map(Arc::new)),
            other => Err(StoreError::UnexpectedResponse(format!("{:?}", other))),
        }
    }
}
