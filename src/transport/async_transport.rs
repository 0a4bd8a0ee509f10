//! Async transport implementation using tokio
//!
//! This module provides the socket client used by producers and pollers, and the
//! line-delimited connection wrapper shared by both sides.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::socket::SocketError;
use crate::transport::codec;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// How long a client waits for the store to answer a request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Async transport for socket communication (stateless client)
#[derive(Debug, Clone)]
pub struct AsyncTransport {
    socket_path: String,
}

/// Line-delimited connection over a Unix stream (client or server side)
pub struct AsyncConnection {
    pub reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    pub writer: tokio::net::unix::OwnedWriteHalf,
}

impl AsyncTransport {
    /// Create a new async transport with the given socket path
    pub fn new(socket_path: String) -> Self {
        Self { socket_path }
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Connect to the socket and return a stateful connection
    pub async fn connect(&self) -> Result<AsyncConnection, SocketError> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            match e.kind() {
                std::io::ErrorKind::ConnectionRefused => SocketError::Connection(
                    "Store is not running. Use 'rfmon store' to start it.".to_string(),
                ),
                std::io::ErrorKind::NotFound => SocketError::Connection(format!(
                    "Store socket not found at {}. Use 'rfmon store' to start it.",
                    self.socket_path
                )),
                _ => SocketError::Connection(format!(
                    "Failed to connect to store at {}: {}",
                    self.socket_path, e
                )),
            }
        })?;

        Ok(AsyncConnection::from_stream(stream))
    }
}

impl AsyncConnection {
    pub fn from_stream(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Read a client message from the connection (server-side)
    pub async fn read_client_message(&mut self) -> Result<Option<ClientMessage>, SocketError> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) => Ok(None), // EOF - connection closed
            Ok(_) => {
                let message = codec::decode_client_message(&line)?;
                Ok(Some(message))
            }
            Err(e) => Err(SocketError::Io(e)),
        }
    }

    /// Read a server message from the connection (client-side)
    pub async fn read_server_message(&mut self) -> Result<Option<ServerMessage>, SocketError> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) => Ok(None), // EOF - connection closed
            Ok(_) => {
                let message = codec::decode_server_message(&line)?;
                Ok(Some(message))
            }
            Err(e) => Err(SocketError::Io(e)),
        }
    }

    /// Write a client message to the connection (client-side)
    pub async fn write_message(&mut self, message: &ClientMessage) -> Result<(), SocketError> {
        let encoded = codec::encode_client_message(message)?;
        self.writer.write_all(encoded.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Write a server message to the connection (server-side)
    pub async fn write_server_message(&mut self, message: &ServerMessage) -> Result<(), SocketError> {
        let encoded = codec::encode_server_message(message)?;
        self.writer.write_all(encoded.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Send a request and wait for the response carrying the same id
    pub async fn request(&mut self, message: &ClientMessage) -> Result<ServerMessage, SocketError> {
        let Some(id) = message.id() else {
            return Err(SocketError::Connection(
                "Publish messages have no response".to_string(),
            ));
        };

        self.write_message(message).await?;

        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.read_server_message())
            .await
            .map_err(|_| {
                SocketError::Connection(format!(
                    "Request timed out after {}s",
                    REQUEST_TIMEOUT.as_secs()
                ))
            })??
            .ok_or_else(|| SocketError::Connection("No response from store".to_string()))?;

        if response.id() != id {
            return Err(SocketError::Connection(format!(
                "Response id {} does not match request id {}",
                response.id(),
                id
            )));
        }

        Ok(response)
    }
}
