//! Connection and message handling
//!
//! This module handles individual client connections and message processing.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::socket::SocketError;
use crate::transport::{AsyncConnection, decode_integration, encode_integration};
use std::sync::Arc;
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ServerInner;

type ServerResult<T> = std::result::Result<T, SocketError>;

pub(super) async fn handle_connection(
    stream: UnixStream,
    inner: Arc<ServerInner>,
    shutdown: CancellationToken,
) -> ServerResult<()> {
    let mut conn = AsyncConnection::from_stream(stream);

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = conn.read_client_message() => message,
        };

        let message = match message {
            Ok(Some(message)) => message,
            // Connection closed
            Ok(None) => break,
            Err(SocketError::Serialization(e)) => {
                // No id to answer to; the nil id marks an unattributable error
                tracing::warn!(error = %e, "malformed request");
                let response =
                    ServerMessage::new_error(Uuid::nil(), format!("Invalid request: {}", e));
                conn.write_server_message(&response).await?;
                continue;
            }
            Err(e) => return Err(e),
        };

        if let Some(response) = process_message(message, &inner) {
            conn.write_server_message(&response).await?;
        }
    }

    Ok(())
}

/// Apply one message to the store; `None` for messages that get no response
fn process_message(message: ClientMessage, inner: &ServerInner) -> Option<ServerMessage> {
    match message {
        ClientMessage::Publish { payload } => {
            match decode_integration(&payload) {
                Ok(integration) => {
                    tracing::debug!(
                        timestamp = integration.timestamp(),
                        bins = integration.bins(),
                        "integration published"
                    );
                    inner.slot.write(integration);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "rejected publish");
                }
            }
            None
        }
        ClientMessage::Timestamp { id } => Some(ServerMessage::new_timestamp(
            id,
            inner.slot.current_timestamp(),
        )),
        ClientMessage::Fetch { id } => {
            let response = match inner.slot.latest() {
                None => ServerMessage::new_integration(id, None),
                Some(integration) => match encode_integration(&integration) {
                    Ok(payload) => ServerMessage::new_integration(id, Some(payload)),
                    Err(e) => ServerMessage::new_error(id, e.to_string()),
                },
            };
            Some(response)
        }
        ClientMessage::Status { id } => {
            let latest = inner.slot.latest();
            Some(ServerMessage::new_status(
                id,
                inner.uptime_seconds(),
                inner.slot.writes(),
                latest.as_ref().map(|i| i.timestamp()),
                latest.as_ref().map(|i| i.bins()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::Integration;
    use crate::store::LatestSlot;
    use std::time::Instant;

    fn inner() -> ServerInner {
        ServerInner {
            slot: Arc::new(LatestSlot::new()),
            start_time: Instant::now(),
        }
    }

    #[test]
    fn test_publish_has_no_response() {
        let inner = inner();
        let response = process_message(ClientMessage::new_publish(vec![3.0, 1.0]), &inner);
        assert!(response.is_none());
        assert_eq!(inner.slot.current_timestamp(), Some(1));
    }

    #[test]
    fn test_fetch_returns_latest_payload() {
        let inner = inner();
        inner.slot.write(Integration::new(1, vec![1.0]));
        inner.slot.write(Integration::new(2, vec![2.0]));

        let request = ClientMessage::new_fetch();
        let id = request.id().unwrap();
        assert_eq!(
            process_message(request, &inner),
            Some(ServerMessage::new_integration(id, Some(vec![2.0, 2.0])))
        );
    }

    #[test]
    fn test_publish_out_of_f32_range_leaves_slot_untouched() {
        let inner = inner();
        inner.slot.write(Integration::new(4, vec![0.5, 0.5]));

        let response = process_message(ClientMessage::new_publish(vec![1e39, 5.0]), &inner);
        assert!(response.is_none());
        assert_eq!(inner.slot.current_timestamp(), Some(4));
        assert_eq!(inner.slot.writes(), 1);

        let request = ClientMessage::new_fetch();
        let id = request.id().unwrap();
        assert_eq!(
            process_message(request, &inner),
            Some(ServerMessage::new_integration(id, Some(vec![0.5, 0.5, 4.0])))
        );
    }

    #[test]
    fn test_timestamp_on_empty_store() {
        let inner = inner();
        let request = ClientMessage::new_timestamp();
        let id = request.id().unwrap();
        assert_eq!(
            process_message(request, &inner),
            Some(ServerMessage::new_timestamp(id, None))
        );
    }
}
