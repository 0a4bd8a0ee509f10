//! Transport layer between spectrum producers, the store service and pollers
//!
//! The transport layer is organized into:
//! - `codec`: NDJSON encoding/decoding for messages and the integration payload
//! - `async_transport`: Tokio-based socket client and server connections
//! - `publisher`: best-effort push of integrations toward a store

use thiserror::Error;

mod async_transport;
mod codec;
mod publisher;

pub use async_transport::{AsyncConnection, AsyncTransport};
pub use codec::{decode_integration, encode_integration};
pub use publisher::{LocalTransport, SocketTransport, Transport, TransportError};

/// Integration payload framing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Payload is empty (missing trailing timestamp)")]
    Empty,
    #[error("Invalid timestamp {0}: must be a non-negative integer below 2^53")]
    InvalidTimestamp(f64),
    #[error("Spectrum value at index {0} is not finite")]
    NonFinite(usize),
}
