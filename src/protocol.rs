use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from producers and pollers to the store service
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Overwrite the stored integration (push, no response)
    ///
    /// `payload` is the spectrum with the timestamp appended as a trailing
    /// value, see [`crate::transport::encode_integration`].
    Publish { payload: Vec<f64> },
    /// Ask for the timestamp of the stored integration
    Timestamp { id: Uuid },
    /// Ask for the full stored integration
    Fetch { id: Uuid },
    /// Request service status
    Status { id: Uuid },
}

impl ClientMessage {
    pub fn new_publish(payload: Vec<f64>) -> Self {
        ClientMessage::Publish { payload }
    }

    pub fn new_timestamp() -> Self {
        ClientMessage::Timestamp { id: Uuid::new_v4() }
    }

    pub fn new_fetch() -> Self {
        ClientMessage::Fetch { id: Uuid::new_v4() }
    }

    pub fn new_status() -> Self {
        ClientMessage::Status { id: Uuid::new_v4() }
    }

    /// Request id, if this message expects a response
    pub fn id(&self) -> Option<Uuid> {
        match self {
            ClientMessage::Publish { .. } => None,
            ClientMessage::Timestamp { id }
            | ClientMessage::Fetch { id }
            | ClientMessage::Status { id } => Some(*id),
        }
    }
}

/// Messages sent from the store service to clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Timestamp of the stored integration (`None` when nothing was written yet)
    Timestamp { id: Uuid, timestamp: Option<u64> },
    /// Stored integration in publish encoding
    Integration { id: Uuid, payload: Option<Vec<f64>> },
    /// Status information
    Status {
        id: Uuid,
        uptime_seconds: u64,
        writes: u64,
        last_timestamp: Option<u64>,
        bins: Option<usize>,
    },
    /// Error response
    Error { id: Uuid, error: String },
}

impl ServerMessage {
    pub fn new_timestamp(id: Uuid, timestamp: Option<u64>) -> Self {
        ServerMessage::Timestamp { id, timestamp }
    }

    pub fn new_integration(id: Uuid, payload: Option<Vec<f64>>) -> Self {
        ServerMessage::Integration { id, payload }
    }

    pub fn new_status(
        id: Uuid,
        uptime_seconds: u64,
        writes: u64,
        last_timestamp: Option<u64>,
        bins: Option<usize>,
    ) -> Self {
        ServerMessage::Status {
            id,
            uptime_seconds,
            writes,
            last_timestamp,
            bins,
        }
    }

    pub fn new_error(id: Uuid, error: String) -> Self {
        ServerMessage::Error { id, error }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ServerMessage::Timestamp { id, .. }
            | ServerMessage::Integration { id, .. }
            | ServerMessage::Status { id, .. }
            | ServerMessage::Error { id, .. } => *id,
        }
    }
}
