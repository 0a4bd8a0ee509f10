//! NDJSON codec for message serialization
//!
//! This module provides shared encoding/decoding logic for the line-delimited
//! JSON protocol used for socket communication, plus the framing of an
//! integration as one flat numeric payload: the spectrum in order followed by
//! the timestamp as a trailing scalar.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::socket::SocketError;
use crate::spectrum::Integration;
use crate::transport::CodecError;

/// Largest integer an f64 represents exactly
const MAX_EXACT_TIMESTAMP: u64 = 1 << 53;

/// Encode a client message into NDJSON format (JSON + newline)
pub fn encode_client_message(message: &ClientMessage) -> Result<String, SocketError> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    Ok(json)
}

/// Encode a server message into NDJSON format
pub fn encode_server_message(message: &ServerMessage) -> Result<String, SocketError> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    Ok(json)
}

/// Decode a line of JSON into a ClientMessage
pub fn decode_client_message(line: &str) -> Result<ClientMessage, SocketError> {
    let message: ClientMessage = serde_json::from_str(line.trim())?;
    Ok(message)
}

/// Decode a line of JSON into a ServerMessage
pub fn decode_server_message(line: &str) -> Result<ServerMessage, SocketError> {
    let message: ServerMessage = serde_json::from_str(line.trim())?;
    Ok(message)
}

/// Flatten an integration into `[spectrum..., timestamp]`
///
/// JSON has no representation for infinities or NaN, so non-finite samples are
/// rejected here rather than turning into `null` on the wire.
pub fn encode_integration(integration: &Integration) -> Result<Vec<f64>, CodecError> {
    let timestamp = integration.timestamp();
    if timestamp > MAX_EXACT_TIMESTAMP {
        return Err(CodecError::InvalidTimestamp(timestamp as f64));
    }
    if let Some(index) = integration.spectrum().iter().position(|v| !v.is_finite()) {
        return Err(CodecError::NonFinite(index));
    }

    let mut payload = Vec::with_capacity(integration.bins() + 1);
    payload.extend(integration.spectrum().iter().map(|&v| f64::from(v)));
    payload.push(timestamp as f64);
    Ok(payload)
}

/// Split a `[spectrum..., timestamp]` payload back into an integration
pub fn decode_integration(payload: &[f64]) -> Result<Integration, CodecError> {
    let (&raw_timestamp, spectrum) = payload.split_last().ok_or(CodecError::Empty)?;

    let valid = raw_timestamp.is_finite()
        && raw_timestamp >= 0.0
        && raw_timestamp.fract() == 0.0
        && raw_timestamp <= MAX_EXACT_TIMESTAMP as f64;
    if !valid {
        return Err(CodecError::InvalidTimestamp(raw_timestamp));
    }

    // Checked after narrowing, since values beyond f32 range become infinite
    let spectrum: Vec<f32> = spectrum.iter().map(|&v| v as f32).collect();
    if let Some(index) = spectrum.iter().position(|v| !v.is_finite()) {
        return Err(CodecError::NonFinite(index));
    }

    Ok(Integration::new(raw_timestamp as u64, spectrum))
}
