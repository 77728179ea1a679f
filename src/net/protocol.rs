//! Wire messages
//!
//! Clients send `{"User": {"ID", "Direction", "Skin"?}, "Timestamp"}`; the
//! server answers with the snapshot plus its own `Timestamp`. Both are JSON.

use serde::{Deserialize, Serialize};

use crate::game::bubble::BubbleId;
use crate::game::input_buffer::Command;
use crate::game::snapshot::Snapshot;
use crate::util::vec2::Vec2;

/// Message from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientMessage {
    pub user: UserCommand,
    /// Client clock, milliseconds
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCommand {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Direction")]
    pub direction: Vec2,
    /// Cosmetic only; accepted and ignored
    #[serde(rename = "Skin", default, skip_serializing_if = "Option::is_none")]
    pub skin: Option<serde_json::Value>,
}

/// Message from server to every client
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage<'a> {
    #[serde(flatten)]
    pub snapshot: &'a Snapshot,
    /// Server clock, milliseconds since the Unix epoch
    #[serde(rename = "Timestamp")]
    pub timestamp: u64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProtocolError {
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Empty player ID")]
    EmptyId,
    #[error("Non-finite direction")]
    InvalidDirection,
    #[error("Non-finite timestamp")]
    InvalidTimestamp,
}

impl ClientMessage {
    /// Check the message and turn it into an engine command
    pub fn validate(self) -> Result<Command, ProtocolError> {
        if self.user.id.is_empty() {
            return Err(ProtocolError::EmptyId);
        }
        if !self.user.direction.is_finite() {
            return Err(ProtocolError::InvalidDirection);
        }
        if !self.timestamp.is_finite() {
            return Err(ProtocolError::InvalidTimestamp);
        }
        Ok(Command {
            player_id: BubbleId::new(self.user.id),
            direction: self.user.direction,
            timestamp: self.timestamp,
        })
    }
}

/// Parse and validate one client payload
pub fn decode_command(data: &[u8]) -> Result<Command, ProtocolError> {
    let message: ClientMessage =
        serde_json::from_slice(data).map_err(|e| ProtocolError::Decode(e.to_string()))?;
    message.validate()
}

/// Serialize a snapshot for broadcast, stamped with `timestamp`
pub fn encode_snapshot(snapshot: &Snapshot, timestamp: u64) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(&ServerMessage { snapshot, timestamp })
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}
