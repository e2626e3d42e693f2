//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON objects tagged with `"type"`.

use serde::{Deserialize, Serialize};

use crate::game::matchmaking::MoveRequest;
use crate::game::participant::{ParticipantInfo, Role};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Take a seat in a named game.
    Join(JoinPayload),

    /// Relay a move to the opponent.
    Move(MovePayload),

    /// Give up the seat but stay connected.
    Leave,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Join request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinPayload {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Game to join.
    #[serde(default, alias = "game_id", alias = "gameID", alias = "sessionID")]
    pub session_id: String,
}

/// Move payload. Squares are opaque to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovePayload {
    /// Origin square.
    pub from: String,
    /// Destination square.
    pub to: String,
    /// Game the move belongs to.
    #[serde(alias = "game_id", alias = "gameID", alias = "sessionID")]
    pub session_id: String,
}

impl MovePayload {
    /// Convert to a matchmaker move request.
    pub fn into_request(self) -> MoveRequest {
        MoveRequest {
            from: self.from,
            to: self.to,
            session_id: self.session_id,
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to a join request.
    JoinAck(JoinAck),

    /// Greeting for the joiner, with the seated opponent if any.
    Welcome {
        /// Greeting text.
        message: String,
        /// Opponent already in the game.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        opponent: Option<ParticipantInfo>,
    },

    /// An opponent took the other seat.
    OpponentJoin {
        /// Announcement text.
        message: String,
        /// The new participant.
        opponent: ParticipantInfo,
    },

    /// Free-form announcement (game start, player left).
    Message {
        /// Announcement text.
        message: String,
    },

    /// Opponent's move.
    OpponentMove {
        /// Origin square.
        from: String,
        /// Destination square.
        to: String,
    },

    /// Opponent left the game.
    OpponentLeft,

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time (Unix millis).
        server_time: i64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Join reply. Exactly one of `role` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAck {
    /// Assigned seat on success.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<Role>,
    /// Rejection reason on failure.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl JoinAck {
    /// Accepted join.
    pub fn accepted(role: Role) -> Self {
        Self {
            role: Some(role),
            error: None,
        }
    }

    /// Rejected join.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            role: None,
            error: Some(error.into()),
        }
    }
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be decoded.
    InvalidInput,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Deserialize from a binary frame holding UTF-8 JSON.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Announcement message.
    pub fn message(text: impl Into<String>) -> Self {
        ServerMessage::Message {
            message: text.into(),
        }
    }
}
