//! Participant Definitions
//!
//! Identity, role and record types for the two seats of a session.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// PARTICIPANT ID
// =============================================================================

/// Opaque connection identity (UUID v4).
///
/// Assigned by the transport when a connection is accepted and stable for
/// that connection's lifetime. Implements Ord for BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(uuid::Uuid);

impl ParticipantId {
    /// Generate a fresh random identity.
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }

    /// Parse from a UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        let mut s = self.0.simple().to_string();
        s.truncate(8);
        s
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// =============================================================================
// ROLE
// =============================================================================

/// Seat within a session. `First` moves first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Colloquially "white".
    First,
    /// Colloquially "black".
    Second,
}

impl Role {
    /// The other seat.
    #[inline]
    pub fn opposite(self) -> Role {
        match self {
            Role::First => Role::Second,
            Role::Second => Role::First,
        }
    }

    /// Piece colour name used in human-readable notifications.
    pub fn color_name(self) -> &'static str {
        match self {
            Role::First => "White",
            Role::Second => "Black",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::First => f.write_str("first"),
            Role::Second => f.write_str("second"),
        }
    }
}

// =============================================================================
// PARTICIPANT
// =============================================================================

/// A joined participant. Owned by the registry, never mutated after insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    /// Connection identity.
    pub id: ParticipantId,
    /// Display name supplied by the client.
    pub name: String,
    /// Session the participant belongs to.
    pub session_id: String,
    /// Assigned seat.
    pub role: Role,
}

impl Participant {
    /// Public view sent to peers.
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id,
            name: self.name.clone(),
            session_id: self.session_id.clone(),
            role: self.role,
        }
    }
}

/// Public participant data carried in notifications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    /// Connection identity.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Session identifier.
    pub session_id: String,
    /// Assigned seat.
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_opposite() {
        assert_eq!(Role::First.opposite(), Role::Second);
        assert_eq!(Role::Second.opposite(), Role::First);
    }

    #[test]
    fn test_role_wire_name() {
        assert_eq!(serde_json::to_string(&Role::First).unwrap(), "\"first\"");
        assert_eq!(serde_json::to_string(&Role::Second).unwrap(), "\"second\"");
        assert_eq!(Role::Second.to_string(), "second");
    }

    #[test]
    fn test_participant_id_string_form() {
        let id = ParticipantId::from_bytes([7; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        assert_eq!(ParticipantId::from_uuid_str(&id.to_string()), Some(id));
        assert_eq!(id.short().len(), 8);
    }
}
