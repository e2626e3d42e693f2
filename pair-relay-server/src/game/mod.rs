//! Matchmaking Core
//!
//! Session and participant state for two-seat games. No I/O.
//!
//! ## Module Structure
//!
//! - `participant`: Ids, roles and participant records
//! - `registry`: Participant store keyed by connection identity
//! - `index`: Session → members view, join-ordered
//! - `matchmaking`: Join, move and leave protocol

pub mod participant;
pub mod registry;
pub mod index;
pub mod matchmaking;

// Re-export key types
pub use participant::{Participant, ParticipantId, ParticipantInfo, Role};
pub use registry::{ParticipantRegistry, RegistryError};
pub use index::{SessionIndex, SESSION_CAPACITY};
pub use matchmaking::{
    GameStart, JoinOutcome, JoinRequest, MatchError, Matchmaker, MatchmakerConfig,
    MovePolicy, MoveRelay, MoveRequest, SessionState,
};
