//! Matchmaking
//!
//! Join, move and leave protocol for two-seat sessions.
//!
//! The [`Matchmaker`] owns the participant registry and the session index
//! and keeps them in step. It never talks to the network: every operation
//! returns plain data, and the relay layer turns that into notifications.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::game::index::{SessionIndex, SESSION_CAPACITY};
use crate::game::participant::{Participant, ParticipantId, Role};
use crate::game::registry::{ParticipantRegistry, RegistryError};

/// Default upper bound on display name length (characters).
pub const DEFAULT_MAX_NAME_LEN: usize = 64;

/// How move relays are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovePolicy {
    /// Forward every move to the named group, whoever sent it.
    #[default]
    Permissive,
    /// Only forward moves from registered members of the named session.
    MembersOnly,
}

impl MovePolicy {
    /// Parse a policy name (`permissive`, `members_only`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "permissive" => Some(Self::Permissive),
            "members_only" => Some(Self::MembersOnly),
            _ => None,
        }
    }
}

/// Matchmaker configuration.
#[derive(Debug, Clone)]
pub struct MatchmakerConfig {
    /// Move relay admission.
    pub move_policy: MovePolicy,
    /// Longest accepted display name (characters).
    pub max_name_len: usize,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            move_policy: MovePolicy::Permissive,
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

/// Matchmaking errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// Session already has two participants.
    #[error("Game is full")]
    SessionFull,

    /// Connection already holds a seat somewhere.
    #[error("Already joined a game")]
    AlreadyJoined,

    /// Malformed join request.
    #[error("Invalid join: {0}")]
    InvalidJoin(String),

    /// Move sender is not a member of the session.
    #[error("Not a member of game {0}")]
    NotMember(String),

    /// Registry-level failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Per-session occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No participants (session does not exist).
    Empty,
    /// Waiting for an opponent.
    OneJoined,
    /// Both seats taken.
    Full,
}

/// Join request.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    /// Display name.
    pub name: String,
    /// Connection identity of the joiner.
    pub participant_id: ParticipantId,
    /// Session to join (created if absent).
    pub session_id: String,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// The newly registered participant.
    pub participant: Participant,
    /// Member already seated before this join, if any.
    pub opponent: Option<Participant>,
}

/// Game start announcement, derived from the index.
#[derive(Debug, Clone)]
pub struct GameStart {
    /// Session that is now full.
    pub session_id: String,
    /// Participant holding [`Role::First`].
    pub first: Participant,
}

/// Move payload, forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    /// Origin square (opaque).
    pub from: String,
    /// Destination square (opaque).
    pub to: String,
    /// Session the move is addressed to.
    pub session_id: String,
}

/// Admitted move: deliver to the group, skipping the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRelay {
    /// Group to deliver to.
    pub session_id: String,
    /// Connection to exclude.
    pub sender: ParticipantId,
    /// Origin square.
    pub from: String,
    /// Destination square.
    pub to: String,
}

/// Canonical form of a client-supplied game id.
///
/// Join and move both go through this so they address the same group.
pub fn normalize_session_id(raw: &str) -> &str {
    raw.trim()
}

/// Owner of all session state.
#[derive(Debug, Default)]
pub struct Matchmaker {
    config: MatchmakerConfig,
    registry: ParticipantRegistry,
    index: SessionIndex,
}

impl Matchmaker {
    /// Create an empty matchmaker.
    pub fn new(config: MatchmakerConfig) -> Self {
        Self {
            config,
            registry: ParticipantRegistry::new(),
            index: SessionIndex::new(),
        }
    }

    /// Seat a participant in a session.
    ///
    /// Fails without mutating anything if the request is malformed, the
    /// connection is already seated, or the session is full.
    pub fn join(&mut self, req: JoinRequest) -> Result<JoinOutcome, MatchError> {
        let name = req.name.trim();
        let session_id = normalize_session_id(&req.session_id);

        if session_id.is_empty() {
            return Err(MatchError::InvalidJoin("game id is required".to_string()));
        }
        if name.is_empty() {
            return Err(MatchError::InvalidJoin("name is required".to_string()));
        }
        if name.chars().count() > self.config.max_name_len {
            return Err(MatchError::InvalidJoin(format!(
                "name longer than {} characters",
                self.config.max_name_len
            )));
        }

        if self.registry.contains(&req.participant_id) {
            return Err(MatchError::AlreadyJoined);
        }

        let members = self.index.members_of(session_id);
        if members.len() >= SESSION_CAPACITY {
            debug!("Join to full game {} rejected", session_id);
            return Err(MatchError::SessionFull);
        }

        let opponent = match members.first() {
            Some(id) => Some(self.registry.get(id)?.clone()),
            None => None,
        };

        // The empty seat is whichever one the sitting member does not hold
        let role = opponent
            .as_ref()
            .map(|o| o.role.opposite())
            .unwrap_or(Role::First);

        let participant = Participant {
            id: req.participant_id,
            name: name.to_string(),
            session_id: session_id.to_string(),
            role,
        };

        self.registry.insert(participant.clone())?;
        self.index.add(session_id, participant.id);

        info!(
            "{} joined game {} as {} ({})",
            participant.name,
            session_id,
            role,
            participant.id.short()
        );

        Ok(JoinOutcome {
            participant,
            opponent,
        })
    }

    /// Admit a move for relay.
    ///
    /// Under [`MovePolicy::Permissive`] no state is consulted.
    pub fn relay_move(
        &self,
        sender: ParticipantId,
        mv: MoveRequest,
    ) -> Result<MoveRelay, MatchError> {
        let session_id = normalize_session_id(&mv.session_id).to_string();

        if self.config.move_policy == MovePolicy::MembersOnly {
            let is_member = self
                .registry
                .get(&sender)
                .map(|p| p.session_id == session_id)
                .unwrap_or(false);
            if !is_member {
                return Err(MatchError::NotMember(session_id));
            }
        }

        Ok(MoveRelay {
            session_id,
            sender,
            from: mv.from,
            to: mv.to,
        })
    }

    /// Remove a participant. Unknown ids are a no-op.
    pub fn leave(&mut self, id: &ParticipantId) -> Option<Participant> {
        let participant = self.registry.remove(id).ok()?;
        self.index.remove(&participant.session_id, id);

        info!(
            "{} left game {} ({})",
            participant.name,
            participant.session_id,
            id.short()
        );

        Some(participant)
    }

    /// Game start for a full session, naming the first mover.
    pub fn game_start(&self, session_id: &str) -> Option<GameStart> {
        if self.index.count(session_id) < SESSION_CAPACITY {
            return None;
        }

        let first = self
            .members_of(session_id)
            .into_iter()
            .find(|p| p.role == Role::First)?
            .clone();

        Some(GameStart {
            session_id: session_id.to_string(),
            first,
        })
    }

    /// Participant records of a session in join order.
    pub fn members_of(&self, session_id: &str) -> Vec<&Participant> {
        self.index
            .members_of(session_id)
            .iter()
            .filter_map(|id| self.registry.get(id).ok())
            .collect()
    }

    /// Occupancy of a session.
    pub fn session_state(&self, session_id: &str) -> SessionState {
        match self.index.count(session_id) {
            0 => SessionState::Empty,
            1 => SessionState::OneJoined,
            _ => SessionState::Full,
        }
    }

    /// Look up a participant.
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.registry.get(id).ok()
    }

    /// Read access to the session index.
    pub fn index(&self) -> &SessionIndex {
        &self.index
    }

    /// Number of seated participants.
    pub fn participant_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.index.session_count()
    }

    /// Drop all sessions, returning the participants that were seated.
    pub fn shutdown(&mut self) -> Vec<Participant> {
        self.index.clear();
        let dropped = self.registry.clear();
        info!("Matchmaker cleared {} participants", dropped.len());
        dropped
    }
}
