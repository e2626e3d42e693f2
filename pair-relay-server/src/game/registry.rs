//! Participant Registry
//!
//! In-memory store of joined participants keyed by connection identity.
//! Uses BTreeMap for sorted iteration.

use std::collections::BTreeMap;

use crate::game::participant::{Participant, ParticipantId};

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A record with this id is already stored.
    #[error("Participant {0} already registered")]
    DuplicateParticipant(ParticipantId),

    /// No record with this id.
    #[error("Participant {0} not found")]
    NotFound(ParticipantId),
}

/// Exclusive owner of all participant records.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: BTreeMap<ParticipantId, Participant>,
}

impl ParticipantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new record.
    pub fn insert(&mut self, participant: Participant) -> Result<(), RegistryError> {
        if self.participants.contains_key(&participant.id) {
            return Err(RegistryError::DuplicateParticipant(participant.id));
        }
        self.participants.insert(participant.id, participant);
        Ok(())
    }

    /// Look up a record.
    pub fn get(&self, id: &ParticipantId) -> Result<&Participant, RegistryError> {
        self.participants.get(id).ok_or(RegistryError::NotFound(*id))
    }

    /// Delete and return a record.
    pub fn remove(&mut self, id: &ParticipantId) -> Result<Participant, RegistryError> {
        self.participants.remove(id).ok_or(RegistryError::NotFound(*id))
    }

    /// Check whether an id is registered.
    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }

    /// Number of registered participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// True when nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Drop every record, returning them.
    pub fn clear(&mut self) -> Vec<Participant> {
        std::mem::take(&mut self.participants).into_values().collect()
    }
}
