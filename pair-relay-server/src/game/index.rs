//! Session Index
//!
//! Non-owning view grouping participant ids by session, in join order.
//! Mutated only by the matchmaker alongside the registry.

use std::collections::BTreeMap;

use crate::game::participant::ParticipantId;

/// Maximum participants in one session.
pub const SESSION_CAPACITY: usize = 2;

/// Session id → participant ids, oldest join first.
///
/// Sessions with no members are never stored.
#[derive(Debug, Default)]
pub struct SessionIndex {
    sessions: BTreeMap<String, Vec<ParticipantId>>,
}

impl SessionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Members of a session in join order (empty if none).
    pub fn members_of(&self, session_id: &str) -> &[ParticipantId] {
        self.sessions
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of members in a session.
    pub fn count(&self, session_id: &str) -> usize {
        self.members_of(session_id).len()
    }

    /// Whether a session has reached capacity.
    pub fn is_full(&self, session_id: &str) -> bool {
        self.count(session_id) >= SESSION_CAPACITY
    }

    /// Number of non-empty sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Iterate over `(session_id, members)` pairs.
    pub fn sessions(&self) -> impl Iterator<Item = (&str, &[ParticipantId])> {
        self.sessions.iter().map(|(id, m)| (id.as_str(), m.as_slice()))
    }

    pub(crate) fn add(&mut self, session_id: &str, id: ParticipantId) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .push(id);
    }

    /// Returns true if the id was a member.
    pub(crate) fn remove(&mut self, session_id: &str, id: &ParticipantId) -> bool {
        let Some(members) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let before = members.len();
        members.retain(|m| m != id);
        let removed = members.len() != before;

        if members.is_empty() {
            self.sessions.remove(session_id);
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.sessions.clear();
    }
}
