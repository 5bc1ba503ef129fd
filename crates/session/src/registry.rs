//! Participant registry.
//!
//! The host owns the canonical registry; every client holds a replica that
//! changes only through host messages, apart from its own position.

use std::collections::HashMap;

use hideseek_sim::{Role, Vec2};

use crate::ident::ParticipantId;

/// One participant's replicated record.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub role: Role,
    pub position: Vec2,
    /// Only meaningful when `role == Role::Hider`.
    pub captured: bool,
    /// Display-only colour token.
    pub color: String,
}

impl Participant {
    pub fn new(
        id: impl Into<ParticipantId>,
        name: impl Into<String>,
        role: Role,
        position: Vec2,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            position,
            captured: false,
            color: color.into(),
        }
    }

    /// Hider still in play.
    pub fn is_uncaptured_hider(&self) -> bool {
        self.role == Role::Hider && !self.captured
    }

    /// A captured hider is frozen: it no longer moves.
    pub fn is_frozen(&self) -> bool {
        self.role == Role::Hider && self.captured
    }
}

/// Identity → participant mapping. Iteration order is unspecified; use
/// [`Registry::sorted`] where a stable order matters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    participants: HashMap<ParticipantId, Participant>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a participant. Returns the previous record.
    pub fn insert(&mut self, participant: Participant) -> Option<Participant> {
        self.participants
            .insert(participant.id.clone(), participant)
    }

    pub fn remove(&mut self, id: &str) -> Option<Participant> {
        self.participants.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.participants.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Participants ordered by identity.
    pub fn sorted(&self) -> Vec<&Participant> {
        let mut all: Vec<_> = self.participants.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn uncaptured_hiders(&self) -> impl Iterator<Item = &Participant> {
        self.iter().filter(|p| p.is_uncaptured_hider())
    }

    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &Participant> {
        self.iter().filter(move |p| p.role == role)
    }

    /// Replace the contents with `participants`.
    pub fn replace_all(&mut self, participants: impl IntoIterator<Item = Participant>) {
        self.participants = participants
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
    }

    /// Drop everyone except `id`.
    pub fn retain_only(&mut self, id: &str) {
        self.participants.retain(|k, _| k == id);
    }
}
