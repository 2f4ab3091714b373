//! Class roster entity.

use super::member::Member;
use super::{Entity, EntityId, EntityKind, UNSET_ID};
use serde::{Deserialize, Serialize};

/// Named group of members.
///
/// `members` is the owned collection in insertion order. It is only filled
/// by queries that ask for it (see `Query::include_members`); rosters loaded
/// without it carry an empty list even when members exist in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRoster {
    id: EntityId,
    pub name: String,
    pub members: Vec<Member>,
}

impl ClassRoster {
    /// Creates an uncommitted roster without members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: UNSET_ID,
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Creates an uncommitted roster owning `members`.
    pub fn with_members(name: impl Into<String>, members: Vec<Member>) -> Self {
        Self {
            members,
            ..Self::new(name)
        }
    }

    pub(crate) fn from_store(id: EntityId, name: String) -> Self {
        Self {
            id,
            name,
            members: Vec::new(),
        }
    }

    pub(crate) fn assign_id(&mut self, id: EntityId) {
        self.id = id;
    }

    /// Copy of this roster with the member collection stripped.
    pub(crate) fn without_members(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            members: Vec::new(),
        }
    }
}

impl Entity for ClassRoster {
    const KIND: EntityKind = EntityKind::Roster;

    fn id(&self) -> EntityId {
        self.id
    }

    /// Owned members are separate rows and do not take part.
    fn same_row(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name
    }
}
