//! Entity model for class rosters and their members.
//!
//! # Responsibility
//! - Define the plain records persisted by the roster store.
//! - Expose identity metadata shared by every entity kind.
//!
//! # Invariants
//! - A fresh entity has identity [`UNSET_ID`] until its first commit.
//! - Identity is assigned once by the store and never changes afterwards.
//! - A member's owning roster never changes after creation.

pub mod member;
pub mod roster;

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// Store-assigned surrogate identity.
pub type EntityId = i64;

/// Identity sentinel of entities that were never committed.
pub const UNSET_ID: EntityId = 0;

/// Entity kinds known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Roster,
    Member,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Roster => "roster",
            Self::Member => "member",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common surface of persisted records.
pub trait Entity: Clone + PartialEq + Debug {
    const KIND: EntityKind;

    /// Store identity, or [`UNSET_ID`] before the first commit.
    fn id(&self) -> EntityId;

    fn is_persisted(&self) -> bool {
        self.id() != UNSET_ID
    }

    /// Whether both values map to the same stored row contents.
    fn same_row(&self, other: &Self) -> bool {
        self == other
    }
}
