//! Roster member entity.

use super::{Entity, EntityId, EntityKind, UNSET_ID};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Individual belonging to exactly one roster.
///
/// The owning roster is stored as its id. It stays [`UNSET_ID`] for members
/// created through [`Member::new`] until the owning roster is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    id: EntityId,
    roster_id: EntityId,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
}

impl Member {
    /// Creates a member to be placed into a new roster's `members`.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        birth_date: NaiveDate,
    ) -> Self {
        Self::for_roster(UNSET_ID, first_name, last_name, birth_date)
    }

    /// Creates a member owned by an already committed roster.
    pub fn for_roster(
        roster_id: EntityId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        birth_date: NaiveDate,
    ) -> Self {
        Self {
            id: UNSET_ID,
            roster_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            birth_date,
        }
    }

    pub(crate) fn from_store(
        id: EntityId,
        roster_id: EntityId,
        first_name: String,
        last_name: String,
        birth_date: NaiveDate,
    ) -> Self {
        Self {
            id,
            roster_id,
            first_name,
            last_name,
            birth_date,
        }
    }

    /// Id of the owning roster.
    pub fn roster_id(&self) -> EntityId {
        self.roster_id
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub(crate) fn assign_id(&mut self, id: EntityId) {
        self.id = id;
    }

    pub(crate) fn assign_roster(&mut self, roster_id: EntityId) {
        self.roster_id = roster_id;
    }
}

impl Entity for Member {
    const KIND: EntityKind = EntityKind::Member;

    fn id(&self) -> EntityId {
        self.id
    }
}
