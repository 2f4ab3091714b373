//! Per-kind tracking rules for rosters and members.

use super::error::{ContextError, ContextResult};
use super::sealed::Sealed;
use super::tracker::{ChangeTracker, EntryKey, EntryState};
use super::{RosterContext, TrackedEntity};
use crate::model::member::Member;
use crate::model::roster::ClassRoster;
use crate::model::{Entity, EntityId, UNSET_ID};
use crate::repo::member_repo::{MemberRepository, SqliteMemberRepository};
use crate::repo::roster_repo::{RosterRepository, SqliteRosterRepository};
use crate::repo::{RepoResult, Versioned};
use rusqlite::Connection;

impl Sealed for ClassRoster {}
impl Sealed for Member {}

impl TrackedEntity for ClassRoster {
    fn tracker(ctx: &RosterContext) -> &ChangeTracker<Self> {
        &ctx.rosters
    }

    fn tracker_mut(ctx: &mut RosterContext) -> &mut ChangeTracker<Self> {
        &mut ctx.rosters
    }

    fn fetch_all(conn: &Connection) -> RepoResult<Vec<Versioned<Self>>> {
        SqliteRosterRepository::new(conn).list()
    }

    fn fetch_one(conn: &Connection, id: EntityId) -> RepoResult<Option<Versioned<Self>>> {
        SqliteRosterRepository::new(conn).get(id)
    }

    fn stage_new(ctx: &mut RosterContext, entity: Self) -> ContextResult<EntryKey> {
        for member in &entity.members {
            if member.is_persisted() {
                return Err(ContextError::InvalidOperation(format!(
                    "member {} already has an identity and cannot be added with a new roster",
                    member.id()
                )));
            }
            if member.roster_id() != UNSET_ID {
                return Err(ContextError::InvalidOperation(format!(
                    "member already belongs to roster {}",
                    member.roster_id()
                )));
            }
        }

        let roster_key = ctx.rosters.track_added(entity.without_members(), None);
        for member in entity.members {
            ctx.members.track_added(member, Some(roster_key));
        }
        Ok(roster_key)
    }

    fn stage_removal(ctx: &mut RosterContext, key: EntryKey) {
        let Some(entry) = ctx.rosters.entry_mut(key) else {
            return;
        };
        let roster_id = entry.current.id();
        let added = entry.snapshot.is_none();
        if added {
            ctx.rosters.detach(key);
        } else {
            entry.deleted = true;
        }

        let owned = ctx
            .members
            .iter()
            .filter(|(_, member)| {
                member.owner == Some(key)
                    || (roster_id != UNSET_ID && member.current.roster_id() == roster_id)
            })
            .map(|(member_key, _)| member_key)
            .collect::<Vec<_>>();
        for member_key in owned {
            stage_member_removal(ctx, member_key);
        }
    }

    fn check_update(_snapshot: &Self, _updated: &Self) -> ContextResult<()> {
        Ok(())
    }

    fn normalize(entity: &mut Self) {
        entity.members.clear();
    }

    fn load_owned(ctx: &mut RosterContext, items: &mut [(EntryKey, Self)]) -> ContextResult<()> {
        for (roster_key, roster) in items.iter_mut() {
            let mut members = Vec::new();

            if roster.is_persisted() {
                let rows = SqliteMemberRepository::new(&ctx.conn).list_for_roster(roster.id())?;
                for row in rows {
                    let member_key = ctx.members.attach(row);
                    if let Some(entry) = ctx.members.entry(member_key) {
                        if !entry.deleted {
                            members.push(entry.current.clone());
                        }
                    }
                }
            }

            let roster_id = roster.id();
            members.extend(
                ctx.members
                    .iter()
                    .filter(|(_, entry)| {
                        entry.state() == EntryState::Added
                            && (entry.owner == Some(*roster_key)
                                || (roster_id != UNSET_ID
                                    && entry.current.roster_id() == roster_id))
                    })
                    .map(|(_, entry)| entry.current.clone()),
            );

            roster.members = members;
        }
        Ok(())
    }
}

impl TrackedEntity for Member {
    fn tracker(ctx: &RosterContext) -> &ChangeTracker<Self> {
        &ctx.members
    }

    fn tracker_mut(ctx: &mut RosterContext) -> &mut ChangeTracker<Self> {
        &mut ctx.members
    }

    fn fetch_all(conn: &Connection) -> RepoResult<Vec<Versioned<Self>>> {
        SqliteMemberRepository::new(conn).list()
    }

    fn fetch_one(conn: &Connection, id: EntityId) -> RepoResult<Option<Versioned<Self>>> {
        SqliteMemberRepository::new(conn).get(id)
    }

    fn stage_new(ctx: &mut RosterContext, entity: Self) -> ContextResult<EntryKey> {
        if entity.roster_id() == UNSET_ID {
            return Err(ContextError::InvalidOperation(
                "a standalone member needs an owning roster; use Member::for_roster".to_string(),
            ));
        }
        if let Some(roster_key) = ctx.rosters.key_of(entity.roster_id()) {
            if ctx.rosters.state_of(roster_key) == EntryState::Deleted {
                return Err(ContextError::InvalidOperation(format!(
                    "roster {} is staged for deletion",
                    entity.roster_id()
                )));
            }
        }
        Ok(ctx.members.track_added(entity, None))
    }

    fn stage_removal(ctx: &mut RosterContext, key: EntryKey) {
        stage_member_removal(ctx, key);
    }

    fn check_update(snapshot: &Self, updated: &Self) -> ContextResult<()> {
        if snapshot.roster_id() != updated.roster_id() {
            return Err(ContextError::InvalidOperation(format!(
                "member {} cannot move from roster {} to roster {}",
                snapshot.id(),
                snapshot.roster_id(),
                updated.roster_id()
            )));
        }
        Ok(())
    }

    fn is_visible(ctx: &RosterContext, entity: &Self) -> bool {
        ctx.rosters
            .key_of(entity.roster_id())
            .map_or(true, |key| ctx.rosters.state_of(key) != EntryState::Deleted)
    }
}

fn stage_member_removal(ctx: &mut RosterContext, key: EntryKey) {
    let Some(entry) = ctx.members.entry_mut(key) else {
        return;
    };
    if entry.snapshot.is_none() {
        ctx.members.detach(key);
    } else {
        entry.deleted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassRoster, Member, TrackedEntity};
    use crate::context::ContextError;
    use chrono::NaiveDate;

    fn stored_member(roster_id: i64) -> Member {
        let born = NaiveDate::from_ymd_opt(2003, 3, 1).unwrap();
        Member::from_store(7, roster_id, "Student".into(), "First".into(), born)
    }

    #[test]
    fn member_update_keeps_owning_roster() {
        let snapshot = stored_member(1);
        let mut renamed = snapshot.clone();
        renamed.first_name = "Pupil".to_string();
        assert!(Member::check_update(&snapshot, &renamed).is_ok());

        let moved = stored_member(2);
        assert!(matches!(
            Member::check_update(&snapshot, &moved),
            Err(ContextError::InvalidOperation(_))
        ));
    }

    #[test]
    fn roster_is_tracked_without_members() {
        let mut roster = ClassRoster::with_members("4AHIF", vec![stored_member(1)]);
        ClassRoster::normalize(&mut roster);
        assert!(roster.members.is_empty());
        assert_eq!(roster.name, "4AHIF");
    }
}
