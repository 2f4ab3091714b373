use chrono::NaiveDate;
use roster_core::{
    ClassRoster, ContextError, ContextOptions, Entity, EntityKind, EntryState, Member,
    RosterContext, StoreName, UNSET_ID,
};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn open(name: &StoreName) -> RosterContext {
    RosterContext::open_named(name).unwrap()
}

fn seed_pair(name: &StoreName) -> i64 {
    let mut ctx = open(name);
    let handle = ctx
        .add(ClassRoster::with_members(
            "5ABIF_5AKIF",
            vec![
                Member::new("Max", "Mustermann", date(1990, 1, 1)),
                Member::new("Eva", "Musterfrau", date(1991, 1, 1)),
            ],
        ))
        .unwrap();
    ctx.commit().unwrap();
    ctx.entity(&handle).unwrap().id()
}

#[test]
fn adding_a_persisted_entity_is_rejected() {
    let name = StoreName::unique();
    seed_pair(&name);

    let mut ctx = open(&name);
    let roster = ctx.rosters().first(&mut ctx).unwrap();
    let err = ctx.add(roster).unwrap_err();
    assert!(matches!(err, ContextError::InvalidOperation(_)));
}

#[test]
fn adding_an_orphan_member_is_rejected() {
    let name = StoreName::unique();
    let mut ctx = open(&name);
    let err = ctx
        .add(Member::new("Lone", "Wolf", date(2000, 1, 1)))
        .unwrap_err();
    assert!(matches!(err, ContextError::InvalidOperation(_)));
    assert!(!ctx.has_changes());
}

#[test]
fn removing_an_untracked_entity_fails() {
    let name = StoreName::unique();
    seed_pair(&name);

    let loaded = {
        let mut ctx = open(&name);
        ctx.rosters().first(&mut ctx).unwrap()
    };

    let mut fresh = open(&name);
    let err = fresh.remove(&loaded).unwrap_err();
    assert!(matches!(
        err,
        ContextError::NotTracked {
            kind: EntityKind::Roster,
            ..
        }
    ));
    assert!(matches!(
        fresh.remove(&ClassRoster::new("never added")).unwrap_err(),
        ContextError::NotTracked { .. }
    ));
}

#[test]
fn updating_an_untracked_entity_fails() {
    let name = StoreName::unique();
    seed_pair(&name);

    let mut roster = {
        let mut ctx = open(&name);
        ctx.rosters().first(&mut ctx).unwrap()
    };
    roster.name = "renamed elsewhere".to_string();

    let mut fresh = open(&name);
    assert!(matches!(
        fresh.update(&roster).unwrap_err(),
        ContextError::NotTracked { .. }
    ));
    assert!(matches!(
        fresh.update(&ClassRoster::new("no identity")).unwrap_err(),
        ContextError::InvalidOperation(_)
    ));
}

#[test]
fn single_requires_exactly_one_match() {
    let name = StoreName::unique();
    seed_pair(&name);

    let mut ctx = open(&name);
    let none = ctx
        .members()
        .filter(|member| member.last_name == "Nobody")
        .single(&mut ctx)
        .unwrap_err();
    assert!(matches!(
        none,
        ContextError::NotFound {
            kind: EntityKind::Member
        }
    ));

    let many = ctx.members().single(&mut ctx).unwrap_err();
    assert!(matches!(
        many,
        ContextError::Ambiguous {
            kind: EntityKind::Member,
            count: 2
        }
    ));

    assert!(ctx
        .members()
        .filter(|member| member.last_name == "Nobody")
        .single_or_none(&mut ctx)
        .unwrap()
        .is_none());
    assert!(matches!(
        ctx.rosters()
            .filter(|roster| roster.name.is_empty())
            .first(&mut ctx)
            .unwrap_err(),
        ContextError::NotFound { .. }
    ));
}

#[test]
fn concurrent_update_is_reported_as_conflict() {
    let name = StoreName::unique();
    let roster_id = seed_pair(&name);

    let mut first = open(&name);
    let mut second = open(&name);
    let mut mine = first.find::<ClassRoster>(roster_id).unwrap().unwrap();
    let mut theirs = second.find::<ClassRoster>(roster_id).unwrap().unwrap();

    theirs.name = "6ABIF_6AKIF".to_string();
    second.update(&theirs).unwrap();
    assert_eq!(second.commit().unwrap(), 1);

    mine.name = "7ABIF_7AKIF".to_string();
    first.update(&mine).unwrap();
    let err = first.commit().unwrap_err();
    assert!(err.is_concurrency_conflict());
    assert_eq!(first.entry_state(&mine), EntryState::Modified);

    let mut verify = open(&name);
    let stored = verify.find::<ClassRoster>(roster_id).unwrap().unwrap();
    assert_eq!(stored.name, "6ABIF_6AKIF");
}

#[test]
fn deleting_a_row_removed_by_another_context_conflicts() {
    let name = StoreName::unique();
    seed_pair(&name);

    let mut first = open(&name);
    let member = first
        .members()
        .filter(|member| member.last_name == "Musterfrau")
        .single(&mut first)
        .unwrap();

    {
        let mut second = open(&name);
        let same = second
            .members()
            .filter(|member| member.last_name == "Musterfrau")
            .single(&mut second)
            .unwrap();
        second.remove(&same).unwrap();
        second.commit().unwrap();
    }

    first.remove(&member).unwrap();
    let err = first.commit().unwrap_err();
    assert!(matches!(
        err,
        ContextError::ConcurrencyConflict {
            kind: EntityKind::Member,
            ..
        }
    ));
}

#[test]
fn failed_commit_writes_nothing_and_keeps_staged_state() {
    let name = StoreName::unique();
    let mut ctx = open(&name);

    let roster = ctx.add(ClassRoster::new("6ABIF_6AKIF")).unwrap();
    let orphan = ctx
        .add(Member::for_roster(999, "Ghost", "Member", date(2001, 1, 1)))
        .unwrap();

    let err = ctx.commit().unwrap_err();
    assert!(matches!(err, ContextError::UnknownRoster(999)));

    assert_eq!(ctx.entity(&roster).unwrap().id(), UNSET_ID);
    assert_eq!(ctx.handle_state(&roster), EntryState::Added);
    assert_eq!(ctx.entity(&orphan).unwrap().id(), UNSET_ID);
    assert_eq!(ctx.handle_state(&orphan), EntryState::Added);
    assert!(ctx.has_changes());

    let mut verify = open(&name);
    assert_eq!(verify.rosters().count(&mut verify).unwrap(), 0);
    assert_eq!(verify.members().count(&mut verify).unwrap(), 0);

    ctx.remove_entry(&orphan).unwrap();
    assert_eq!(ctx.commit().unwrap(), 1);
    assert_ne!(ctx.entity(&roster).unwrap().id(), UNSET_ID);
}

#[test]
fn unchanged_update_commits_nothing() {
    let name = StoreName::unique();
    seed_pair(&name);

    let mut ctx = open(&name);
    let roster = ctx.rosters().first(&mut ctx).unwrap();
    ctx.update(&roster).unwrap();
    assert_eq!(ctx.entry_state(&roster), EntryState::Unchanged);
    assert!(!ctx.has_changes());
    assert_eq!(ctx.commit().unwrap(), 0);
}

#[test]
fn entry_states_follow_the_unit_of_work() {
    let name = StoreName::unique();
    seed_pair(&name);

    let mut ctx = open(&name);
    let staged = ClassRoster::new("4AHIF");
    assert_eq!(ctx.entry_state(&staged), EntryState::Detached);
    let handle = ctx.add(staged.clone()).unwrap();
    assert_eq!(ctx.entry_state(&staged), EntryState::Added);

    let mut member = ctx
        .members()
        .filter(|member| member.last_name == "Mustermann")
        .single(&mut ctx)
        .unwrap();
    assert_eq!(ctx.entry_state(&member), EntryState::Unchanged);
    member.first_name = "Moritz".to_string();
    ctx.update(&member).unwrap();
    assert_eq!(ctx.entry_state(&member), EntryState::Modified);

    ctx.remove(&member).unwrap();
    assert_eq!(ctx.entry_state(&member), EntryState::Deleted);
    assert!(matches!(
        ctx.update(&member).unwrap_err(),
        ContextError::InvalidOperation(_)
    ));

    ctx.remove_entry(&handle).unwrap();
    assert_eq!(ctx.handle_state(&handle), EntryState::Detached);
    assert_eq!(ctx.commit().unwrap(), 1);
    assert_eq!(ctx.entry_state(&member), EntryState::Detached);
}

#[test]
fn entity_mut_edits_are_committed() {
    let name = StoreName::unique();
    let mut ctx = open(&name);
    let handle = ctx.add(ClassRoster::new("draft")).unwrap();
    ctx.entity_mut(&handle).unwrap().name = "3CHIF".to_string();
    ctx.commit().unwrap();

    ctx.entity_mut(&handle).unwrap().name = "4CHIF".to_string();
    assert_eq!(ctx.handle_state(&handle), EntryState::Modified);
    assert_eq!(ctx.commit().unwrap(), 1);

    let mut verify = open(&name);
    assert_eq!(verify.rosters().first(&mut verify).unwrap().name, "4CHIF");
}

#[test]
fn members_pushed_through_entity_mut_are_not_kept() {
    let name = StoreName::unique();
    let mut ctx = open(&name);
    let handle = ctx.add(ClassRoster::new("3CHIF")).unwrap();
    {
        let mut roster = ctx.entity_mut(&handle).unwrap();
        roster
            .members
            .push(Member::new("Stray", "Pupil", date(2005, 5, 5)));
        assert_eq!(roster.members.len(), 1);
    }

    assert!(ctx.entity(&handle).unwrap().members.is_empty());
    let listed = ctx.rosters().single(&mut ctx).unwrap();
    assert!(listed.members.is_empty());
    assert_eq!(ctx.commit().unwrap(), 1);

    let mut verify = open(&name);
    assert_eq!(verify.members().count(&mut verify).unwrap(), 0);
}

#[test]
fn discard_changes_reverts_everything() {
    let name = StoreName::unique();
    seed_pair(&name);

    let mut ctx = open(&name);
    let mut roster = ctx.rosters().first(&mut ctx).unwrap();
    roster.name = "edited".to_string();
    ctx.update(&roster).unwrap();
    let member = ctx.members().first(&mut ctx).unwrap();
    ctx.remove(&member).unwrap();
    ctx.add(ClassRoster::new("staged")).unwrap();
    assert!(ctx.has_changes());

    ctx.discard_changes();

    assert!(!ctx.has_changes());
    assert_eq!(ctx.commit().unwrap(), 0);
    let names = ctx
        .rosters()
        .to_vec(&mut ctx)
        .unwrap()
        .into_iter()
        .map(|roster| roster.name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["5ABIF_5AKIF"]);
    assert_eq!(ctx.members().count(&mut ctx).unwrap(), 2);
}

#[test]
fn queries_see_local_changes_before_commit() {
    let name = StoreName::unique();
    let roster_id = seed_pair(&name);

    let mut ctx = open(&name);
    ctx.add(Member::for_roster(roster_id, "Neo", "Neu", date(2004, 4, 4)))
        .unwrap();
    assert_eq!(ctx.members().count(&mut ctx).unwrap(), 3);

    let roster = ctx.find::<ClassRoster>(roster_id).unwrap().unwrap();
    ctx.remove(&roster).unwrap();
    assert_eq!(ctx.members().count(&mut ctx).unwrap(), 0);
    assert_eq!(ctx.rosters().count(&mut ctx).unwrap(), 0);
    assert!(ctx.find::<ClassRoster>(roster_id).unwrap().is_none());

    // roster + 2 stored members; the staged member is simply dropped
    assert_eq!(ctx.commit().unwrap(), 3);
}

#[test]
fn removing_a_roster_marks_tracked_members_deleted() {
    let name = StoreName::unique();
    seed_pair(&name);

    let mut ctx = open(&name);
    let members = ctx.members().to_vec(&mut ctx).unwrap();
    let roster = ctx.rosters().single(&mut ctx).unwrap();
    ctx.remove(&roster).unwrap();

    for member in &members {
        assert_eq!(ctx.entry_state(member), EntryState::Deleted);
    }
    assert_eq!(ctx.commit().unwrap(), 3);
}

#[test]
fn include_members_merges_staged_members() {
    let name = StoreName::unique();
    let roster_id = seed_pair(&name);

    let mut ctx = open(&name);
    ctx.add(Member::for_roster(roster_id, "Neo", "Neu", date(2004, 4, 4)))
        .unwrap();
    let roster = ctx
        .rosters()
        .include_members()
        .single(&mut ctx)
        .unwrap();
    let last_names = roster
        .members
        .iter()
        .map(|member| member.last_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(last_names, vec!["Mustermann", "Musterfrau", "Neu"]);

    let bare = ctx.rosters().single(&mut ctx).unwrap();
    assert!(bare.members.is_empty());
}

#[test]
fn include_members_with_filter_on_member_count() {
    let name = StoreName::unique();
    seed_pair(&name);
    {
        let mut ctx = open(&name);
        ctx.add(ClassRoster::new("empty class")).unwrap();
        ctx.commit().unwrap();
    }

    let mut ctx = open(&name);
    let populated = ctx
        .rosters()
        .include_members()
        .filter(|roster| !roster.members.is_empty())
        .single(&mut ctx)
        .unwrap();
    assert_eq!(populated.name, "5ABIF_5AKIF");
}

#[test]
fn sensitive_data_logging_is_an_option() {
    let name = StoreName::unique();
    let mut ctx =
        RosterContext::open(ContextOptions::new(name.clone()).enable_sensitive_data_logging())
            .unwrap();
    assert_eq!(ctx.store(), &name);
    ctx.add(ClassRoster::new("logged")).unwrap();
    assert_eq!(ctx.commit().unwrap(), 1);
}
