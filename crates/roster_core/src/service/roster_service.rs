//! Roster use-case service.
//!
//! # Responsibility
//! - Enroll, rename and delete rosters; look up and withdraw members.
//!
//! # Invariants
//! - Every call runs in its own context and commits before returning.
//! - Nothing is written when a call fails.

use crate::context::{ContextError, ContextOptions, RosterContext};
use crate::model::member::Member;
use crate::model::roster::ClassRoster;
use crate::model::{Entity, EntityId, EntityKind};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors returned by [`RosterService`].
#[derive(Debug)]
pub enum ServiceError {
    /// Roster name is empty after trimming.
    BlankName,
    /// No entity of `kind` with this id.
    Missing { kind: EntityKind, id: EntityId },
    Context(ContextError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "roster name cannot be blank"),
            Self::Missing { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::Context(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Context(err) => Some(err),
            Self::BlankName | Self::Missing { .. } => None,
        }
    }
}

impl From<ContextError> for ServiceError {
    fn from(value: ContextError) -> Self {
        Self::Context(value)
    }
}

/// Use-case facade over one named store.
pub struct RosterService {
    options: ContextOptions,
}

impl RosterService {
    pub fn new(options: ContextOptions) -> Self {
        Self { options }
    }

    fn context(&self) -> ServiceResult<RosterContext> {
        Ok(RosterContext::open(self.options.clone())?)
    }

    /// Creates a roster with its members and returns it as committed.
    pub fn enroll(&self, name: &str, members: Vec<Member>) -> ServiceResult<ClassRoster> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::BlankName);
        }

        let mut ctx = self.context()?;
        let handle = ctx.add(ClassRoster::with_members(name, members))?;
        let affected = ctx.commit()?;
        let roster_id = ctx.entity(&handle).map_or(0, Entity::id);
        info!(
            "event=roster_enroll module=service status=ok store={} roster_id={} affected={}",
            self.options.store, roster_id, affected
        );

        ctx.rosters()
            .include_members()
            .filter(move |roster| roster.id() == roster_id)
            .single(&mut ctx)
            .map_err(ServiceError::from)
    }

    /// Renames a roster. Returns `false` when the name was already current.
    pub fn rename(&self, roster_id: EntityId, name: &str) -> ServiceResult<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::BlankName);
        }

        let mut ctx = self.context()?;
        let mut roster = ctx
            .find::<ClassRoster>(roster_id)?
            .ok_or(ServiceError::Missing {
                kind: EntityKind::Roster,
                id: roster_id,
            })?;
        roster.name = name.to_string();
        ctx.update(&roster)?;
        Ok(ctx.commit()? > 0)
    }

    /// Member with the earliest birth date; ties resolve to store order.
    pub fn eldest_member(&self) -> ServiceResult<Option<Member>> {
        let mut ctx = self.context()?;
        let eldest = ctx
            .members()
            .order_by(|member| member.birth_date)
            .first_or_none(&mut ctx)?;
        Ok(eldest)
    }

    /// Removes the only member with `last_name`.
    ///
    /// # Errors
    /// - `ContextError::NotFound` / `ContextError::Ambiguous` (wrapped) when
    ///   zero or several members carry that last name.
    pub fn withdraw_member(&self, last_name: &str) -> ServiceResult<Member> {
        let mut ctx = self.context()?;
        let wanted = last_name.to_string();
        let member = ctx
            .members()
            .filter(move |member| member.last_name == wanted)
            .single(&mut ctx)?;
        ctx.remove(&member)?;
        ctx.commit()?;
        info!(
            "event=member_withdraw module=service status=ok store={} member_id={}",
            self.options.store,
            member.id()
        );
        Ok(member)
    }

    /// Deletes a roster with its members; returns the affected entity count.
    pub fn delete_roster(&self, roster_id: EntityId) -> ServiceResult<usize> {
        let mut ctx = self.context()?;
        let roster = ctx
            .find::<ClassRoster>(roster_id)?
            .ok_or(ServiceError::Missing {
                kind: EntityKind::Roster,
                id: roster_id,
            })?;
        ctx.remove(&roster)?;
        Ok(ctx.commit()?)
    }

    pub fn roster_count(&self) -> ServiceResult<usize> {
        let mut ctx = self.context()?;
        Ok(ctx.rosters().count(&mut ctx)?)
    }

    pub fn member_count(&self) -> ServiceResult<usize> {
        let mut ctx = self.context()?;
        Ok(ctx.members().count(&mut ctx)?)
    }

    /// All rosters with members, ordered by name.
    pub fn list_rosters(&self) -> ServiceResult<Vec<ClassRoster>> {
        let mut ctx = self.context()?;
        Ok(ctx
            .rosters()
            .include_members()
            .order_by(|roster| roster.name.clone())
            .to_vec(&mut ctx)?)
    }
}
