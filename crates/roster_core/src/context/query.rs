//! Lazy, restartable query descriptions.
//!
//! # Responsibility
//! - Hold predicates, ordering and paging for one entity kind.
//! - Re-evaluate against a context on every terminal call.
//!
//! # Invariants
//! - A query never caches results; two terminal calls may observe different
//!   rows when the context committed in between.
//! - Ordering is stable: ties keep store order (id order, then staged
//!   additions in the order they were added).

use super::error::{ContextError, ContextResult};
use super::{RosterContext, TrackedEntity};
use crate::model::roster::ClassRoster;
use std::cmp::Ordering;
use std::rc::Rc;

type Predicate<T> = Rc<dyn Fn(&T) -> bool>;
type Comparator<T> = Rc<dyn Fn(&T, &T) -> Ordering>;

/// Query over one entity kind, evaluated by its terminal methods.
pub struct Query<T> {
    filters: Vec<Predicate<T>>,
    ordering: Vec<Comparator<T>>,
    skip: usize,
    take: Option<usize>,
    include_members: bool,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            ordering: self.ordering.clone(),
            skip: self.skip,
            take: self.take,
            include_members: self.include_members,
        }
    }
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            ordering: Vec::new(),
            skip: 0,
            take: None,
            include_members: false,
        }
    }
}

impl<T: TrackedEntity + 'static> Query<T> {
    /// Query matching every entity of this kind.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps entities for which `predicate` returns `true`. Filters compose
    /// with logical AND.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        self.filters.push(Rc::new(predicate));
        self
    }

    /// Replaces any ordering with ascending `key`.
    pub fn order_by<K: Ord + 'static>(mut self, key: impl Fn(&T) -> K + 'static) -> Self {
        self.ordering.clear();
        self.then_by(key)
    }

    /// Replaces any ordering with descending `key`.
    pub fn order_by_desc<K: Ord + 'static>(mut self, key: impl Fn(&T) -> K + 'static) -> Self {
        self.ordering.clear();
        self.then_by_desc(key)
    }

    /// Adds an ascending tie-breaker.
    pub fn then_by<K: Ord + 'static>(mut self, key: impl Fn(&T) -> K + 'static) -> Self {
        self.ordering
            .push(Rc::new(move |left: &T, right: &T| key(left).cmp(&key(right))));
        self
    }

    /// Adds a descending tie-breaker.
    pub fn then_by_desc<K: Ord + 'static>(mut self, key: impl Fn(&T) -> K + 'static) -> Self {
        self.ordering
            .push(Rc::new(move |left: &T, right: &T| key(right).cmp(&key(left))));
        self
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }

    /// Evaluates the query and returns all matches.
    pub fn to_vec(&self, ctx: &mut RosterContext) -> ContextResult<Vec<T>> {
        ctx.evaluate(self)
    }

    /// First match.
    ///
    /// # Errors
    /// - `ContextError::NotFound` when nothing matches.
    pub fn first(&self, ctx: &mut RosterContext) -> ContextResult<T> {
        self.first_or_none(ctx)?
            .ok_or(ContextError::NotFound { kind: T::KIND })
    }

    pub fn first_or_none(&self, ctx: &mut RosterContext) -> ContextResult<Option<T>> {
        Ok(self.to_vec(ctx)?.into_iter().next())
    }

    /// The only match.
    ///
    /// # Errors
    /// - `ContextError::NotFound` when nothing matches.
    /// - `ContextError::Ambiguous` when more than one entity matches.
    pub fn single(&self, ctx: &mut RosterContext) -> ContextResult<T> {
        self.single_or_none(ctx)?
            .ok_or(ContextError::NotFound { kind: T::KIND })
    }

    /// The only match, or `None` when nothing matches.
    ///
    /// # Errors
    /// - `ContextError::Ambiguous` when more than one entity matches.
    pub fn single_or_none(&self, ctx: &mut RosterContext) -> ContextResult<Option<T>> {
        let mut matches = self.to_vec(ctx)?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            count => Err(ContextError::Ambiguous {
                kind: T::KIND,
                count,
            }),
        }
    }

    pub fn count(&self, ctx: &mut RosterContext) -> ContextResult<usize> {
        Ok(self.to_vec(ctx)?.len())
    }

    pub fn any(&self, ctx: &mut RosterContext) -> ContextResult<bool> {
        Ok(self.first_or_none(ctx)?.is_some())
    }

    pub(crate) fn includes_members(&self) -> bool {
        self.include_members
    }

    pub(crate) fn matches(&self, value: &T) -> bool {
        self.filters.iter().all(|predicate| predicate(value))
    }

    /// Stable sort of `(key, value)` pairs followed by skip/take.
    pub(crate) fn arrange<K>(&self, mut items: Vec<(K, T)>) -> Vec<(K, T)> {
        if !self.ordering.is_empty() {
            items.sort_by(|(_, left), (_, right)| {
                self.ordering
                    .iter()
                    .map(|compare| compare(left, right))
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let paged = items.into_iter().skip(self.skip);
        match self.take {
            Some(take) => paged.take(take).collect(),
            None => paged.collect(),
        }
    }
}

impl Query<ClassRoster> {
    /// Fills `ClassRoster::members` of every result before filtering.
    pub fn include_members(mut self) -> Self {
        self.include_members = true;
        self
    }
}
