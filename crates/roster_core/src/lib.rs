//! Core persistence layer for class rosters and their members.
//! Named in-memory stores, a unit-of-work context and lazy queries.

pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use context::{
    ContextError, ContextOptions, ContextResult, EntityMut, EntryHandle, EntryState, Query,
    RosterContext, TrackedEntity,
};
pub use db::{drop_store, open_store, store_exists, store_names, DbError, DbResult, StoreName};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::member::Member;
pub use model::roster::ClassRoster;
pub use model::{Entity, EntityId, EntityKind, UNSET_ID};
pub use repo::{RepoError, RepoResult};
pub use service::roster_service::{RosterService, ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
