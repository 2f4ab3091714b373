//! Roster use-case services.
//!
//! # Responsibility
//! - Turn context operations into single-call use cases.
//! - Keep CLI callers away from tracking and commit details.

pub mod roster_service;
