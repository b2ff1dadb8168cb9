//! Repository layer: typed data access over a session.
//!
//! # Responsibility
//! - Provide the per-entity persistence contract: CRUD, derived finders,
//!   paging, bulk update, fetch hints.
//! - Isolate query SQL details from application code.
//!
//! # Invariants
//! - Construction validates the entity mapping and fails fast on
//!   configuration errors.
//! - Queries flush the session first so pending mutations are visible.

pub mod repository;
