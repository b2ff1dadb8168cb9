//! Entity mapping and relation primitives.
//!
//! # Responsibility
//! - Define the declarative mapping contract applications implement per
//!   persistent type.
//! - Keep the mapping surface free of session/tracking concerns.
//!
//! # Invariants
//! - Identifiers are immutable once assigned.
//! - Lazy relations resolve only inside an active transaction.

pub mod entity;
pub mod relation;
