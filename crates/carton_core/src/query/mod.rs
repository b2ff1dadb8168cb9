//! Typed query construction: filters, sorting, paging, bulk updates.
//!
//! # Responsibility
//! - Express repository query predicates as data instead of SQL strings.
//! - Validate attribute names against the entity mapping before any SQL
//!   is rendered.
//!
//! # Invariants
//! - Values always bind as placeholders; only validated identifiers are
//!   interpolated into SQL text.

pub mod filter;
pub mod page;
