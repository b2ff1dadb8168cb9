//! carton: an embedded typed persistence layer over SQLite.
//!
//! A `Session` is the persistence context — a unit of work that tracks
//! entity lifecycle states (transient, managed, detached, removed) and
//! propagates mutations at flush/commit. A `Repository` gives each
//! entity type its typed query surface: CRUD, filters, paging, bulk
//! updates, fetch hints.

pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod session;

pub use db::{apply_migrations, open_db, open_db_in_memory, DbError, DbResult, Migration, Schema};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entity::{Entity, MapError, ValidationError};
pub use model::relation::LazyRef;
pub use query::filter::{BulkUpdate, Filter, Op, QueryError};
pub use query::page::{Direction, Page, PageRequest, Sort};
pub use repo::repository::{FindOptions, LockMode, RepoError, RepoResult, Repository};
pub use session::{EntityState, Managed, Session, SessionError, SessionResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
