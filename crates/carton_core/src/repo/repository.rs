//! Typed repository over one entity mapping.
//!
//! # Responsibility
//! - CRUD entry points with lifecycle-aware semantics (`save` persists
//!   or merges, `delete` is the remove transition).
//! - Derived finders from typed filters, with sorting and paging.
//! - Set-based bulk updates that bypass session tracking.
//!
//! # Invariants
//! - Every query validates attribute names against the mapping before
//!   rendering SQL; values bind as placeholders.
//! - Query results pass through the session identity map: an already
//!   tracked identifier yields the existing handle.
//! - Bulk updates evict tracked entries of the target table.

use crate::db::DbError;
use crate::model::entity::{Entity, MapError};
use crate::query::filter::{ensure_identifier, ensure_known_attr, BulkUpdate, Filter, QueryError};
use crate::query::page::{Page, PageRequest, Sort};
use crate::session::{select_sql, Managed, Session, SessionError};
use log::{debug, info};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository-level error: configuration, lifecycle or storage failure.
#[derive(Debug)]
pub enum RepoError {
    Session(SessionError),
    Query(QueryError),
    Db(DbError),
    Map(MapError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Map(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Map(err) => Some(err),
        }
    }
}

impl From<SessionError> for RepoError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<MapError> for RepoError {
    fn from(value: MapError) -> Self {
        Self::Map(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Transactional locking hint for a find.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    #[default]
    None,
    /// Acquires the database write lock before reading, by issuing a
    /// no-op predicate-matching UPDATE inside the active transaction.
    /// SQLite locking is database-granular; the hint keeps concurrent
    /// writers out until commit.
    ForUpdate,
}

/// Side-channel hints for a find; never change the result shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Track results but skip them during dirty-check flush.
    pub read_only: bool,
    pub lock: LockMode,
}

impl FindOptions {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn locked() -> Self {
        Self {
            lock: LockMode::ForUpdate,
            ..Self::default()
        }
    }
}

/// Typed repository over one entity type, borrowing a shared session.
pub struct Repository<'s, E: Entity> {
    session: &'s Session,
    _entity: PhantomData<E>,
}

impl<'s, E: Entity> Repository<'s, E> {
    /// Builds a repository, validating the entity mapping up front.
    ///
    /// # Errors
    /// - `QueryError::InvalidIdentifier` for malformed table/column
    ///   names.
    /// - `QueryError::InvalidMapping` for empty or duplicated columns,
    ///   or a data column shadowing the identifier column.
    pub fn new(session: &'s Session) -> RepoResult<Self> {
        ensure_identifier(E::table())?;
        ensure_identifier(E::id_column())?;
        if E::columns().is_empty() {
            return Err(QueryError::InvalidMapping(format!(
                "table `{}` declares no data columns",
                E::table()
            ))
            .into());
        }

        let mut seen = HashSet::new();
        for column in E::columns() {
            ensure_identifier(column)?;
            if *column == E::id_column() {
                return Err(QueryError::InvalidMapping(format!(
                    "table `{}` lists identifier column `{column}` as a data column",
                    E::table()
                ))
                .into());
            }
            if !seen.insert(*column) {
                return Err(QueryError::InvalidMapping(format!(
                    "table `{}` declares column `{column}` twice",
                    E::table()
                ))
                .into());
            }
        }

        debug!("event=repository_ready module=repo table={}", E::table());
        Ok(Self {
            session,
            _entity: PhantomData,
        })
    }

    /// Inserts a transient entity or re-attaches/updates one that
    /// already carries an identifier. Returns the managed handle with
    /// identifier populated.
    pub fn save(&self, entity: E) -> RepoResult<Managed<E>> {
        let handle = if entity.id().is_none() {
            self.session.persist(entity)?
        } else {
            self.session.merge(entity)?
        };
        Ok(handle)
    }

    /// Looks up by identifier; absent rows are `Ok(None)`, not an error.
    pub fn find_by_id(&self, id: &E::Id) -> RepoResult<Option<Managed<E>>> {
        Ok(self.session.find::<E>(id)?)
    }

    /// Full scan of the backing table.
    pub fn find_all(&self) -> RepoResult<Vec<Managed<E>>> {
        self.find_where(&Filter::all())
    }

    /// The remove transition: marks the handle for deletion on flush.
    pub fn delete(&self, handle: &Managed<E>) -> RepoResult<()> {
        Ok(self.session.remove(handle)?)
    }

    /// Cardinality of stored entities of this type.
    pub fn count(&self) -> RepoResult<u64> {
        self.count_where(&Filter::all())
    }

    /// Cardinality of rows matching the filter.
    pub fn count_where(&self, filter: &Filter) -> RepoResult<u64> {
        self.session.flush()?;
        filter.validate(E::table(), E::id_column(), E::columns())?;

        let mut next_param = 1usize;
        let (where_sql, params) = filter.where_clause(&mut next_param);
        let sql = format!("SELECT COUNT(*) FROM {}{where_sql};", E::table());
        let count = self.session.conn().query_row(
            &sql,
            params_from_iter(params),
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count)
    }

    /// Derived finder: all rows matching the filter.
    pub fn find_where(&self, filter: &Filter) -> RepoResult<Vec<Managed<E>>> {
        self.find_where_with(filter, &[], &FindOptions::default())
    }

    /// Derived finder with sort keys and fetch hints.
    pub fn find_where_with(
        &self,
        filter: &Filter,
        sort: &[Sort],
        options: &FindOptions,
    ) -> RepoResult<Vec<Managed<E>>> {
        self.run_select(filter, sort, None, options)
    }

    /// First row matching the filter under the given sort, if any.
    pub fn find_first(&self, filter: &Filter, sort: &[Sort]) -> RepoResult<Option<Managed<E>>> {
        self.find_first_with(filter, sort, &FindOptions::default())
    }

    /// `find_first` with fetch hints.
    pub fn find_first_with(
        &self,
        filter: &Filter,
        sort: &[Sort],
        options: &FindOptions,
    ) -> RepoResult<Option<Managed<E>>> {
        let mut found = self.run_select(filter, sort, Some((1, 0)), options)?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    /// Paged finder: bounded slice plus `has_next`, computed by fetching
    /// one row beyond the page. No total count is taken; a concurrent
    /// writer may shift page boundaries between requests.
    pub fn find_page(
        &self,
        filter: &Filter,
        request: &PageRequest,
    ) -> RepoResult<Page<Managed<E>>> {
        if request.size == 0 {
            return Err(QueryError::InvalidPageSize(request.size).into());
        }

        let limit = i64::from(request.size) + 1;
        let offset = i64::from(request.number) * i64::from(request.size);
        let mut content = self.run_select(
            filter,
            &request.sort,
            Some((limit, offset)),
            &FindOptions::default(),
        )?;

        let has_next = content.len() > request.size as usize;
        content.truncate(request.size as usize);
        Ok(Page::new(content, request.number, request.size, has_next))
    }

    /// Executes a set-based update directly against the store, bypassing
    /// session snapshots, and returns the affected-row count.
    ///
    /// Tracked entries of this table are evicted afterwards, so
    /// subsequent reads re-fetch fresh state.
    pub fn update_bulk(&self, update: &BulkUpdate) -> RepoResult<usize> {
        self.session.flush()?;
        update.validate(E::table(), E::id_column(), E::columns())?;

        let (sql, params) = update.render(E::table());
        let changed = self
            .session
            .conn()
            .execute(&sql, params_from_iter(params))?;
        self.session.evict_table(E::table());
        info!(
            "event=bulk_update module=repo table={} changed={changed}",
            E::table()
        );
        Ok(changed)
    }

    fn run_select(
        &self,
        filter: &Filter,
        sort: &[Sort],
        limit_offset: Option<(i64, i64)>,
        options: &FindOptions,
    ) -> RepoResult<Vec<Managed<E>>> {
        self.session.flush()?;
        filter.validate(E::table(), E::id_column(), E::columns())?;
        for key in sort {
            ensure_known_attr(E::table(), E::id_column(), E::columns(), &key.attr)?;
        }

        let mut next_param = 1usize;
        let (where_sql, mut params) = filter.where_clause(&mut next_param);

        if options.lock == LockMode::ForUpdate {
            let lock_sql = format!(
                "UPDATE {table} SET {id} = {id}{where_sql};",
                table = E::table(),
                id = E::id_column()
            );
            self.session
                .conn()
                .execute(&lock_sql, params_from_iter(params.clone()))?;
        }

        let mut sql = format!("{}{}", select_sql::<E>(), where_sql);
        if !sort.is_empty() {
            let keys: Vec<String> = sort
                .iter()
                .map(|key| format!("{} {}", key.attr, key.direction.sql()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
        }
        if let Some((limit, offset)) = limit_offset {
            sql.push_str(&format!(" LIMIT ?{next_param}"));
            params.push(Value::Integer(limit));
            if offset > 0 {
                sql.push_str(&format!(" OFFSET ?{}", next_param + 1));
                params.push(Value::Integer(offset));
            }
        }
        sql.push(';');

        let mut stmt = self.session.conn().prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut found = Vec::new();
        while let Some(row) = rows.next()? {
            let entity = E::from_row(row)?;
            found.push(self.session.track_loaded(entity, options.read_only)?);
        }
        Ok(found)
    }
}
