//! Unit-of-work session and entity lifecycle state machine.
//!
//! # Responsibility
//! - Own the SQLite connection and the identity map of tracked entities.
//! - Drive lifecycle transitions: transient, managed, detached, removed.
//! - Propagate pending mutations and removals atomically at flush/commit.
//!
//! # Invariants
//! - All persistence operations require an active transaction; one
//!   logical transaction per unit of work.
//! - A given identifier maps to at most one managed handle at a time
//!   (first-level identity map).
//! - Updates are flushed before deletes within one flush pass.
//! - Commit and rollback close the unit of work; every tracked entity
//!   becomes detached.

mod tracking;

use crate::db::DbError;
use crate::model::entity::{Entity, MapError, ValidationError};
use log::{debug, info};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub use tracking::Managed;

use tracking::{
    insert_sql, key_for, select_by_id_sql, update_sql, FlushOutcome, Slot, SlotState, TrackedSlot,
};

pub(crate) use tracking::select_sql;

pub type SessionResult<T> = Result<T, SessionError>;

/// Lifecycle state of an entity relative to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// No identity known to any persistence context.
    Transient,
    /// Tracked; in-memory mutations reach the store at flush time.
    Managed,
    /// Carries identity but is no longer tracked.
    Detached,
    /// Scheduled for deletion on next flush.
    Removed,
}

impl Display for EntityState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::Managed => "managed",
            Self::Detached => "detached",
            Self::Removed => "removed",
        };
        write!(f, "{name}")
    }
}

/// Session-layer error for lifecycle and transaction misuse plus
/// underlying storage failures.
#[derive(Debug)]
pub enum SessionError {
    Db(DbError),
    Map(MapError),
    Validation(ValidationError),
    /// Operation requires an active transaction.
    InactiveContext,
    /// `begin` was called while a transaction is already active.
    TransactionActive,
    /// Operation requires a managed entity, found another state.
    StaleState { state: EntityState },
    /// Entity has no identifier and its mapping does not generate one.
    MissingId { table: &'static str },
    /// Identity map and entity mapping disagree; indicates a mapping bug.
    InvalidData(String),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Map(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InactiveContext => {
                write!(f, "persistence context is inactive: no transaction in progress")
            }
            Self::TransactionActive => write!(f, "a transaction is already in progress"),
            Self::StaleState { state } => {
                write!(f, "entity is {state}; operation requires a managed entity")
            }
            Self::MissingId { table } => write!(
                f,
                "entity for table `{table}` has no identifier and none can be generated"
            ),
            Self::InvalidData(message) => write!(f, "invalid tracked state: {message}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Map(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for SessionError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<MapError> for SessionError {
    fn from(value: MapError) -> Self {
        Self::Map(value)
    }
}

impl From<ValidationError> for SessionError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Idle,
    Deferred,
    Immediate,
}

/// Persistence context over one SQLite connection.
///
/// Not shareable across threads; one logical transaction at a time.
pub struct Session {
    conn: Connection,
    session_id: Uuid,
    slots: RefCell<HashMap<String, Box<dyn TrackedSlot>>>,
    tx: Cell<TxState>,
}

impl Session {
    /// Wraps a migrated, ready connection (see `db::open_db`).
    pub fn new(conn: Connection) -> Self {
        let session_id = Uuid::new_v4();
        info!("event=session_open module=session session={session_id}");
        Self {
            conn,
            session_id,
            slots: RefCell::new(HashMap::new()),
            tx: Cell::new(TxState::Idle),
        }
    }

    /// Begins a deferred transaction (read locks escalate on first write).
    pub fn begin(&self) -> SessionResult<()> {
        self.begin_with(TxState::Deferred, "BEGIN DEFERRED;")
    }

    /// Begins an immediate transaction, taking the write lock up front.
    pub fn begin_immediate(&self) -> SessionResult<()> {
        self.begin_with(TxState::Immediate, "BEGIN IMMEDIATE;")
    }

    fn begin_with(&self, state: TxState, sql: &str) -> SessionResult<()> {
        if self.tx.get() != TxState::Idle {
            return Err(SessionError::TransactionActive);
        }
        self.conn.execute_batch(sql)?;
        self.tx.set(state);
        info!(
            "event=tx_begin module=session session={} mode={:?}",
            self.session_id,
            self.tx.get()
        );
        Ok(())
    }

    /// Whether a transaction is in progress.
    pub fn in_transaction(&self) -> bool {
        self.tx.get() != TxState::Idle
    }

    /// Flushes pending work and commits the unit of work.
    ///
    /// The context closes: every tracked entity becomes detached.
    pub fn commit(&self) -> SessionResult<()> {
        self.require_tx()?;
        self.flush()?;
        self.conn.execute_batch("COMMIT;")?;
        self.tx.set(TxState::Idle);
        self.slots.borrow_mut().clear();
        info!(
            "event=tx_commit module=session session={}",
            self.session_id
        );
        Ok(())
    }

    /// Rolls back the unit of work and detaches every tracked entity.
    pub fn rollback(&self) -> SessionResult<()> {
        self.require_tx()?;
        self.conn.execute_batch("ROLLBACK;")?;
        self.tx.set(TxState::Idle);
        self.slots.borrow_mut().clear();
        info!(
            "event=tx_rollback module=session session={}",
            self.session_id
        );
        Ok(())
    }

    /// Makes a transient entity managed: validates, INSERTs, assigns or
    /// confirms the identifier, and starts tracking.
    ///
    /// `persist` on an already-managed identifier is a no-op returning
    /// the existing handle; on a removed entry it revives the entry to
    /// managed.
    pub fn persist<E: Entity>(&self, mut entity: E) -> SessionResult<Managed<E>> {
        self.require_tx()?;
        entity.validate()?;

        if let Some(id) = entity.id() {
            let key = key_for::<E>(&id);
            let mut slots = self.slots.borrow_mut();
            if let Some(slot) = slots.get_mut(&key) {
                let handle = {
                    let slot = downcast_mut::<E>(slot.as_mut(), &key)?;
                    slot.handle.clone()
                };
                if slot.state() == SlotState::Removed {
                    slot.set_state(SlotState::Managed);
                    debug!(
                        "event=persist module=session session={} table={} outcome=revived",
                        self.session_id,
                        E::table()
                    );
                }
                return Ok(handle);
            }
            drop(slots);

            let mut params = vec![E::id_value(&id)];
            params.extend(entity.values());
            self.conn
                .execute(&insert_sql::<E>(true), rusqlite::params_from_iter(params))?;
            return self.track::<E>(entity, false);
        }

        self.conn.execute(
            &insert_sql::<E>(false),
            rusqlite::params_from_iter(entity.values()),
        )?;
        let rowid = self.conn.last_insert_rowid();
        let id = E::id_from_rowid(rowid).ok_or(SessionError::MissingId { table: E::table() })?;
        entity.set_id(id);
        self.track::<E>(entity, false)
    }

    /// Re-attaches a detached entity by identifier.
    ///
    /// Updates the existing row, or inserts it when absent. Merging onto
    /// a removed entry is a usage error.
    pub fn merge<E: Entity>(&self, entity: E) -> SessionResult<Managed<E>> {
        self.require_tx()?;
        entity.validate()?;
        let id = entity
            .id()
            .ok_or(SessionError::MissingId { table: E::table() })?;

        let key = key_for::<E>(&id);
        {
            let mut slots = self.slots.borrow_mut();
            if let Some(slot) = slots.get_mut(&key) {
                if slot.state() == SlotState::Removed {
                    return Err(SessionError::StaleState {
                        state: EntityState::Removed,
                    });
                }
                let slot = downcast_mut::<E>(slot.as_mut(), &key)?;
                // Re-attachment supersedes an earlier read-only fetch
                // hint; the merged state must reach the store at flush.
                slot.read_only = false;
                *slot.handle.edit() = entity;
                return Ok(slot.handle.clone());
            }
        }

        let mut params = entity.values();
        params.push(E::id_value(&id));
        let changed = self
            .conn
            .execute(&update_sql::<E>(), rusqlite::params_from_iter(params))?;
        if changed == 0 {
            let mut params = vec![E::id_value(&id)];
            params.extend(entity.values());
            self.conn
                .execute(&insert_sql::<E>(true), rusqlite::params_from_iter(params))?;
        }
        self.track::<E>(entity, false)
    }

    /// Looks up one entity by identifier: identity map first, then the
    /// store. Removed entries read as absent.
    pub fn find<E: Entity>(&self, id: &E::Id) -> SessionResult<Option<Managed<E>>> {
        self.require_tx()?;

        let key = key_for::<E>(id);
        {
            let slots = self.slots.borrow();
            if let Some(slot) = slots.get(&key) {
                if slot.state() == SlotState::Removed {
                    return Ok(None);
                }
                let slot = downcast_ref::<E>(slot.as_ref(), &key)?;
                return Ok(Some(slot.handle.clone()));
            }
        }

        let sql = select_by_id_sql::<E>();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([E::id_value(id)])?;
        match rows.next()? {
            Some(row) => {
                let entity = E::from_row(row)?;
                Ok(Some(self.track_loaded(entity, false)?))
            }
            None => Ok(None),
        }
    }

    /// Stops tracking; later mutations through the handle are not
    /// persisted. Detaching a transient or already-detached entity is a
    /// no-op.
    pub fn detach<E: Entity>(&self, handle: &Managed<E>) -> SessionResult<()> {
        let Some(id) = handle.id() else {
            return Ok(());
        };
        self.slots.borrow_mut().remove(&key_for::<E>(&id));
        Ok(())
    }

    /// Marks a managed entity for deletion; flush executes the DELETE.
    ///
    /// Removing a transient or detached entity is a usage error.
    pub fn remove<E: Entity>(&self, handle: &Managed<E>) -> SessionResult<()> {
        self.require_tx()?;
        let Some(id) = handle.id() else {
            return Err(SessionError::StaleState {
                state: EntityState::Transient,
            });
        };

        let mut slots = self.slots.borrow_mut();
        let Some(slot) = slots.get_mut(&key_for::<E>(&id)) else {
            return Err(SessionError::StaleState {
                state: EntityState::Detached,
            });
        };
        slot.set_state(SlotState::Removed);
        Ok(())
    }

    /// Propagates pending managed-state mutations and removals to the
    /// store within the active transaction.
    pub fn flush(&self) -> SessionResult<()> {
        self.require_tx()?;
        let mut slots = self.slots.borrow_mut();

        let mut updated = 0usize;
        for slot in slots
            .values_mut()
            .filter(|slot| slot.state() == SlotState::Managed)
        {
            if slot.flush(&self.conn)? == FlushOutcome::Updated {
                updated += 1;
            }
        }

        let removed_keys: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.state() == SlotState::Removed)
            .map(|(key, _)| key.clone())
            .collect();
        let deleted = removed_keys.len();
        for key in removed_keys {
            if let Some(mut slot) = slots.remove(&key) {
                slot.flush(&self.conn)?;
            }
        }

        if updated > 0 || deleted > 0 {
            debug!(
                "event=flush module=session session={} updated={updated} deleted={deleted}",
                self.session_id
            );
        }
        Ok(())
    }

    /// Detaches every tracked entity without touching the store.
    pub fn clear(&self) {
        let evicted = self.slots.borrow().len();
        self.slots.borrow_mut().clear();
        debug!(
            "event=clear module=session session={} evicted={evicted}",
            self.session_id
        );
    }

    /// Whether the handle is currently managed by this session.
    pub fn contains<E: Entity>(&self, handle: &Managed<E>) -> bool {
        self.state_of(handle) == EntityState::Managed
    }

    /// Lifecycle state of the handle relative to this session.
    pub fn state_of<E: Entity>(&self, handle: &Managed<E>) -> EntityState {
        let Some(id) = handle.id() else {
            return EntityState::Transient;
        };
        match self.slots.borrow().get(&key_for::<E>(&id)) {
            Some(slot) if slot.state() == SlotState::Removed => EntityState::Removed,
            Some(_) => EntityState::Managed,
            None => EntityState::Detached,
        }
    }

    pub(crate) fn require_tx(&self) -> SessionResult<()> {
        if self.in_transaction() {
            Ok(())
        } else {
            Err(SessionError::InactiveContext)
        }
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Tracks an entity loaded from the store, returning the existing
    /// handle when the identifier is already tracked (identity map wins
    /// over the fresher row).
    pub(crate) fn track_loaded<E: Entity>(
        &self,
        entity: E,
        read_only: bool,
    ) -> SessionResult<Managed<E>> {
        let id = entity
            .id()
            .ok_or(SessionError::MissingId { table: E::table() })?;
        let key = key_for::<E>(&id);
        {
            let slots = self.slots.borrow();
            if let Some(slot) = slots.get(&key) {
                let slot = downcast_ref::<E>(slot.as_ref(), &key)?;
                return Ok(slot.handle.clone());
            }
        }
        self.track(entity, read_only)
    }

    /// Evicts every tracked entry of the given table; used after bulk
    /// updates that bypass snapshots.
    pub(crate) fn evict_table(&self, table: &str) {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|_, slot| slot.table() != table);
        let evicted = before - slots.len();
        if evicted > 0 {
            debug!(
                "event=evict module=session session={} table={table} evicted={evicted}",
                self.session_id
            );
        }
    }

    fn track<E: Entity>(&self, entity: E, read_only: bool) -> SessionResult<Managed<E>> {
        let id = entity
            .id()
            .ok_or(SessionError::MissingId { table: E::table() })?;
        let key = key_for::<E>(&id);
        let handle = Managed::new(entity);
        self.slots
            .borrow_mut()
            .insert(key, Box::new(Slot::managed(handle.clone(), read_only)));
        Ok(handle)
    }
}

fn downcast_ref<'a, E: Entity>(
    slot: &'a dyn TrackedSlot,
    key: &str,
) -> SessionResult<&'a Slot<E>> {
    slot.as_any()
        .downcast_ref::<Slot<E>>()
        .ok_or_else(|| SessionError::InvalidData(format!("identity map type mismatch for `{key}`")))
}

fn downcast_mut<'a, E: Entity>(
    slot: &'a mut dyn TrackedSlot,
    key: &str,
) -> SessionResult<&'a mut Slot<E>> {
    slot.as_any_mut()
        .downcast_mut::<Slot<E>>()
        .ok_or_else(|| SessionError::InvalidData(format!("identity map type mismatch for `{key}`")))
}
