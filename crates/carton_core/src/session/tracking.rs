//! Identity map slots and row-level SQL for tracked entities.
//!
//! # Responsibility
//! - Hold one slot per tracked entity: shared handle, column snapshot,
//!   pending state.
//! - Perform per-slot flush work: dirty check, UPDATE, DELETE.
//!
//! # Invariants
//! - Every tracked entity carries an identifier; the slot key is derived
//!   from table name and identifier value.
//! - A snapshot always reflects the last state written to (or read from)
//!   the store.

use crate::model::entity::Entity;
use crate::session::{SessionError, SessionResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Shared handle to an entity tracked by (or detached from) a session.
///
/// Equality is by identity: two handles are equal when they point at the
/// same tracked instance. Borrows taken through `read`/`edit` must be
/// dropped before the session flushes.
pub struct Managed<E: Entity> {
    inner: Rc<RefCell<E>>,
}

impl<E: Entity> Managed<E> {
    pub(crate) fn new(entity: E) -> Self {
        Self {
            inner: Rc::new(RefCell::new(entity)),
        }
    }

    /// Immutable borrow of the underlying entity.
    pub fn read(&self) -> Ref<'_, E> {
        self.inner.borrow()
    }

    /// Mutable borrow of the underlying entity.
    ///
    /// Mutations are propagated at flush time while the handle is
    /// managed; they are lost to the store once detached.
    pub fn edit(&self) -> RefMut<'_, E> {
        self.inner.borrow_mut()
    }

    /// Identifier of the underlying entity.
    pub fn id(&self) -> Option<E::Id> {
        self.inner.borrow().id()
    }

    /// Detached copy of the current in-memory state.
    pub fn snapshot(&self) -> E {
        self.inner.borrow().clone()
    }
}

impl<E: Entity> Clone for Managed<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Entity> PartialEq for Managed<E> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E: Entity> Eq for Managed<E> {}

impl<E: Entity> Debug for Managed<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Managed").field(&self.inner.borrow()).finish()
    }
}

/// Pending state of a tracked slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    Managed,
    Removed,
}

/// Result of flushing one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushOutcome {
    Clean,
    Updated,
    Deleted,
}

/// Object-safe view of a tracked slot, independent of entity type.
pub(crate) trait TrackedSlot {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn table(&self) -> &'static str;
    fn state(&self) -> SlotState;
    fn set_state(&mut self, state: SlotState);
    fn flush(&mut self, conn: &Connection) -> SessionResult<FlushOutcome>;
}

pub(crate) struct Slot<E: Entity> {
    pub(crate) handle: Managed<E>,
    pub(crate) snapshot: Vec<Value>,
    pub(crate) state: SlotState,
    pub(crate) read_only: bool,
}

impl<E: Entity> Slot<E> {
    pub(crate) fn managed(handle: Managed<E>, read_only: bool) -> Self {
        let snapshot = handle.read().values();
        Self {
            handle,
            snapshot,
            state: SlotState::Managed,
            read_only,
        }
    }
}

impl<E: Entity> TrackedSlot for Slot<E> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn table(&self) -> &'static str {
        E::table()
    }

    fn state(&self) -> SlotState {
        self.state
    }

    fn set_state(&mut self, state: SlotState) {
        self.state = state;
    }

    fn flush(&mut self, conn: &Connection) -> SessionResult<FlushOutcome> {
        let id = self
            .handle
            .id()
            .ok_or(SessionError::MissingId { table: E::table() })?;

        match self.state {
            SlotState::Removed => {
                conn.execute(&delete_sql::<E>(), [E::id_value(&id)])?;
                Ok(FlushOutcome::Deleted)
            }
            SlotState::Managed => {
                if self.read_only {
                    return Ok(FlushOutcome::Clean);
                }

                let current = self.handle.read().values();
                if current == self.snapshot {
                    return Ok(FlushOutcome::Clean);
                }

                self.handle.read().validate()?;
                let mut params = current.clone();
                params.push(E::id_value(&id));
                conn.execute(&update_sql::<E>(), params_from_iter(params))?;
                self.snapshot = current;
                Ok(FlushOutcome::Updated)
            }
        }
    }
}

/// Slot key for a table/identifier pair.
pub(crate) fn slot_key(table: &str, id: &Value) -> String {
    let rendered = match id {
        Value::Null => "null".to_string(),
        Value::Integer(value) => format!("i:{value}"),
        Value::Real(value) => format!("r:{value}"),
        Value::Text(value) => format!("t:{value}"),
        Value::Blob(bytes) => {
            let mut hex = String::with_capacity(2 + bytes.len() * 2);
            hex.push_str("b:");
            for byte in bytes {
                hex.push_str(&format!("{byte:02x}"));
            }
            hex
        }
    };
    format!("{table}:{rendered}")
}

pub(crate) fn key_for<E: Entity>(id: &E::Id) -> String {
    slot_key(E::table(), &E::id_value(id))
}

pub(crate) fn select_sql<E: Entity>() -> String {
    format!(
        "SELECT {}, {} FROM {}",
        E::id_column(),
        E::columns().join(", "),
        E::table()
    )
}

pub(crate) fn select_by_id_sql<E: Entity>() -> String {
    format!("{} WHERE {} = ?1;", select_sql::<E>(), E::id_column())
}

pub(crate) fn insert_sql<E: Entity>(with_id: bool) -> String {
    let mut columns: Vec<&str> = Vec::new();
    if with_id {
        columns.push(E::id_column());
    }
    columns.extend_from_slice(E::columns());

    let placeholders: Vec<String> = (1..=columns.len()).map(|n| format!("?{n}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        E::table(),
        columns.join(", "),
        placeholders.join(", ")
    )
}

pub(crate) fn update_sql<E: Entity>() -> String {
    let assignments: Vec<String> = E::columns()
        .iter()
        .enumerate()
        .map(|(index, column)| format!("{column} = ?{}", index + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?{};",
        E::table(),
        assignments.join(", "),
        E::id_column(),
        E::columns().len() + 1
    )
}

pub(crate) fn delete_sql<E: Entity>() -> String {
    format!("DELETE FROM {} WHERE {} = ?1;", E::table(), E::id_column())
}
