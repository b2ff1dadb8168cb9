//! Entity mapping contract.
//!
//! # Responsibility
//! - Define the declarative mapping between an application struct and its
//!   backing table: table name, identifier column, data columns, value
//!   binding and row decoding.
//! - Provide the domain validation hook invoked on every write path.
//!
//! # Invariants
//! - An identifier, once assigned, is immutable for the entity's lifetime.
//! - `values()` must return one value per entry of `columns()`, in order.
//! - Write paths call `validate()` before any SQL mutation.

use rusqlite::types::Value;
use rusqlite::Row;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Declarative mapping for one persistent entity type.
///
/// Implementations choose one of two identifier generation strategies:
/// - *rowid-generated*: leave `id()` as `None` on new instances and
///   override `id_from_rowid` (integer primary keys);
/// - *application-assigned*: populate the identifier at construction
///   (e.g. `Uuid::new_v4`) and keep the default `id_from_rowid`.
pub trait Entity: Clone + Debug + 'static {
    /// Identifier type for this entity.
    type Id: Clone + PartialEq + Debug + 'static;

    /// Backing table name.
    fn table() -> &'static str;

    /// Identifier column name.
    fn id_column() -> &'static str {
        "id"
    }

    /// Data column names, excluding the identifier column.
    fn columns() -> &'static [&'static str];

    /// Current identifier, `None` while the entity is transient.
    fn id(&self) -> Option<Self::Id>;

    /// Stores a freshly generated identifier.
    ///
    /// Called at most once per entity, during `persist`.
    fn set_id(&mut self, id: Self::Id);

    /// Converts an identifier into a bindable SQL value.
    fn id_value(id: &Self::Id) -> Value;

    /// Maps a SQLite rowid to an identifier for rowid-generated entities.
    ///
    /// Returning `None` (the default) means identifiers must be assigned
    /// by the application before `persist`.
    fn id_from_rowid(_rowid: i64) -> Option<Self::Id> {
        None
    }

    /// Current data column values, ordered as `columns()`.
    fn values(&self) -> Vec<Value>;

    /// Decodes one entity from a row selected as `id_column(), columns()`.
    fn from_row(row: &Row<'_>) -> Result<Self, MapError>;

    /// Domain validation hook; the default accepts everything.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Row decoding error for `Entity::from_row` implementations.
#[derive(Debug)]
pub enum MapError {
    Sqlite(rusqlite::Error),
    Invalid(String),
}

impl Display for MapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Invalid(message) => write!(f, "invalid persisted value: {message}"),
        }
    }
}

impl Error for MapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<rusqlite::Error> for MapError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Domain validation failure reported by `Entity::validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity validation failed: {}", self.message)
    }
}

impl Error for ValidationError {}
