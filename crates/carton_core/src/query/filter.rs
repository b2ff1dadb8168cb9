//! Predicate and bulk-update specifications.
//!
//! # Responsibility
//! - Build equality/comparison/membership conjunctions over named
//!   attributes.
//! - Build set-based update specifications executed directly against the
//!   store.
//! - Reject unknown or malformed attribute names with a configuration
//!   error before SQL rendering.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Configuration error for query and mapping declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Attribute name does not exist in the entity mapping.
    UnknownAttribute { table: &'static str, attr: String },
    /// Name is not a legal identifier.
    InvalidIdentifier(String),
    /// Entity mapping itself is malformed (empty/duplicate columns).
    InvalidMapping(String),
    /// Bulk update declares no set clauses.
    EmptyUpdate,
    /// Page size must be at least one.
    InvalidPageSize(u32),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAttribute { table, attr } => {
                write!(f, "unknown attribute `{attr}` for table `{table}`")
            }
            Self::InvalidIdentifier(name) => write!(f, "invalid identifier `{name}`"),
            Self::InvalidMapping(message) => write!(f, "invalid entity mapping: {message}"),
            Self::EmptyUpdate => write!(f, "bulk update declares no set clauses"),
            Self::InvalidPageSize(size) => write!(f, "invalid page size {size}"),
        }
    }
}

impl Error for QueryError {}

/// Checks a declared identifier (table or column name).
pub(crate) fn ensure_identifier(name: &str) -> Result<(), QueryError> {
    if IDENT_RE.is_match(name) {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier(name.to_string()))
    }
}

/// Checks that an attribute is the id column or a declared data column.
pub(crate) fn ensure_known_attr(
    table: &'static str,
    id_column: &str,
    columns: &[&str],
    attr: &str,
) -> Result<(), QueryError> {
    ensure_identifier(attr)?;
    if attr == id_column || columns.contains(&attr) {
        Ok(())
    } else {
        Err(QueryError::UnknownAttribute {
            table,
            attr: attr.to_string(),
        })
    }
}

/// Comparison operator for one filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

#[derive(Debug, Clone)]
enum Pred {
    Compare(Op, Value),
    In(Vec<Value>),
}

#[derive(Debug, Clone)]
struct Cond {
    attr: String,
    pred: Pred,
}

/// Conjunction of attribute conditions; the typed counterpart of a
/// derived finder's predicate.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conds: Vec<Cond>,
}

impl Filter {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Starts a filter with one condition.
    pub fn new(attr: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        Self::all().and(attr, op, value)
    }

    /// Starts a filter with one collection-membership condition.
    pub fn is_in(
        attr: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        Self::all().and_in(attr, values)
    }

    /// Adds a conjunctive condition.
    pub fn and(mut self, attr: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        self.conds.push(Cond {
            attr: attr.into(),
            pred: Pred::Compare(op, value.into()),
        });
        self
    }

    /// Adds a conjunctive collection-membership condition, rendered as
    /// `attr IN (...)`. An empty collection matches no row.
    pub fn and_in(
        mut self,
        attr: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        self.conds.push(Cond {
            attr: attr.into(),
            pred: Pred::In(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conds.is_empty()
    }

    pub(crate) fn validate(
        &self,
        table: &'static str,
        id_column: &str,
        columns: &[&str],
    ) -> Result<(), QueryError> {
        for cond in &self.conds {
            ensure_known_attr(table, id_column, columns, &cond.attr)?;
        }
        Ok(())
    }

    /// Renders ` WHERE ...` (or nothing when empty), numbering
    /// placeholders from `*next_param`.
    pub(crate) fn where_clause(&self, next_param: &mut usize) -> (String, Vec<Value>) {
        if self.conds.is_empty() {
            return (String::new(), Vec::new());
        }

        let mut fragments = Vec::with_capacity(self.conds.len());
        let mut params = Vec::new();
        for cond in &self.conds {
            match &cond.pred {
                Pred::Compare(op, value) => {
                    fragments.push(format!("{} {} ?{}", cond.attr, op.sql(), *next_param));
                    *next_param += 1;
                    params.push(value.clone());
                }
                Pred::In(values) => {
                    let mut placeholders = Vec::with_capacity(values.len());
                    for value in values {
                        placeholders.push(format!("?{}", *next_param));
                        *next_param += 1;
                        params.push(value.clone());
                    }
                    // SQLite evaluates an empty IN list to false.
                    fragments.push(format!("{} IN ({})", cond.attr, placeholders.join(", ")));
                }
            }
        }
        (format!(" WHERE {}", fragments.join(" AND ")), params)
    }
}

#[derive(Debug, Clone)]
enum SetOp {
    Assign(Value),
    Increment(i64),
}

/// Set-based update executed directly against the store.
///
/// Bypasses session snapshots entirely; the repository evicts tracked
/// entries of the target table after execution.
#[derive(Debug, Clone)]
pub struct BulkUpdate {
    sets: Vec<(String, SetOp)>,
    filter: Filter,
}

impl BulkUpdate {
    /// Starts a bulk update over the rows matching `filter`.
    pub fn new(filter: Filter) -> Self {
        Self {
            sets: Vec::new(),
            filter,
        }
    }

    /// Assigns a constant value to an attribute.
    pub fn assign(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.push((attr.into(), SetOp::Assign(value.into())));
        self
    }

    /// Adds a signed delta to an integer attribute.
    pub fn increment(mut self, attr: impl Into<String>, delta: i64) -> Self {
        self.sets.push((attr.into(), SetOp::Increment(delta)));
        self
    }

    pub(crate) fn validate(
        &self,
        table: &'static str,
        id_column: &str,
        columns: &[&str],
    ) -> Result<(), QueryError> {
        if self.sets.is_empty() {
            return Err(QueryError::EmptyUpdate);
        }
        for (attr, _) in &self.sets {
            // Identifiers are immutable, so set clauses may only touch
            // data columns; the filter may still reference the id.
            ensure_identifier(attr)?;
            if !columns.contains(&attr.as_str()) {
                return Err(QueryError::UnknownAttribute {
                    table,
                    attr: attr.clone(),
                });
            }
        }
        self.filter.validate(table, id_column, columns)
    }

    /// Renders the full UPDATE statement and its parameters.
    pub(crate) fn render(&self, table: &str) -> (String, Vec<Value>) {
        let mut next_param = 1usize;
        let mut assignments = Vec::with_capacity(self.sets.len());
        let mut params = Vec::new();
        for (attr, set) in &self.sets {
            match set {
                SetOp::Assign(value) => {
                    assignments.push(format!("{attr} = ?{next_param}"));
                    params.push(value.clone());
                }
                SetOp::Increment(delta) => {
                    assignments.push(format!("{attr} = {attr} + ?{next_param}"));
                    params.push(Value::Integer(*delta));
                }
            }
            next_param += 1;
        }

        let (where_sql, where_params) = self.filter.where_clause(&mut next_param);
        params.extend(where_params);
        (
            format!("UPDATE {table} SET {}{where_sql};", assignments.join(", ")),
            params,
        )
    }
}
