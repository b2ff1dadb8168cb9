//! Sorting and paging types.
//!
//! # Invariants
//! - `has_next` is computed by over-fetching one row; no total count is
//!   taken (content fetch and count are deliberately decoupled).

use serde::{Deserialize, Serialize};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One sort key over a named attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub attr: String,
    pub direction: Direction,
}

impl Sort {
    pub fn asc(attr: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(attr: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            direction: Direction::Desc,
        }
    }
}

/// Bounded slice request: zero-based page number, page size, sort keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub number: u32,
    pub size: u32,
    pub sort: Vec<Sort>,
}

impl PageRequest {
    pub fn of(number: u32, size: u32) -> Self {
        Self {
            number,
            size,
            sort: Vec::new(),
        }
    }

    pub fn sorted(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }
}

/// One page of results plus slice metadata.
#[derive(Debug, Clone)]
pub struct Page<T> {
    content: Vec<T>,
    number: u32,
    size: u32,
    has_next: bool,
}

impl<T> Page<T> {
    pub(crate) fn new(content: Vec<T>, number: u32, size: u32, has_next: bool) -> Self {
        Self {
            content,
            number,
            size,
            has_next,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    /// Requesting page index (zero-based).
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Requested page size (the content may be shorter on the last page).
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Maps page content, keeping slice metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            has_next: self.has_next,
        }
    }
}
