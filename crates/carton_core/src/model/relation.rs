//! Lazy to-one relations.
//!
//! # Responsibility
//! - Model one-to-one / many-to-one references that defer the related
//!   fetch until first access.
//!
//! # Invariants
//! - `load` resolves through the owning session's active transaction;
//!   access after the transaction ended fails with `InactiveContext`.
//! - A resolved target is cached; `unload` drops the cache.

use crate::model::entity::Entity;
use crate::session::{Session, SessionError};
use rusqlite::types::Value;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};

/// Lazy reference to another entity by identifier.
pub struct LazyRef<E: Entity> {
    target: Option<E::Id>,
    cache: RefCell<Option<E>>,
}

impl<E: Entity> LazyRef<E> {
    /// Creates an unresolved reference to the given identifier.
    pub fn to(id: E::Id) -> Self {
        Self {
            target: Some(id),
            cache: RefCell::new(None),
        }
    }

    /// Creates an empty reference (no related row).
    pub fn none() -> Self {
        Self {
            target: None,
            cache: RefCell::new(None),
        }
    }

    /// Creates an already-resolved reference from a loaded entity.
    ///
    /// The entity must carry its identifier.
    pub fn loaded(entity: E) -> Self {
        Self {
            target: entity.id(),
            cache: RefCell::new(Some(entity)),
        }
    }

    /// Target identifier, if any.
    pub fn id(&self) -> Option<&E::Id> {
        self.target.as_ref()
    }

    /// Whether the target has been fetched (or was set eagerly).
    pub fn is_loaded(&self) -> bool {
        self.cache.borrow().is_some()
    }

    /// Bindable SQL value for the foreign key column.
    pub fn fk_value(&self) -> Value {
        match &self.target {
            Some(id) => E::id_value(id),
            None => Value::Null,
        }
    }

    /// Resolves the target, fetching it on first access.
    ///
    /// Requires an active transaction on `session`; a cleared tracking
    /// context is fine, the target is simply re-fetched.
    pub fn load(&self, session: &Session) -> Result<Option<E>, SessionError> {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return Ok(Some(cached.clone()));
        }
        let Some(id) = &self.target else {
            return Ok(None);
        };
        match session.find::<E>(id)? {
            Some(handle) => {
                let entity = handle.read().clone();
                *self.cache.borrow_mut() = Some(entity.clone());
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    /// Drops the cached target; the next `load` fetches again.
    pub fn unload(&self) {
        *self.cache.borrow_mut() = None;
    }
}

impl<E: Entity> Clone for LazyRef<E> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            cache: RefCell::new(self.cache.borrow().clone()),
        }
    }
}

impl<E: Entity> PartialEq for LazyRef<E> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl<E: Entity> Debug for LazyRef<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyRef")
            .field("target", &self.target)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
