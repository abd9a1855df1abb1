//! Change observation for entities and collections.
//!
//! Mutations go through explicit mutators (`set`, `add`, `remove_*`, ...),
//! each of which produces exactly one notification per written key or index.
//! Listeners only ever see shared references, so they cannot write back into
//! the value that notified them.

use std::fmt;
use std::rc::Rc;

use crate::entity::Entity;
use crate::value::FieldValue;

/// One property write on an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Dotted path of the written key (`"age"`, `"address.city"`).
    pub path: String,
    /// Value before the write, `Undefined` when the key did not exist.
    pub old: FieldValue,
    /// Value after the write, `Undefined` for removals.
    pub new: FieldValue,
}

impl ChangeEvent {
    pub fn new(path: impl Into<String>, old: FieldValue, new: FieldValue) -> Self {
        Self {
            path: path.into(),
            old,
            new,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.new.is_undefined() && !self.old.is_undefined()
    }
}

/// One index-level change of a collection.
#[derive(Debug, Clone, Copy)]
pub enum ListChange<'a> {
    Inserted { index: usize, entity: &'a Entity },
    Replaced { index: usize, entity: &'a Entity },
    /// `index` is the position the element held before removal.
    Removed { index: usize },
}

impl ListChange<'_> {
    pub fn index(&self) -> usize {
        match self {
            ListChange::Inserted { index, .. }
            | ListChange::Replaced { index, .. }
            | ListChange::Removed { index } => *index,
        }
    }
}

pub type UpdateListener = dyn Fn(&ChangeEvent);
pub type ListListener = dyn Fn(&ListChange<'_>);

/// Registered listeners of one entity or collection.
pub(crate) struct Observers<F: ?Sized> {
    listeners: Vec<Rc<F>>,
}

impl<F: ?Sized> Observers<F> {
    pub(crate) fn push(&mut self, listener: Rc<F>) {
        self.listeners.push(listener);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Rc<F>> {
        self.listeners.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<F: ?Sized> Default for Observers<F> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<F: ?Sized> fmt::Debug for Observers<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} listener(s)", self.listeners.len())
    }
}
