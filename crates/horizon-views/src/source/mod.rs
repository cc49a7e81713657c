//! Source collections and the adapter contract views consume.
//!
//! A view does not know what kind of collection it observes. Everything it
//! needs goes through [`CollectionSource`]: positional access, a change
//! signal, and a capability query that decides which view operations are
//! allowed.
//!
//! [`ObservableList`] is the list-backed adapter shipped with the crate.

mod expression;
mod list;

pub use expression::FilterExpression;
pub use list::{ItemFactory, ObservableList};

use std::sync::Arc;

use horizon_views_core::Signal;

use crate::error::{Result, ViewError};
use crate::item::{CollectionItem, ItemHandle};

/// A compiled filter predicate.
pub type FilterFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A change made to a source collection.
pub enum CollectionChange<T> {
    /// `item` was inserted at `index`.
    Added { index: usize, item: ItemHandle<T> },
    /// `item` was removed from `index`.
    Removed { index: usize, item: ItemHandle<T> },
    /// The item at `index` was replaced by `new`.
    Replaced {
        index: usize,
        old: ItemHandle<T>,
        new: ItemHandle<T>,
    },
    /// The collection changed too much to describe.
    Reset,
}

impl<T> Clone for CollectionChange<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Added { index, item } => Self::Added {
                index: *index,
                item: item.clone(),
            },
            Self::Removed { index, item } => Self::Removed {
                index: *index,
                item: item.clone(),
            },
            Self::Replaced { index, old, new } => Self::Replaced {
                index: *index,
                old: old.clone(),
                new: new.clone(),
            },
            Self::Reset => Self::Reset,
        }
    }
}

impl<T> std::fmt::Debug for CollectionChange<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added { index, .. } => write!(f, "Added({index})"),
            Self::Removed { index, .. } => write!(f, "Removed({index})"),
            Self::Replaced { index, .. } => write!(f, "Replaced({index})"),
            Self::Reset => write!(f, "Reset"),
        }
    }
}

/// Signals emitted by a source collection.
pub struct SourceSignals<T: CollectionItem> {
    /// Emitted after the collection changed.
    pub collection_changed: Signal<CollectionChange<T>>,
}

impl<T: CollectionItem> SourceSignals<T> {
    /// Create the signal set.
    pub fn new() -> Self {
        Self {
            collection_changed: Signal::new(),
        }
    }
}

impl<T: CollectionItem> Default for SourceSignals<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// What a source allows views to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCapabilities {
    /// Views may sort.
    pub can_sort: bool,
    /// Views may apply predicate filters.
    pub can_filter: bool,
    /// The source evaluates custom filter expressions.
    pub can_custom_filter: bool,
    /// The source can create and insert new items.
    pub can_add_new: bool,
    /// Items may be edited in place.
    pub can_edit: bool,
    /// Items may be removed.
    pub can_remove: bool,
}

impl SourceCapabilities {
    /// Every capability.
    pub const fn all() -> Self {
        Self {
            can_sort: true,
            can_filter: true,
            can_custom_filter: true,
            can_add_new: true,
            can_edit: true,
            can_remove: true,
        }
    }

    /// Enumeration only.
    pub const fn read_only() -> Self {
        Self {
            can_sort: false,
            can_filter: false,
            can_custom_filter: false,
            can_add_new: false,
            can_edit: false,
            can_remove: false,
        }
    }

    /// Sorting and predicate filtering, no mutation.
    pub const fn shaping_only() -> Self {
        Self {
            can_sort: true,
            can_filter: true,
            ..Self::read_only()
        }
    }
}

impl Default for SourceCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// A collection a view can observe.
///
/// Implementations must emit [`CollectionChange`]s on
/// [`signals().collection_changed`](SourceSignals::collection_changed) after
/// every mutation, with no internal lock held, so that views can read the
/// source from their handlers.
pub trait CollectionSource<T: CollectionItem>: Send + Sync {
    /// Number of items.
    fn len(&self) -> usize;

    /// Returns `true` if the source holds no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The item at `index`.
    fn get(&self, index: usize) -> Option<ItemHandle<T>>;

    /// Position of `item`, compared by identity.
    fn index_of(&self, item: &ItemHandle<T>) -> Option<usize> {
        (0..self.len()).find(|&i| self.get(i).is_some_and(|h| h.ptr_eq(item)))
    }

    /// The change signals of this source.
    fn signals(&self) -> &SourceSignals<T>;

    /// What views may do with this source.
    fn capabilities(&self) -> SourceCapabilities;

    /// Compile a custom filter expression into a predicate.
    fn compile_custom_filter(&self, expression: &str) -> Result<FilterFn<T>> {
        let _ = expression;
        Err(ViewError::not_supported("this source does not evaluate filter expressions"))
    }

    /// Create a new, not yet inserted item.
    fn create_item(&self) -> Result<ItemHandle<T>> {
        Err(ViewError::not_supported("this source cannot create items"))
    }

    /// Insert `item` at `index`.
    fn insert(&self, index: usize, item: ItemHandle<T>) -> Result<()> {
        let _ = (index, item);
        Err(ViewError::not_supported("this source cannot insert items"))
    }

    /// Remove and return the item at `index`.
    fn remove_at(&self, index: usize) -> Result<ItemHandle<T>> {
        let _ = index;
        Err(ViewError::not_supported("this source cannot remove items"))
    }
}
