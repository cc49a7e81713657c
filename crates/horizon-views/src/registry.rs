//! Default views per source.
//!
//! A [`ViewRegistry`] hands out one shared view per source, so independent
//! consumers of the same collection agree on its sort order, filter and
//! current item. Entries are keyed by source identity and hold only weak
//! references: the registry never keeps a source or a view alive. A default
//! view lives as long as some caller holds it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_views::registry::ViewRegistry;
//! use horizon_views::source::ObservableList;
//!
//! let registry = ViewRegistry::<String>::new();
//! let list = Arc::new(ObservableList::new(vec!["a".to_string()]));
//!
//! let first = registry.default_view(list.clone());
//! let second = registry.default_view(list.clone());
//! assert!(Arc::ptr_eq(&first, &second));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use horizon_views_core::logging::targets;

use crate::error::{Result, ViewError};
use crate::item::CollectionItem;
use crate::source::CollectionSource;
use crate::view::CollectionView;

/// Identity of a source: the address of its allocation.
type SourceKey = usize;

fn key_of<T: CollectionItem>(source: &Arc<dyn CollectionSource<T>>) -> SourceKey {
    Arc::as_ptr(source) as *const () as usize
}

struct Entry<T: CollectionItem> {
    source: Weak<dyn CollectionSource<T>>,
    view: Weak<CollectionView<T>>,
}

impl<T: CollectionItem> Entry<T> {
    /// The view, if both it and the source it was registered for are alive.
    fn live_view(&self, key: SourceKey) -> Option<Arc<CollectionView<T>>> {
        let source = self.source.upgrade()?;
        if key_of(&source) != key {
            return None;
        }
        self.view.upgrade()
    }
}

/// Drops entries whose source or view is gone.
fn prune<T: CollectionItem>(entries: &mut HashMap<SourceKey, Entry<T>>) -> usize {
    let before = entries.len();
    entries.retain(|&key, entry| entry.live_view(key).is_some());
    let purged = before - entries.len();
    if purged > 0 {
        tracing::trace!(target: targets::REGISTRY, purged, "stale default views dropped");
    }
    purged
}

/// Maps sources to their default views.
pub struct ViewRegistry<T: CollectionItem> {
    entries: Mutex<HashMap<SourceKey, Entry<T>>>,
}

impl<T: CollectionItem> Default for ViewRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CollectionItem> ViewRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The default view of `source`, created on first request. Stale
    /// entries are dropped whenever a view is registered.
    pub fn default_view(&self, source: Arc<dyn CollectionSource<T>>) -> Arc<CollectionView<T>> {
        let key = key_of(&source);
        let mut entries = self.entries.lock();
        if let Some(view) = entries.get(&key).and_then(|entry| entry.live_view(key)) {
            return view;
        }

        let view = CollectionView::new(source.clone());
        prune(&mut entries);
        entries.insert(
            key,
            Entry {
                source: Arc::downgrade(&source),
                view: Arc::downgrade(&view),
            },
        );
        tracing::debug!(target: targets::REGISTRY, entries = entries.len(), "default view created");
        view
    }

    /// Makes `view` the default view of its source.
    ///
    /// Returns the previous default view if one was alive.
    pub fn replace(&self, view: &Arc<CollectionView<T>>) -> Option<Arc<CollectionView<T>>> {
        let source = view.source();
        let key = key_of(source);
        let mut entries = self.entries.lock();
        let previous = entries.remove(&key).and_then(|entry| entry.live_view(key));
        prune(&mut entries);
        entries.insert(
            key,
            Entry {
                source: Arc::downgrade(source),
                view: Arc::downgrade(view),
            },
        );
        drop(entries);
        tracing::debug!(target: targets::REGISTRY, "default view replaced");
        previous
    }

    /// Like [`replace`](Self::replace), but fails if `view` does not
    /// observe `source`.
    pub fn replace_for(
        &self,
        source: &Arc<dyn CollectionSource<T>>,
        view: &Arc<CollectionView<T>>,
    ) -> Result<Option<Arc<CollectionView<T>>>> {
        if key_of(source) != key_of(view.source()) {
            return Err(ViewError::argument("the view does not observe this source"));
        }
        Ok(self.replace(view))
    }

    /// Forgets the default view of `source`. Returns `true` if an entry
    /// was removed.
    pub fn remove(&self, source: &Arc<dyn CollectionSource<T>>) -> bool {
        self.entries.lock().remove(&key_of(source)).is_some()
    }

    /// Returns `true` if `source` has a live default view.
    pub fn contains(&self, source: &Arc<dyn CollectionSource<T>>) -> bool {
        let key = key_of(source);
        self.entries
            .lock()
            .get(&key)
            .is_some_and(|entry| entry.live_view(key).is_some())
    }

    /// Drops entries whose source or view is gone. Returns how many were
    /// dropped.
    pub fn purge(&self) -> usize {
        prune(&mut self.entries.lock())
    }

    /// Number of entries, including stale ones not yet dropped.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T: CollectionItem> fmt::Debug for ViewRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewRegistry").field("entries", &self.len()).finish()
    }
}

static_assertions::assert_impl_all!(ViewRegistry<String>: Send, Sync);
