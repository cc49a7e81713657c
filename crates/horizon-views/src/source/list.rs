//! List-backed source collection.

use std::sync::Arc;

use parking_lot::RwLock;

use horizon_views_core::logging::targets;

use super::expression::FilterExpression;
use super::{CollectionChange, CollectionSource, FilterFn, SourceCapabilities, SourceSignals};
use crate::error::{Result, ViewError};
use crate::item::{CollectionItem, ItemHandle};

/// Creates the value for a new item during `add_new`.
pub type ItemFactory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// An observable, list-backed source collection.
///
/// Every mutation emits a [`CollectionChange`] after the internal lock has
/// been released, so views observing the list can read it from their
/// handlers.
///
/// # Example
///
/// ```
/// use horizon_views::source::{CollectionSource, ObservableList};
///
/// let list = ObservableList::new(vec!["b".to_string(), "a".to_string()]);
/// list.push("c".to_string());
/// assert_eq!(list.len(), 3);
/// assert_eq!(&*list.get(2).unwrap().read(), "c");
/// ```
pub struct ObservableList<T: CollectionItem> {
    items: RwLock<Vec<ItemHandle<T>>>,
    capabilities: SourceCapabilities,
    factory: Option<ItemFactory<T>>,
    signals: SourceSignals<T>,
}

impl<T: CollectionItem> ObservableList<T> {
    /// Creates a list holding `items`, with every capability except item
    /// creation (see [`with_factory`](Self::with_factory)).
    pub fn new(items: Vec<T>) -> Self {
        Self::from_handles(items.into_iter().map(ItemHandle::new).collect())
    }

    /// Creates an empty list.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Creates a list over existing handles.
    pub fn from_handles(items: Vec<ItemHandle<T>>) -> Self {
        Self {
            items: RwLock::new(items),
            capabilities: SourceCapabilities::all(),
            factory: None,
            signals: SourceSignals::new(),
        }
    }

    /// Sets the factory used to create items for `add_new`.
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Restricts what views may do with this list.
    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Appends a value, returning its handle.
    pub fn push(&self, value: T) -> ItemHandle<T> {
        let handle = ItemHandle::new(value);
        let index = {
            let mut items = self.items.write();
            items.push(handle.clone());
            items.len() - 1
        };
        self.emit(CollectionChange::Added {
            index,
            item: handle.clone(),
        });
        handle
    }

    /// Inserts a value at `index`.
    pub fn insert_value(&self, index: usize, value: T) -> Result<ItemHandle<T>> {
        let handle = ItemHandle::new(value);
        CollectionSource::insert(self, index, handle.clone())?;
        Ok(handle)
    }

    /// Removes the item at `index`.
    pub fn remove(&self, index: usize) -> Option<ItemHandle<T>> {
        CollectionSource::remove_at(self, index).ok()
    }

    /// Removes `item` if present. Returns `true` if it was found.
    pub fn remove_item(&self, item: &ItemHandle<T>) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove(index).is_some(),
            None => false,
        }
    }

    /// Replaces the item at `index` with a new value, returning the old handle.
    pub fn replace(&self, index: usize, value: T) -> Option<ItemHandle<T>> {
        let new = ItemHandle::new(value);
        let old = {
            let mut items = self.items.write();
            let slot = items.get_mut(index)?;
            std::mem::replace(slot, new.clone())
        };
        self.emit(CollectionChange::Replaced {
            index,
            old: old.clone(),
            new,
        });
        Some(old)
    }

    /// Removes every item.
    pub fn clear(&self) {
        self.items.write().clear();
        self.emit(CollectionChange::Reset);
    }

    /// Replaces the whole content.
    pub fn set_items(&self, items: Vec<T>) {
        *self.items.write() = items.into_iter().map(ItemHandle::new).collect();
        self.emit(CollectionChange::Reset);
    }

    /// A snapshot of the current handles.
    pub fn items(&self) -> Vec<ItemHandle<T>> {
        self.items.read().clone()
    }

    fn emit(&self, change: CollectionChange<T>) {
        tracing::trace!(target: targets::SOURCE, change = ?change, "list changed");
        self.signals.collection_changed.emit(change);
    }
}

impl<T: CollectionItem + Default> ObservableList<T> {
    /// Uses `T::default()` to create items for `add_new`.
    pub fn with_default_factory(self) -> Self {
        self.with_factory(T::default)
    }
}

impl<T: CollectionItem> CollectionSource<T> for ObservableList<T> {
    fn len(&self) -> usize {
        self.items.read().len()
    }

    fn get(&self, index: usize) -> Option<ItemHandle<T>> {
        self.items.read().get(index).cloned()
    }

    fn index_of(&self, item: &ItemHandle<T>) -> Option<usize> {
        self.items.read().iter().position(|h| h.ptr_eq(item))
    }

    fn signals(&self) -> &SourceSignals<T> {
        &self.signals
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            can_add_new: self.capabilities.can_add_new && self.factory.is_some(),
            ..self.capabilities
        }
    }

    fn compile_custom_filter(&self, expression: &str) -> Result<FilterFn<T>> {
        if !self.capabilities.can_custom_filter {
            return Err(ViewError::not_supported(
                "this list does not evaluate filter expressions",
            ));
        }
        FilterExpression::parse(expression)?.compile::<T>()
    }

    fn create_item(&self) -> Result<ItemHandle<T>> {
        match &self.factory {
            Some(factory) => Ok(ItemHandle::new(factory())),
            None => Err(ViewError::not_supported("this list has no item factory")),
        }
    }

    fn insert(&self, index: usize, item: ItemHandle<T>) -> Result<()> {
        {
            let mut items = self.items.write();
            if index > items.len() {
                return Err(ViewError::out_of_range(index as isize, items.len()));
            }
            items.insert(index, item.clone());
        }
        self.emit(CollectionChange::Added { index, item });
        Ok(())
    }

    fn remove_at(&self, index: usize) -> Result<ItemHandle<T>> {
        let item = {
            let mut items = self.items.write();
            if index >= items.len() {
                return Err(ViewError::out_of_range(index as isize, items.len()));
            }
            items.remove(index)
        };
        self.emit(CollectionChange::Removed {
            index,
            item: item.clone(),
        });
        Ok(item)
    }
}

static_assertions::assert_impl_all!(ObservableList<String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(list: &ObservableList<String>) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        list.signals().collection_changed.connect(move |change| {
            log_clone.lock().push(format!("{change:?}"));
        });
        log
    }

    fn names(list: &ObservableList<String>) -> Vec<String> {
        list.items().iter().map(|h| h.read().clone()).collect()
    }

    #[test]
    fn test_mutations_emit_changes() {
        let list = ObservableList::new(vec!["a".to_string(), "b".to_string()]);
        let log = recorder(&list);

        list.push("c".to_string());
        list.insert_value(0, "z".to_string()).unwrap();
        list.remove(1);
        list.replace(0, "y".to_string());
        list.clear();

        assert_eq!(
            *log.lock(),
            vec!["Added(2)", "Added(0)", "Removed(1)", "Replaced(0)", "Reset"]
        );
        assert!(list.is_empty());
    }

    #[test]
    fn test_insert_out_of_range() {
        let list = ObservableList::new(vec!["a".to_string()]);
        let err = list.insert_value(5, "x".to_string()).err().unwrap();
        assert_eq!(err, ViewError::OutOfRange { index: 5, count: 1 });
        assert!(list.remove(3).is_none());
        assert_eq!(names(&list), vec!["a"]);
    }

    #[test]
    fn test_remove_item_by_identity() {
        let list = ObservableList::new(vec!["a".to_string(), "b".to_string()]);
        let b = list.get(1).unwrap();
        assert!(list.remove_item(&b));
        assert!(!list.remove_item(&b));
        assert_eq!(names(&list), vec!["a"]);
    }

    #[test]
    fn test_add_capability_needs_factory() {
        let list = ObservableList::<String>::empty();
        assert!(!list.capabilities().can_add_new);
        assert!(list.create_item().is_err());

        let list = list.with_default_factory();
        assert!(list.capabilities().can_add_new);
        assert_eq!(&*list.create_item().unwrap().read(), "");
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_handler_can_read_list() {
        let list = Arc::new(ObservableList::new(vec!["a".to_string()]));
        let seen = Arc::new(Mutex::new(0));
        let list_clone = Arc::downgrade(&list);
        let seen_clone = seen.clone();
        list.signals().collection_changed.connect(move |_| {
            if let Some(list) = list_clone.upgrade() {
                *seen_clone.lock() = list.len();
            }
        });
        list.push("b".to_string());
        assert_eq!(*seen.lock(), 2);
    }
}
