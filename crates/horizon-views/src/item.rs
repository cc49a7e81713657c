//! Item handles and the trait that makes a type viewable.
//!
//! Views never copy or own item data. A source hands out [`ItemHandle`]s,
//! shared references compared by identity, and a view stores only source
//! indices plus its own bookkeeping.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, ViewError};
use crate::value::PropertyValue;

/// A compiled property reader.
///
/// Property paths are resolved to accessors once, when a sort or group
/// descriptor is registered, and the closure is called on the hot path.
pub type PropertyAccessor<T> = Arc<dyn Fn(&T) -> PropertyValue + Send + Sync>;

/// Wrap a closure as a [`PropertyAccessor`].
///
/// ```
/// use horizon_views::item::{accessor, PropertyAccessor};
///
/// struct City { name: String }
/// let name: PropertyAccessor<City> = accessor(|c: &City| c.name.clone());
/// assert_eq!(name(&City { name: "Tacoma".into() }).as_str(), Some("Tacoma"));
/// ```
pub fn accessor<T, V, F>(read: F) -> PropertyAccessor<T>
where
    F: Fn(&T) -> V + Send + Sync + 'static,
    V: Into<PropertyValue>,
{
    Arc::new(move |item| read(item).into())
}

/// The kind of value a property produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Boolean values.
    Bool,
    /// Integer values.
    Int,
    /// Floating-point values.
    Float,
    /// Text values.
    String,
    /// Values of varying kind.
    Any,
}

/// Describes one property an item type exposes to views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPropertyInfo {
    /// The property path accepted by descriptors.
    pub name: String,
    /// The kind of value the property produces.
    pub kind: ValueKind,
}

impl ItemPropertyInfo {
    /// Creates a property description.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A type whose values can be shown in a collection view.
///
/// Only [`property_accessor`](Self::property_accessor) is required. The
/// lifecycle hooks default to no-ops; an item type that can roll back edits
/// overrides [`cancel_edit`](Self::cancel_edit) and
/// [`supports_cancel_edit`](Self::supports_cancel_edit).
///
/// During an add transaction the view calls `begin_init` then `begin_edit`
/// on the new item, and `end_edit` then `end_init` when it is committed
/// (`cancel_edit` then `end_init` when cancelled).
pub trait CollectionItem: Send + Sync + 'static {
    /// Resolve a property path to an accessor, or `None` if the path is unknown.
    fn property_accessor(path: &str) -> Option<PropertyAccessor<Self>>
    where
        Self: Sized;

    /// The properties this type exposes.
    fn item_properties() -> Vec<ItemPropertyInfo>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// The value used when the item itself is compared or grouped.
    fn natural_key(&self) -> Option<PropertyValue> {
        None
    }

    /// Called when the item is created by an add transaction.
    fn begin_init(&mut self) {}

    /// Called when the add transaction that created the item ends.
    fn end_init(&mut self) {}

    /// Called when an edit or add transaction starts on the item.
    fn begin_edit(&mut self) {}

    /// Called when the edit is committed.
    fn end_edit(&mut self) {}

    /// Called when the edit is cancelled. Should restore the pre-edit values.
    fn cancel_edit(&mut self) {}

    /// Whether [`cancel_edit`](Self::cancel_edit) actually reverts changes.
    fn supports_cancel_edit(&self) -> bool {
        false
    }
}

/// Resolve a property path for `T`.
///
/// An empty path or `"."` selects the item's natural key.
pub(crate) fn resolve_accessor<T: CollectionItem>(path: &str) -> Result<PropertyAccessor<T>> {
    if path.is_empty() || path == "." {
        return Ok(Arc::new(|item: &T| item.natural_key().unwrap_or_default()));
    }
    T::property_accessor(path)
        .ok_or_else(|| ViewError::configuration(format!("unknown property path '{path}'")))
}

macro_rules! natural_item {
    ($($ty:ty),*) => {
        $(
            impl CollectionItem for $ty {
                fn property_accessor(_path: &str) -> Option<PropertyAccessor<Self>> {
                    None
                }

                fn natural_key(&self) -> Option<PropertyValue> {
                    Some(PropertyValue::from(self.clone()))
                }
            }
        )*
    };
}

natural_item!(String, i64, i32, f64, bool);

/// A shared handle to an item owned by a source collection.
///
/// Handles compare by identity: two handles are equal when they refer to
/// the same element, regardless of the element's contents.
pub struct ItemHandle<T>(Arc<RwLock<T>>);

impl<T> ItemHandle<T> {
    /// Wrap a value in a new handle.
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Lock the item for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    /// Lock the item for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Returns `true` if both handles refer to the same item.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for ItemHandle<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for ItemHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for ItemHandle<T> {}

impl<T> Hash for ItemHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for ItemHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(value) => f.debug_tuple("ItemHandle").field(&*value).finish(),
            None => f.write_str("ItemHandle(<locked>)"),
        }
    }
}

/// An entry of a view's projection.
pub enum ViewItem<T> {
    /// The new-item placeholder.
    Placeholder,
    /// An item from the source.
    Item(ItemHandle<T>),
}

impl<T> ViewItem<T> {
    /// Returns `true` for the new-item placeholder.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ViewItem::Placeholder)
    }

    /// The item handle, or `None` for the placeholder.
    pub fn item(&self) -> Option<&ItemHandle<T>> {
        match self {
            ViewItem::Item(handle) => Some(handle),
            ViewItem::Placeholder => None,
        }
    }

    /// Consumes the entry, returning the item handle if there is one.
    pub fn into_item(self) -> Option<ItemHandle<T>> {
        match self {
            ViewItem::Item(handle) => Some(handle),
            ViewItem::Placeholder => None,
        }
    }
}

impl<T> Clone for ViewItem<T> {
    fn clone(&self) -> Self {
        match self {
            ViewItem::Placeholder => ViewItem::Placeholder,
            ViewItem::Item(handle) => ViewItem::Item(handle.clone()),
        }
    }
}

impl<T> PartialEq for ViewItem<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ViewItem::Placeholder, ViewItem::Placeholder) => true,
            (ViewItem::Item(a), ViewItem::Item(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl<T> Eq for ViewItem<T> {}

impl<T> From<ItemHandle<T>> for ViewItem<T> {
    fn from(handle: ItemHandle<T>) -> Self {
        ViewItem::Item(handle)
    }
}

impl<T> From<&ItemHandle<T>> for ViewItem<T> {
    fn from(handle: &ItemHandle<T>) -> Self {
        ViewItem::Item(handle.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for ViewItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewItem::Placeholder => f.write_str("Placeholder"),
            ViewItem::Item(handle) => handle.fmt(f),
        }
    }
}

static_assertions::assert_impl_all!(ItemHandle<String>: Send, Sync, Clone);
static_assertions::assert_impl_all!(ViewItem<String>: Send, Sync, Clone);
