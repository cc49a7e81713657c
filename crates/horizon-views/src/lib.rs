//! Derived collection views for Horizon Views.
//!
//! This crate projects a mutable source collection into an ordered,
//! filtered and optionally grouped sequence, and layers navigation and
//! editing on top of it:
//!
//! - **Sorting**: sort descriptions over compiled property accessors, with
//!   culture-aware text comparison
//! - **Filtering**: predicates, or custom expressions compiled by the source
//! - **Grouping**: nested groups ordered by first appearance
//! - **Currency**: a current position with cancelable two-phase notifications
//! - **Transactions**: add and edit with commit and cancel
//! - **Deferred refresh**: batch configuration changes into one rebuild
//! - **Registry and settings**: shared default views and declarative
//!   configuration in TOML or JSON
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_views::prelude::*;
//!
//! let list = Arc::new(ObservableList::new(
//!     (0..5).map(|i| format!("Item{i}")).collect::<Vec<_>>(),
//! ));
//! let view = CollectionViewBuilder::new(list.clone())
//!     .sort(SortDescription::descending("."))
//!     .build()
//!     .unwrap();
//!
//! view.move_current_to_first().unwrap();
//! let current = view.current_item().unwrap().unwrap();
//! assert_eq!(&*current.item().unwrap().read(), "Item4");
//!
//! // Changes to the source flow into the view.
//! list.push("Item9".to_string());
//! assert_eq!(view.index_of(&current).unwrap(), Some(1));
//! ```

pub mod culture;
mod error;
pub mod item;
pub mod prelude;
pub mod registry;
pub mod settings;
pub mod source;
mod value;
pub mod view;

#[cfg(test)]
mod test_support;

pub use culture::Culture;
pub use error::{Result, ViewError};
pub use item::{CollectionItem, ItemHandle, ItemPropertyInfo, PropertyAccessor, ValueKind, ViewItem, accessor};
pub use registry::ViewRegistry;
pub use settings::ViewSettings;
pub use value::PropertyValue;

pub use horizon_views_core::{ConnectionGuard, ConnectionId, PerfSpan, Signal};
