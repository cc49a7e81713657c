//! Collection views and the stages they are built from.
//!
//! A view turns a source collection into a projection in four steps:
//!
//! - **Filtering**: a predicate or a source-compiled expression decides
//!   which items are shown
//! - **Sorting**: an [`ItemComparer`] built from [`SortDescription`]s
//!   orders them, falling back to source order
//! - **Grouping**: [`GroupDescription`]s nest the items into a group tree
//!   that is flattened depth-first
//! - **Layout**: the new-item placeholder and the item being added are
//!   placed around the result
//!
//! On top of the projection a view keeps a current position and at most
//! one add or edit transaction.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_views::source::{CollectionSource, ObservableList};
//! use horizon_views::view::{CollectionView, CurrentPosition, PlaceholderPosition};
//!
//! let list = Arc::new(ObservableList::new(vec![3_i64, 1, 2]).with_default_factory());
//! let view = CollectionView::new(list.clone());
//! view.set_placeholder_position(PlaceholderPosition::AtEnd).unwrap();
//!
//! assert_eq!(view.count().unwrap(), 4);
//! view.move_current_to_last().unwrap();
//! assert_eq!(view.current_position().unwrap(), CurrentPosition::InRange(3));
//! assert!(view.current_item().unwrap().unwrap().is_placeholder());
//!
//! let added = view.add_new().unwrap();
//! *added.write() = 9;
//! view.commit_new().unwrap();
//! assert_eq!(list.len(), 4);
//! ```
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────┐   changes    ┌──────────────────────────────┐
//! │    Source    │─────────────>│        CollectionView        │
//! │ (Collection- │              │ filter > sort > group > slots│
//! │    Source)   │<─────────────│ currency      transaction    │
//! └──────────────┘  add/remove  └──────────────┬───────────────┘
//!                                              │ signals, listeners
//!                                              v
//!                                          consumers
//! ```

mod comparer;
mod currency;
mod editing;
mod filter;
mod grouping;
mod mapping;
mod projection;

pub use comparer::{ItemComparer, SortDescription, SortDirection};
pub use currency::{
    CurrencyHooks, CurrencyListener, CurrencyTracker, CurrentChanged, CurrentChanging, CurrentPosition, ListenerId,
};
pub use editing::TransactionKind;
pub use filter::FilterStage;
pub use grouping::{Group, GroupDescription, GroupEntry, GroupKeyFn, GroupingStage};
pub use mapping::PlaceholderPosition;
pub use projection::{CollectionView, CollectionViewBuilder, DeferRefresh, Iter, ViewChange, ViewSignals};
