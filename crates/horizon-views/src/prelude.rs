//! Prelude module for Horizon Views.
//!
//! Re-exports the types most programs need:
//!
//! ```
//! use horizon_views::prelude::*;
//! ```
//!
//! This provides access to:
//! - Items and values (`CollectionItem`, `ItemHandle`, `ViewItem`, `PropertyValue`)
//! - Sources (`CollectionSource`, `ObservableList`, `CollectionChange`)
//! - Views and their descriptors (`CollectionView`, `SortDescription`, `GroupDescription`)
//! - Currency (`CurrentPosition`, `CurrencyListener`, `CurrencyHooks`)
//! - Configuration (`ViewSettings`, `ViewRegistry`, `Culture`)

// ============================================================================
// Items
// ============================================================================

pub use crate::item::{CollectionItem, ItemHandle, ItemPropertyInfo, PropertyAccessor, ValueKind, ViewItem, accessor};
pub use crate::PropertyValue;

// ============================================================================
// Sources
// ============================================================================

pub use crate::source::{CollectionChange, CollectionSource, ObservableList, SourceCapabilities};

// ============================================================================
// Views
// ============================================================================

pub use crate::view::{
    CollectionView, CollectionViewBuilder, GroupDescription, GroupEntry, PlaceholderPosition, SortDescription,
    SortDirection, TransactionKind, ViewChange,
};

// ============================================================================
// Currency
// ============================================================================

pub use crate::view::{CurrencyHooks, CurrencyListener, CurrentChanged, CurrentChanging, CurrentPosition};

// ============================================================================
// Configuration and Errors
// ============================================================================

pub use crate::{Culture, ViewError, ViewRegistry, ViewSettings};
