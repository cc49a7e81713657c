//! Add and edit transactions.
//!
//! At most one transaction is open per view. Opening a new one always
//! commits the previous one; removing the subject from the source cancels
//! it without calling the item's hooks.

use horizon_views_core::logging::targets;

use crate::error::{Result, ViewError};
use crate::item::{CollectionItem, ItemHandle};
use crate::view::currency::CurrencyTracker;

/// The state of a view's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionKind {
    /// No transaction is open.
    #[default]
    Idle,
    /// A new item is being added.
    Adding,
    /// An existing item is being edited.
    Editing,
}

pub(crate) enum Transaction<T> {
    Idle,
    Adding {
        item: ItemHandle<T>,
        /// Currency before the add, restored on cancel.
        prior: CurrencyTracker<T>,
        /// Set while the view itself removes the item on cancel.
        cancelling: bool,
    },
    Editing {
        item: ItemHandle<T>,
    },
}

impl<T: CollectionItem> Transaction<T> {
    pub(crate) fn kind(&self) -> TransactionKind {
        match self {
            Transaction::Idle => TransactionKind::Idle,
            Transaction::Adding { .. } => TransactionKind::Adding,
            Transaction::Editing { .. } => TransactionKind::Editing,
        }
    }

    pub(crate) fn adding_item(&self) -> Option<&ItemHandle<T>> {
        match self {
            Transaction::Adding { item, .. } => Some(item),
            _ => None,
        }
    }

    pub(crate) fn editing_item(&self) -> Option<&ItemHandle<T>> {
        match self {
            Transaction::Editing { item } => Some(item),
            _ => None,
        }
    }

    pub(crate) fn subject(&self) -> Option<&ItemHandle<T>> {
        self.adding_item().or_else(|| self.editing_item())
    }

    /// Fails if a transaction is open. Used by operations that change the
    /// shape of the projection.
    pub(crate) fn ensure_idle(&self, operation: &'static str) -> Result<()> {
        match self {
            Transaction::Idle => Ok(()),
            Transaction::Adding { .. } => Err(ViewError::invalid_state(operation, "an item is being added")),
            Transaction::Editing { .. } => Err(ViewError::invalid_state(operation, "an item is being edited")),
        }
    }

    /// Ends the transaction because its subject left the source.
    pub(crate) fn abandon(&mut self) -> Transaction<T> {
        let previous = std::mem::replace(self, Transaction::Idle);
        if previous.kind() != TransactionKind::Idle {
            tracing::debug!(
                target: targets::EDITING,
                kind = ?previous.kind(),
                "transaction subject removed from source, transaction cancelled"
            );
        }
        previous
    }
}

/// Hooks run when an add transaction starts.
pub(crate) fn begin_add<T: CollectionItem>(item: &ItemHandle<T>) {
    let mut value = item.write();
    value.begin_init();
    value.begin_edit();
}

/// Hooks run when an add transaction is committed.
pub(crate) fn commit_add<T: CollectionItem>(item: &ItemHandle<T>) {
    let mut value = item.write();
    value.end_edit();
    value.end_init();
}

/// Hooks run when an add transaction is cancelled.
pub(crate) fn cancel_add<T: CollectionItem>(item: &ItemHandle<T>) {
    let mut value = item.write();
    value.cancel_edit();
    value.end_init();
}
