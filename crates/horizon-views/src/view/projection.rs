//! The collection view.
//!
//! A [`CollectionView`] observes a [`CollectionSource`] and maintains a
//! filtered, sorted and optionally grouped projection of it, a current
//! position over that projection, and at most one add or edit transaction.
//!
//! The view keeps a mirror of the source's item handles and stores source
//! indices in its mapping. Single changes reported by the source are
//! applied incrementally; descriptor changes, resets and deferred refreshes
//! rebuild the projection.
//!
//! # Reentrancy
//!
//! Filter predicates, property accessors and group key extractors run while
//! the view recomputes. Reads attempted from them fail with
//! [`ViewError::InvalidState`], and source changes they cause are queued
//! and applied by a full refresh once the recomputation is done. Signal
//! slots and currency listeners run with no view lock held and may call
//! back into the view freely.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_views::source::ObservableList;
//! use horizon_views::view::{CollectionView, SortDescription};
//!
//! let list = Arc::new(ObservableList::new(vec![
//!     "pear".to_string(),
//!     "apple".to_string(),
//!     "fig".to_string(),
//! ]));
//! let view = CollectionView::new(list.clone());
//! view.add_sort_description(SortDescription::ascending(".")).unwrap();
//!
//! let names: Vec<String> = view
//!     .iter()
//!     .unwrap()
//!     .filter_map(|entry| entry.item().map(|h| h.read().clone()))
//!     .collect();
//! assert_eq!(names, ["apple", "fig", "pear"]);
//!
//! list.push("banana".to_string());
//! assert_eq!(view.index_of(&view.item_at(1).unwrap()).unwrap(), Some(1));
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use horizon_views_core::logging::{span_names, targets};
use horizon_views_core::{ConnectionId, PerfSpan, Signal};

use crate::culture::Culture;
use crate::error::{Result, ViewError};
use crate::item::{CollectionItem, ItemHandle, ItemPropertyInfo, ViewItem};
use crate::settings::ViewSettings;
use crate::source::{CollectionChange, CollectionSource, FilterFn, SourceCapabilities};
use crate::value::PropertyValue;

use super::comparer::{ItemComparer, SortDescription};
use super::currency::{
    CurrencyListener, CurrencyListeners, CurrencyTracker, CurrentChanged, CurrentChanging, CurrentPosition,
    ListenerId, MoveRequest,
};
use super::editing::{self, Transaction, TransactionKind};
use super::filter::FilterStage;
use super::grouping::{GroupDescription, GroupEntry, GroupingStage};
use super::mapping::{PlaceholderPosition, Slot, ViewMapping};

/// A change to the projection, in view positions.
pub enum ViewChange<T> {
    /// An entry appeared at `index`.
    Added { index: usize, item: ViewItem<T> },
    /// The entry at `index` went away.
    Removed { index: usize, item: ViewItem<T> },
    /// The projection changed too much to describe; re-read it.
    Reset,
}

impl<T> Clone for ViewChange<T> {
    fn clone(&self) -> Self {
        match self {
            ViewChange::Added { index, item } => ViewChange::Added {
                index: *index,
                item: item.clone(),
            },
            ViewChange::Removed { index, item } => ViewChange::Removed {
                index: *index,
                item: item.clone(),
            },
            ViewChange::Reset => ViewChange::Reset,
        }
    }
}

impl<T> fmt::Debug for ViewChange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewChange::Added { index, .. } => write!(f, "Added({index})"),
            ViewChange::Removed { index, .. } => write!(f, "Removed({index})"),
            ViewChange::Reset => f.write_str("Reset"),
        }
    }
}

/// Signals emitted by a view.
pub struct ViewSignals<T: CollectionItem> {
    /// Emitted after the projection changed.
    pub collection_changed: Signal<ViewChange<T>>,
}

impl<T: CollectionItem> ViewSignals<T> {
    fn new() -> Self {
        Self {
            collection_changed: Signal::new(),
        }
    }
}

/// How currency is re-established after the projection changed.
enum Reanchor<T> {
    /// Follow the current entry; if it left, land on a neighbour or
    /// before the first entry.
    Refresh,
    /// Like `Refresh`, but land after the last entry if nothing is left.
    Removed,
    /// Move before the first entry unless the reset policy keeps the
    /// current entry.
    Reset,
    /// Return to a remembered state.
    Restore(CurrencyTracker<T>),
}

/// What an operation has to announce once the state lock is released.
struct Outcome<T> {
    changes: Vec<ViewChange<T>>,
    currency: Option<CurrentChanged<T>>,
}

impl<T> Outcome<T> {
    fn none() -> Self {
        Self {
            changes: Vec::new(),
            currency: None,
        }
    }
}

fn fetch<T: CollectionItem>(source: &dyn CollectionSource<T>) -> Vec<ItemHandle<T>> {
    (0..source.len()).filter_map(|i| source.get(i)).collect()
}

/// Total order over source indices: the comparer, then source position.
fn index_order<'a, T: CollectionItem>(
    comparer: &'a ItemComparer<T>,
    items: &'a [ItemHandle<T>],
) -> impl Fn(usize, usize) -> Ordering + 'a {
    move |a, b| comparer.compare_handles(&items[a], &items[b]).then(a.cmp(&b))
}

/// Describes one entry moving from `old` to `new` positions.
fn describe<T>(
    old: &[usize],
    removed: Option<ViewItem<T>>,
    new: &[usize],
    added: Option<ViewItem<T>>,
) -> Vec<ViewChange<T>> {
    if old.len() > 1 || new.len() > 1 {
        return vec![ViewChange::Reset];
    }
    if old == new && removed == added {
        return Vec::new();
    }
    let mut changes = Vec::with_capacity(2);
    if let (Some(&index), Some(item)) = (old.first(), removed) {
        changes.push(ViewChange::Removed { index, item });
    }
    if let (Some(&index), Some(item)) = (new.first(), added) {
        changes.push(ViewChange::Added { index, item });
    }
    changes
}

fn currency_moved<T>(before: &CurrencyTracker<T>, after: &CurrencyTracker<T>) -> bool {
    match (before.item(), after.item()) {
        (Some(a), Some(b)) => a != b,
        (None, None) => before.position() != after.position(),
        _ => true,
    }
}

struct ViewState<T: CollectionItem> {
    items: Vec<ItemHandle<T>>,
    comparer: ItemComparer<T>,
    filter: FilterStage<T>,
    grouping: GroupingStage<T>,
    mapping: ViewMapping,
    currency: CurrencyTracker<T>,
    transaction: Transaction<T>,
    restore_current_on_reset: bool,
    defer_depth: usize,
    pending_requests: usize,
    /// Bumped whenever the layout or currency changes.
    generation: u64,
}

impl<T: CollectionItem> ViewState<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            comparer: ItemComparer::new(),
            filter: FilterStage::new(),
            grouping: GroupingStage::new(),
            mapping: ViewMapping::default(),
            currency: CurrencyTracker::new(),
            transaction: Transaction::Idle,
            restore_current_on_reset: false,
            defer_depth: 0,
            pending_requests: 0,
            generation: 0,
        }
    }

    fn entry(&self, slot: Slot) -> Option<ViewItem<T>> {
        match slot {
            Slot::Placeholder => Some(ViewItem::Placeholder),
            Slot::Source(index) => self.items.get(index).cloned().map(ViewItem::Item),
        }
    }

    fn entry_at(&self, position: usize) -> Option<ViewItem<T>> {
        self.mapping.slot(position).and_then(|slot| self.entry(slot))
    }

    fn source_index(&self, item: &ItemHandle<T>) -> Option<usize> {
        self.items.iter().position(|h| h.ptr_eq(item))
    }

    fn position_of(&self, entry: &ViewItem<T>, near: Option<usize>) -> Option<usize> {
        match entry {
            ViewItem::Placeholder => self.mapping.placeholder_slot(),
            ViewItem::Item(item) => self
                .source_index(item)
                .and_then(|index| self.mapping.position_near(index, near)),
        }
    }

    /// The slot currency may not land on: the placeholder, while an item
    /// is being added.
    fn avoided_slot(&self) -> Option<usize> {
        match self.transaction.kind() {
            TransactionKind::Adding => self.mapping.placeholder_slot(),
            _ => None,
        }
    }

    fn relayout(&mut self) {
        if self.grouping.is_active() {
            let body = self.grouping.flatten();
            self.mapping.rebuild_slots(&body);
        } else {
            let body = std::mem::take(&mut self.mapping.sorted);
            self.mapping.rebuild_slots(&body);
            self.mapping.sorted = body;
        }
        self.generation += 1;
    }

    /// Recomputes filter, order and groups from the mirrored items.
    fn rebuild(&mut self) {
        let _perf = PerfSpan::new(span_names::REBUILD);
        self.mapping.new_item = self
            .transaction
            .adding_item()
            .and_then(|item| self.items.iter().position(|h| h.ptr_eq(item)));

        let new_item = self.mapping.new_item;
        let mut visible: Vec<usize> = (0..self.items.len())
            .filter(|&i| Some(i) != new_item && self.filter.passes_handle(&self.items[i]))
            .collect();
        if !self.comparer.is_unordered() {
            let order = index_order(&self.comparer, &self.items);
            visible.sort_by(|&a, &b| order(a, b));
        }

        if self.grouping.is_active() {
            let _perf = PerfSpan::new(span_names::REGROUP);
            let paths: HashMap<usize, Vec<Vec<PropertyValue>>> = visible
                .iter()
                .map(|&i| (i, self.grouping.key_path(&self.items[i].read())))
                .collect();
            self.grouping
                .rebuild(&visible, &|i| paths.get(&i).cloned().unwrap_or_default());
        } else {
            self.grouping.rebuild(&[], &|_| Vec::new());
        }

        self.mapping.sorted = visible;
        self.relayout();
        tracing::debug!(
            target: targets::PROJECTION,
            items = self.items.len(),
            visible = self.mapping.len(),
            "projection rebuilt"
        );
    }

    /// Places a source index that is not yet in the projection.
    fn insert_visible(&mut self, index: usize) {
        if !self.filter.passes_handle(&self.items[index]) {
            return;
        }
        let order = index_order(&self.comparer, &self.items);
        self.mapping.insert_sorted(index, &order);
        if self.grouping.is_active() {
            let path = self.grouping.key_path(&self.items[index].read());
            self.grouping.insert(index, &path, &order);
        }
    }

    fn withdraw(&mut self, index: usize) {
        if self.mapping.new_item == Some(index) {
            self.mapping.new_item = None;
        }
        self.mapping.remove_sorted(index);
        let order = index_order(&self.comparer, &self.items);
        self.grouping.remove_index(index, &order);
    }

    /// Groups that moved carry whole blocks of entries with them, which
    /// only a reset describes.
    fn regrouped_or(&mut self, changes: Vec<ViewChange<T>>) -> Vec<ViewChange<T>> {
        if self.grouping.take_moved() {
            vec![ViewChange::Reset]
        } else {
            changes
        }
    }

    /// Drops a transaction whose subject is no longer in the source.
    fn reconcile_transaction(&mut self) {
        let orphaned = self
            .transaction
            .subject()
            .is_some_and(|subject| self.source_index(subject).is_none());
        if orphaned {
            self.transaction.abandon();
        }
    }

    /// The real item closest to `index`, looking forward first.
    fn nearest_item(&self, index: usize) -> Option<usize> {
        let len = self.mapping.len();
        if len == 0 {
            return None;
        }
        let start = index.min(len - 1);
        (start..len)
            .chain((0..start).rev())
            .find(|&p| matches!(self.mapping.slot(p), Some(Slot::Source(_))))
    }

    fn reanchor(&mut self, before: &CurrencyTracker<T>, policy: &Reanchor<T>) {
        let target = match policy {
            Reanchor::Restore(prior) => prior,
            _ => before,
        };
        let old_index = target.position().index();
        let keep_identity = !matches!(policy, Reanchor::Reset) || self.restore_current_on_reset;

        let (position, item) = match target.item() {
            None => match policy {
                Reanchor::Reset => (CurrentPosition::BeforeFirst, None),
                _ => (target.position(), None),
            },
            Some(entry) => {
                let found = keep_identity
                    .then(|| self.position_of(entry, old_index))
                    .flatten();
                match found {
                    Some(position) => (CurrentPosition::InRange(position), Some(entry.clone())),
                    None => {
                        let nearest = match policy {
                            Reanchor::Reset => None,
                            _ => old_index.and_then(|i| self.nearest_item(i)),
                        };
                        match nearest {
                            Some(position) => (CurrentPosition::InRange(position), self.entry_at(position)),
                            None if matches!(policy, Reanchor::Removed) => (CurrentPosition::AfterLast, None),
                            None => (CurrentPosition::BeforeFirst, None),
                        }
                    }
                }
            }
        };
        self.currency.set(position, item);
    }

    fn finish(&mut self, before: &CurrencyTracker<T>, changes: Vec<ViewChange<T>>, pending: usize) -> Outcome<T> {
        let currency = currency_moved(before, &self.currency).then(|| {
            self.generation += 1;
            tracing::debug!(
                target: targets::CURRENCY,
                position = ?self.currency.position(),
                "currency reassigned"
            );
            CurrentChanged {
                item: self.currency.item().cloned(),
                position: self.currency.position(),
                pending_requests: pending,
            }
        });
        Outcome { changes, currency }
    }

    /// Full rebuild, optionally re-reading the source first.
    fn refresh(&mut self, source: Option<&dyn CollectionSource<T>>, policy: Reanchor<T>, pending: usize) -> Outcome<T> {
        let before = self.currency.clone();
        if let Some(source) = source {
            self.items = fetch(source);
            self.reconcile_transaction();
        }
        self.rebuild();
        self.reanchor(&before, &policy);
        self.finish(&before, vec![ViewChange::Reset], pending)
    }

    fn apply(&mut self, change: &CollectionChange<T>, source: &dyn CollectionSource<T>) -> Outcome<T> {
        tracing::trace!(target: targets::PROJECTION, ?change, "source changed");
        match change {
            CollectionChange::Added { index, item } if *index <= self.items.len() => {
                self.source_added(*index, item)
            }
            CollectionChange::Removed { index, item }
                if self.items.get(*index).is_some_and(|h| h.ptr_eq(item)) =>
            {
                self.source_removed(*index, item)
            }
            CollectionChange::Replaced { index, old, new }
                if self.items.get(*index).is_some_and(|h| h.ptr_eq(old)) =>
            {
                self.source_replaced(*index, old, new)
            }
            CollectionChange::Reset => self.refresh(Some(source), Reanchor::Reset, 0),
            _ => {
                tracing::warn!(
                    target: targets::PROJECTION,
                    ?change,
                    "change does not match the mirrored items, rebuilding"
                );
                self.refresh(Some(source), Reanchor::Refresh, 0)
            }
        }
    }

    fn source_added(&mut self, index: usize, item: &ItemHandle<T>) -> Outcome<T> {
        let before = self.currency.clone();
        self.items.insert(index, item.clone());
        self.mapping.shift_inserted(index);
        self.grouping.shift_inserted(index);
        if self.transaction.adding_item().is_some_and(|a| a.ptr_eq(item)) {
            self.mapping.new_item = Some(index);
        } else {
            self.insert_visible(index);
        }
        self.relayout();

        let positions = self.mapping.positions_of(index);
        let changes = describe(&[], None, &positions, Some(ViewItem::Item(item.clone())));
        let changes = self.regrouped_or(changes);
        self.reanchor(&before, &Reanchor::Refresh);
        self.finish(&before, changes, 0)
    }

    fn source_removed(&mut self, index: usize, item: &ItemHandle<T>) -> Outcome<T> {
        let before = self.currency.clone();
        let old_positions = self.mapping.positions_of(index);

        let mut policy = Reanchor::Removed;
        if self.transaction.subject().is_some_and(|s| s.ptr_eq(item)) {
            match &self.transaction {
                Transaction::Adding {
                    prior,
                    cancelling: true,
                    ..
                } => {
                    policy = Reanchor::Restore(prior.clone());
                    self.transaction = Transaction::Idle;
                }
                _ => {
                    self.transaction.abandon();
                }
            }
        }

        self.withdraw(index);
        self.items.remove(index);
        self.mapping.shift_removed(index);
        self.grouping.shift_removed(index);
        self.relayout();

        let changes = describe(&old_positions, Some(ViewItem::Item(item.clone())), &[], None);
        let changes = self.regrouped_or(changes);
        self.reanchor(&before, &policy);
        self.finish(&before, changes, 0)
    }

    fn source_replaced(&mut self, index: usize, old: &ItemHandle<T>, new: &ItemHandle<T>) -> Outcome<T> {
        let before = self.currency.clone();
        let old_positions = self.mapping.positions_of(index);
        if self.transaction.subject().is_some_and(|s| s.ptr_eq(old)) {
            self.transaction.abandon();
        }

        self.withdraw(index);
        self.items[index] = new.clone();
        self.insert_visible(index);
        self.relayout();

        let new_positions = self.mapping.positions_of(index);
        let changes = describe(
            &old_positions,
            Some(ViewItem::Item(old.clone())),
            &new_positions,
            Some(ViewItem::Item(new.clone())),
        );
        let changes = self.regrouped_or(changes);

        let was_current = before.item().and_then(ViewItem::item).is_some_and(|h| h.ptr_eq(old));
        if was_current {
            match self.mapping.position_near(index, before.position().index()) {
                Some(position) => self
                    .currency
                    .set(CurrentPosition::InRange(position), Some(ViewItem::Item(new.clone()))),
                None => self.reanchor(&before, &Reanchor::Removed),
            }
        } else {
            self.reanchor(&before, &Reanchor::Refresh);
        }
        self.finish(&before, changes, 0)
    }

    /// Moves a committed item to where filter, order and groups put it.
    fn reposition(&mut self, item: &ItemHandle<T>) -> Outcome<T> {
        let before = self.currency.clone();
        let Some(index) = self.source_index(item) else {
            return Outcome::none();
        };
        let old_positions = self.mapping.positions_of(index);
        self.withdraw(index);
        self.insert_visible(index);
        self.relayout();

        let new_positions = self.mapping.positions_of(index);
        let entry = ViewItem::Item(item.clone());
        let changes = describe(&old_positions, Some(entry.clone()), &new_positions, Some(entry));
        let changes = self.regrouped_or(changes);
        self.reanchor(&before, &Reanchor::Removed);
        self.finish(&before, changes, 0)
    }
}

/// Write access to the state. Marks the view as recomputing while held.
struct StateGuard<'a, T: CollectionItem> {
    state: RwLockWriteGuard<'a, ViewState<T>>,
    recomputing: &'a AtomicBool,
}

impl<T: CollectionItem> Deref for StateGuard<'_, T> {
    type Target = ViewState<T>;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl<T: CollectionItem> DerefMut for StateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

impl<T: CollectionItem> Drop for StateGuard<'_, T> {
    fn drop(&mut self) {
        self.recomputing.store(false, AtomicOrdering::Release);
    }
}

/// A filtered, sorted and grouped view over a collection source.
///
/// Views are created behind an [`Arc`] so the source can notify them
/// through a weak reference; dropping the last handle disconnects the view.
pub struct CollectionView<T: CollectionItem> {
    source: Arc<dyn CollectionSource<T>>,
    state: RwLock<ViewState<T>>,
    recomputing: AtomicBool,
    refresh_pending: AtomicBool,
    listeners: CurrencyListeners<T>,
    signals: ViewSignals<T>,
    connection: ConnectionId,
}

static_assertions::assert_impl_all!(CollectionView<String>: Send, Sync);

impl<T: CollectionItem> CollectionView<T> {
    /// Creates a view showing every item of `source` in source order.
    pub fn new(source: Arc<dyn CollectionSource<T>>) -> Arc<Self> {
        let view = Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let connection = source.signals().collection_changed.connect(move |change| {
                if let Some(view) = weak.upgrade() {
                    view.on_source_changed(change);
                }
            });
            Self {
                source,
                state: RwLock::new(ViewState::new()),
                recomputing: AtomicBool::new(false),
                refresh_pending: AtomicBool::new(false),
                listeners: CurrencyListeners::new(),
                signals: ViewSignals::new(),
                connection,
            }
        });
        {
            let mut state = view.lock_state();
            state.items = fetch(&*view.source);
            state.rebuild();
        }
        view.flush_pending();
        view
    }

    /// The source this view observes.
    pub fn source(&self) -> &Arc<dyn CollectionSource<T>> {
        &self.source
    }

    /// Signals emitted by this view.
    pub fn signals(&self) -> &ViewSignals<T> {
        &self.signals
    }

    // -- state access ---------------------------------------------------

    fn lock_state(&self) -> StateGuard<'_, T> {
        let state = self.state.write();
        self.recomputing.store(true, AtomicOrdering::Release);
        StateGuard {
            state,
            recomputing: &self.recomputing,
        }
    }

    fn ensure_not_recomputing(&self, operation: &'static str) -> Result<()> {
        if self.recomputing.load(AtomicOrdering::Acquire) {
            return Err(ViewError::invalid_state(operation, "the view is being recomputed"));
        }
        Ok(())
    }

    /// Read access for projection queries, which are stale while a
    /// deferred refresh is open.
    fn read_state(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, ViewState<T>>> {
        self.ensure_not_recomputing(operation)?;
        let state = self.state.read();
        if state.defer_depth > 0 {
            return Err(ViewError::invalid_state(operation, "a deferred refresh is open"));
        }
        Ok(state)
    }

    /// Read access for configuration and transaction queries, which stay
    /// valid while a deferred refresh is open.
    fn read_config(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, ViewState<T>>> {
        self.ensure_not_recomputing(operation)?;
        Ok(self.state.read())
    }

    /// Write access for transactions and currency changes.
    fn lock_live(&self, operation: &'static str) -> Result<StateGuard<'_, T>> {
        self.ensure_not_recomputing(operation)?;
        let state = self.lock_state();
        if state.defer_depth > 0 {
            return Err(ViewError::invalid_state(operation, "a deferred refresh is open"));
        }
        Ok(state)
    }

    fn deliver(&self, outcome: Outcome<T>) {
        if let Some(changed) = &outcome.currency {
            let changing = CurrentChanging {
                candidate: changed.item.clone(),
                candidate_position: changed.position,
                pending_requests: changed.pending_requests,
                is_cancelable: false,
            };
            self.listeners.query_changing(&changing);
        }
        for change in outcome.changes {
            self.signals.collection_changed.emit(change);
        }
        if let Some(changed) = &outcome.currency {
            self.listeners.notify_changed(changed);
        }
    }

    /// Runs the refreshes queued by source changes that arrived while the
    /// view was recomputing.
    fn flush_pending(&self) {
        while self.refresh_pending.swap(false, AtomicOrdering::AcqRel) {
            let outcome = {
                let mut state = self.lock_state();
                if state.defer_depth > 0 {
                    state.pending_requests += 1;
                    None
                } else {
                    Some(state.refresh(Some(&*self.source), Reanchor::Refresh, 0))
                }
            };
            if let Some(outcome) = outcome {
                self.deliver(outcome);
            }
        }
    }

    fn on_source_changed(&self, change: &CollectionChange<T>) {
        if self.recomputing.load(AtomicOrdering::Acquire) {
            tracing::warn!(
                target: targets::PROJECTION,
                ?change,
                "source changed while the view was recomputing, refresh queued"
            );
            self.refresh_pending.store(true, AtomicOrdering::Release);
            return;
        }
        let outcome = {
            let mut state = self.lock_state();
            if state.defer_depth > 0 {
                state.pending_requests += 1;
                return;
            }
            state.apply(change, &*self.source)
        };
        self.deliver(outcome);
        self.flush_pending();
    }

    /// Applies a shape change and rebuilds, or counts it while deferred.
    fn reshape<R>(
        &self,
        operation: &'static str,
        mutate: impl FnOnce(&mut ViewState<T>) -> Result<R>,
    ) -> Result<R> {
        self.ensure_not_recomputing(operation)?;
        let (result, outcome) = {
            let mut state = self.lock_state();
            state.transaction.ensure_idle(operation)?;
            let result = mutate(&mut *state)?;
            let outcome = if state.defer_depth > 0 {
                state.pending_requests += 1;
                None
            } else {
                Some(state.refresh(None, Reanchor::Refresh, 0))
            };
            (result, outcome)
        };
        if let Some(outcome) = outcome {
            self.deliver(outcome);
        }
        self.flush_pending();
        Ok(result)
    }

    // -- configuration --------------------------------------------------

    /// Adds a sort description after the existing ones.
    pub fn add_sort_description(&self, description: SortDescription) -> Result<()> {
        self.require(self.can_sort(), "this source cannot be sorted")?;
        self.reshape("add_sort_description", |state| state.comparer.push(description))
    }

    /// Replaces every sort description. Nothing changes if any is invalid.
    pub fn set_sort_descriptions(&self, descriptions: Vec<SortDescription>) -> Result<()> {
        self.require(self.can_sort(), "this source cannot be sorted")?;
        self.reshape("set_sort_descriptions", |state| state.comparer.set(descriptions))
    }

    /// Removes every sort description, restoring source order.
    pub fn clear_sort_descriptions(&self) -> Result<()> {
        self.reshape("clear_sort_descriptions", |state| {
            state.comparer.clear();
            Ok(())
        })
    }

    /// The active sort descriptions.
    pub fn sort_descriptions(&self) -> Result<Vec<SortDescription>> {
        Ok(self.read_config("sort_descriptions")?.comparer.descriptions())
    }

    /// Shows only items for which `predicate` returns `true`.
    pub fn set_filter<F>(&self, predicate: F) -> Result<()>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.set_filter_fn(Arc::new(predicate))
    }

    fn set_filter_fn(&self, predicate: FilterFn<T>) -> Result<()> {
        self.require(self.can_filter(), "this source cannot be filtered")?;
        self.reshape("set_filter", |state| state.filter.set_predicate(predicate))
    }

    /// Removes the filter predicate.
    pub fn clear_filter(&self) -> Result<()> {
        self.reshape("clear_filter", |state| {
            state.filter.clear_predicate();
            Ok(())
        })
    }

    /// Returns `true` if a filter predicate is set.
    pub fn has_filter(&self) -> Result<bool> {
        Ok(self.read_config("has_filter")?.filter.has_predicate())
    }

    /// Filters by an expression the source compiles, such as
    /// `State = 'WA' AND Population > 100000`.
    pub fn set_custom_filter(&self, expression: &str) -> Result<()> {
        self.require(self.can_custom_filter(), "this source does not evaluate filter expressions")?;
        self.ensure_not_recomputing("set_custom_filter")?;
        let compiled = self.source.compile_custom_filter(expression)?;
        self.reshape("set_custom_filter", |state| state.filter.set_expression(expression, compiled))
    }

    /// Removes the custom filter expression.
    pub fn clear_custom_filter(&self) -> Result<()> {
        self.reshape("clear_custom_filter", |state| {
            state.filter.clear_expression();
            Ok(())
        })
    }

    /// The custom filter expression, if one is set.
    pub fn custom_filter(&self) -> Result<Option<String>> {
        Ok(self
            .read_config("custom_filter")?
            .filter
            .custom_expression()
            .map(str::to_string))
    }

    /// Adds an innermost grouping level.
    pub fn add_group_description(&self, description: GroupDescription<T>) -> Result<()> {
        self.reshape("add_group_description", |state| {
            state.grouping.push(description);
            Ok(())
        })
    }

    /// Removes the grouping level at `index`.
    pub fn remove_group_description(&self, index: usize) -> Result<Option<GroupDescription<T>>> {
        self.reshape("remove_group_description", |state| Ok(state.grouping.remove(index)))
    }

    /// Removes every grouping level.
    pub fn clear_group_descriptions(&self) -> Result<()> {
        self.reshape("clear_group_descriptions", |state| {
            state.grouping.clear();
            Ok(())
        })
    }

    /// The grouping levels, outermost first.
    pub fn group_descriptions(&self) -> Result<Vec<GroupDescription<T>>> {
        Ok(self.read_config("group_descriptions")?.grouping.descriptions().to_vec())
    }

    /// The culture used to compare text.
    pub fn culture(&self) -> Result<Culture> {
        Ok(self.read_config("culture")?.comparer.culture().clone())
    }

    /// Changes the culture, resorting the projection.
    pub fn set_culture(&self, culture: Culture) -> Result<()> {
        self.reshape("set_culture", |state| {
            state.comparer.set_culture(culture);
            Ok(())
        })
    }

    /// Returns `true` if items are ordered by their natural key when no
    /// sort description is set.
    pub fn natural_ordering(&self) -> Result<bool> {
        Ok(self.read_config("natural_ordering")?.comparer.natural_ordering())
    }

    /// Enables or disables natural ordering.
    pub fn set_natural_ordering(&self, enabled: bool) -> Result<()> {
        self.reshape("set_natural_ordering", |state| {
            state.comparer.set_natural_ordering(enabled);
            Ok(())
        })
    }

    /// Returns `true` if a source reset keeps the current item when it
    /// survives the reset.
    pub fn restore_current_on_reset(&self) -> Result<bool> {
        Ok(self.read_config("restore_current_on_reset")?.restore_current_on_reset)
    }

    /// Sets the reset policy.
    pub fn set_restore_current_on_reset(&self, enabled: bool) -> Result<()> {
        self.ensure_not_recomputing("set_restore_current_on_reset")?;
        self.lock_state().restore_current_on_reset = enabled;
        Ok(())
    }

    /// Where the new-item placeholder is shown.
    pub fn placeholder_position(&self) -> Result<PlaceholderPosition> {
        Ok(self.read_config("placeholder_position")?.mapping.placeholder)
    }

    /// Moves, shows or hides the new-item placeholder.
    ///
    /// Fails while an item is being added.
    pub fn set_placeholder_position(&self, position: PlaceholderPosition) -> Result<()> {
        const OPERATION: &str = "set_placeholder_position";
        self.ensure_not_recomputing(OPERATION)?;
        let outcome = {
            let mut state = self.lock_state();
            if state.transaction.kind() == TransactionKind::Adding {
                return Err(ViewError::invalid_state(OPERATION, "an item is being added"));
            }
            if state.mapping.placeholder == position {
                return Ok(());
            }
            state.mapping.placeholder = position;
            if state.defer_depth > 0 {
                state.pending_requests += 1;
                return Ok(());
            }
            let before = state.currency.clone();
            state.relayout();
            state.reanchor(&before, &Reanchor::Refresh);
            state.finish(&before, vec![ViewChange::Reset], 0)
        };
        self.deliver(outcome);
        self.flush_pending();
        Ok(())
    }

    /// Re-reads the source and rebuilds the projection.
    pub fn refresh(&self) -> Result<()> {
        const OPERATION: &str = "refresh";
        self.ensure_not_recomputing(OPERATION)?;
        let outcome = {
            let mut state = self.lock_state();
            state.transaction.ensure_idle(OPERATION)?;
            if state.defer_depth > 0 {
                state.pending_requests += 1;
                return Ok(());
            }
            state.refresh(Some(&*self.source), Reanchor::Refresh, 0)
        };
        self.deliver(outcome);
        self.flush_pending();
        Ok(())
    }

    /// Suspends recomputation until the returned guard and every guard
    /// nested inside it are dropped. The projection is then rebuilt once.
    ///
    /// While deferred, reads, currency moves and transactions fail with
    /// [`ViewError::InvalidState`]. A deferred refresh cannot start while
    /// a transaction is open.
    pub fn defer_refresh(&self) -> Result<DeferRefresh<'_, T>> {
        const OPERATION: &str = "defer_refresh";
        self.ensure_not_recomputing(OPERATION)?;
        let mut state = self.lock_state();
        state.transaction.ensure_idle(OPERATION)?;
        state.defer_depth += 1;
        tracing::trace!(target: targets::PROJECTION, depth = state.defer_depth, "refresh deferred");
        Ok(DeferRefresh { view: self })
    }

    fn end_defer(&self) {
        let outcome = {
            let mut state = self.lock_state();
            state.defer_depth = state.defer_depth.saturating_sub(1);
            if state.defer_depth > 0 {
                return;
            }
            let pending = std::mem::take(&mut state.pending_requests);
            let _perf = PerfSpan::new(span_names::DEFERRED_REFRESH);
            tracing::debug!(target: targets::PROJECTION, pending, "deferred refresh released");
            state.refresh(Some(&*self.source), Reanchor::Refresh, pending)
        };
        self.deliver(outcome);
        self.flush_pending();
    }

    /// Applies declarative settings with a single refresh.
    ///
    /// Settings replace the sort descriptions, grouping levels, custom
    /// filter, placeholder position and policies. A culture is only changed
    /// when the settings name one. A filter predicate is kept.
    pub fn apply_settings(&self, settings: &ViewSettings) -> Result<()> {
        if !settings.sort.is_empty() {
            self.require(self.can_sort(), "this source cannot be sorted")?;
        }
        let groups = settings
            .group_by
            .iter()
            .map(|path| GroupDescription::by_property(path))
            .collect::<Result<Vec<_>>>()?;
        let culture = settings.culture.as_deref().map(Culture::new).transpose()?;
        let custom = match &settings.custom_filter {
            Some(text) => {
                self.require(self.can_custom_filter(), "this source does not evaluate filter expressions")?;
                self.ensure_not_recomputing("apply_settings")?;
                Some((text.clone(), self.source.compile_custom_filter(text)?))
            }
            None => None,
        };

        if custom.is_some() && self.has_filter()? {
            return Err(ViewError::configuration(
                "a custom filter cannot be combined with a filter predicate",
            ));
        }

        let _scope = self.defer_refresh()?;
        self.reshape("apply_settings", |state| {
            state.comparer.set(settings.sort.clone())?;
            if let Some(culture) = culture {
                state.comparer.set_culture(culture);
            }
            state.comparer.set_natural_ordering(settings.natural_ordering);
            state.grouping.clear();
            for group in groups {
                state.grouping.push(group);
            }
            state.filter.clear_expression();
            if let Some((text, compiled)) = custom {
                state.filter.set_expression(text, compiled)?;
            }
            state.mapping.placeholder = settings.placeholder;
            state.restore_current_on_reset = settings.restore_current_on_reset;
            Ok(())
        })
    }

    /// The current configuration as settings. Grouping levels built from
    /// key extractors are left out.
    pub fn settings(&self) -> Result<ViewSettings> {
        let state = self.read_config("settings")?;
        Ok(ViewSettings {
            sort: state.comparer.descriptions(),
            group_by: state
                .grouping
                .descriptions()
                .iter()
                .filter_map(|d| d.property_path().map(str::to_string))
                .collect(),
            placeholder: state.mapping.placeholder,
            culture: Some(state.comparer.culture().name().to_string()),
            natural_ordering: state.comparer.natural_ordering(),
            restore_current_on_reset: state.restore_current_on_reset,
            custom_filter: state.filter.custom_expression().map(str::to_string),
        })
    }

    // -- capabilities ---------------------------------------------------

    fn require(&self, capable: bool, message: &'static str) -> Result<()> {
        if capable {
            Ok(())
        } else {
            Err(ViewError::not_supported(message))
        }
    }

    /// What the source allows.
    pub fn capabilities(&self) -> SourceCapabilities {
        self.source.capabilities()
    }

    /// Returns `true` if sort descriptions may be set.
    pub fn can_sort(&self) -> bool {
        self.capabilities().can_sort
    }

    /// Returns `true` if a filter predicate may be set.
    pub fn can_filter(&self) -> bool {
        self.capabilities().can_filter
    }

    /// Returns `true` if a custom filter expression may be set.
    pub fn can_custom_filter(&self) -> bool {
        self.capabilities().can_custom_filter
    }

    /// Grouping is always available.
    pub fn can_group(&self) -> bool {
        true
    }

    /// Returns `true` if [`add_new`](Self::add_new) may be called.
    pub fn can_add_new(&self) -> bool {
        self.capabilities().can_add_new
    }

    /// Returns `true` if items may be edited.
    pub fn can_edit(&self) -> bool {
        self.capabilities().can_edit
    }

    /// Returns `true` if items may be removed now. Removal is unavailable
    /// while a transaction is open.
    pub fn can_remove(&self) -> Result<bool> {
        Ok(self.capabilities().can_remove && self.transaction_kind()? == TransactionKind::Idle)
    }

    /// Returns `true` if the item being edited can revert its changes.
    pub fn can_cancel_edit(&self) -> Result<bool> {
        let item = self.current_edit_item()?;
        Ok(item.is_some_and(|item| item.read().supports_cancel_edit()))
    }

    /// Describes the properties items of this view expose.
    pub fn item_properties(&self) -> Vec<ItemPropertyInfo> {
        T::item_properties()
    }

    // -- projection -----------------------------------------------------

    /// Number of entries, including the placeholder and the new item.
    pub fn count(&self) -> Result<usize> {
        Ok(self.read_state("count")?.mapping.len())
    }

    /// Returns `true` if the projection has no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    /// The entry at `index`.
    pub fn item_at(&self, index: usize) -> Result<ViewItem<T>> {
        let state = self.read_state("item_at")?;
        state
            .entry_at(index)
            .ok_or_else(|| ViewError::out_of_range(index as isize, state.mapping.len()))
    }

    /// The first position of `entry`, or `None` if it is not shown.
    ///
    /// An item that belongs to several groups is shown once per group;
    /// [`positions_of`](Self::positions_of) lists every occurrence.
    pub fn index_of(&self, entry: &ViewItem<T>) -> Result<Option<usize>> {
        Ok(self.read_state("index_of")?.position_of(entry, None))
    }

    /// Every position showing `entry`, in view order.
    pub fn positions_of(&self, entry: &ViewItem<T>) -> Result<Vec<usize>> {
        let state = self.read_state("positions_of")?;
        Ok(match entry {
            ViewItem::Placeholder => state.mapping.placeholder_slot().into_iter().collect(),
            ViewItem::Item(item) => state
                .source_index(item)
                .map(|index| state.mapping.positions_of(index))
                .unwrap_or_default(),
        })
    }

    /// Returns `true` if `entry` is shown.
    pub fn contains(&self, entry: &ViewItem<T>) -> Result<bool> {
        Ok(self.index_of(entry)?.is_some())
    }

    /// A fresh traversal of the projection. It reads the live view at
    /// every step.
    pub fn iter(&self) -> Result<Iter<'_, T>> {
        self.read_state("iter").map(|_| Iter { view: self, next: 0 })
    }

    /// The top-level entries of the group tree, empty when ungrouped.
    ///
    /// While an item is being added, it and the placeholder are listed
    /// beside the groups in their structural order.
    pub fn groups(&self) -> Result<Vec<GroupEntry<T>>> {
        let state = self.read_state("groups")?;
        if !state.grouping.is_active() {
            return Ok(Vec::new());
        }
        let items = &state.items;
        let groups = state
            .grouping
            .snapshot(&|i| items.get(i).cloned())
            .into_iter()
            .map(GroupEntry::Group);

        let placeholder = (state.mapping.placeholder != PlaceholderPosition::None)
            .then(|| GroupEntry::Item(ViewItem::Placeholder));
        let new_item = state
            .mapping
            .new_item
            .and_then(|i| items.get(i))
            .map(|h| GroupEntry::Item(ViewItem::Item(h.clone())));

        let mut entries = Vec::new();
        if state.mapping.placeholder == PlaceholderPosition::AtBeginning {
            entries.extend(placeholder);
            entries.extend(new_item);
            entries.extend(groups);
        } else {
            entries.extend(groups);
            entries.extend(new_item);
            entries.extend(placeholder);
        }
        Ok(entries)
    }

    /// Tests `entry` against the filter. The placeholder and the item being
    /// added always pass.
    pub fn passes_filter(&self, entry: &ViewItem<T>) -> Result<bool> {
        self.ensure_not_recomputing("passes_filter")?;
        let state = self.lock_state();
        Ok(state.filter.passes_entry(entry, state.transaction.adding_item()))
    }

    // -- currency -------------------------------------------------------

    /// The current entry, `None` before the first or after the last.
    pub fn current_item(&self) -> Result<Option<ViewItem<T>>> {
        Ok(self.read_state("current_item")?.currency.item().cloned())
    }

    /// The current position.
    pub fn current_position(&self) -> Result<CurrentPosition> {
        Ok(self.read_state("current_position")?.currency.position())
    }

    /// Returns `true` if currency is before the first entry.
    pub fn is_current_before_first(&self) -> Result<bool> {
        Ok(self.current_position()? == CurrentPosition::BeforeFirst)
    }

    /// Returns `true` if currency is after the last entry.
    pub fn is_current_after_last(&self) -> Result<bool> {
        Ok(self.current_position()? == CurrentPosition::AfterLast)
    }

    /// Returns `true` if currency is on an entry.
    pub fn is_current_in_view(&self) -> Result<bool> {
        Ok(self.current_position()?.index().is_some())
    }

    /// Registers a currency listener.
    pub fn add_currency_listener(&self, listener: Arc<dyn CurrencyListener<T>>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Unregisters a currency listener.
    pub fn remove_currency_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Moves to the first entry. Returns `true` if currency moved.
    pub fn move_current_to_first(&self) -> Result<bool> {
        self.move_current(MoveRequest::First, "move_current_to_first")
    }

    /// Moves to the last entry.
    pub fn move_current_to_last(&self) -> Result<bool> {
        self.move_current(MoveRequest::Last, "move_current_to_last")
    }

    /// Moves to the next entry, or after the last one.
    pub fn move_current_to_next(&self) -> Result<bool> {
        self.move_current(MoveRequest::Next, "move_current_to_next")
    }

    /// Moves to the previous entry, or before the first one.
    pub fn move_current_to_previous(&self) -> Result<bool> {
        self.move_current(MoveRequest::Previous, "move_current_to_previous")
    }

    /// Moves to a signed position: `-1` is before the first entry and
    /// `count` after the last. Anything else out of range fails.
    pub fn move_current_to_position(&self, position: isize) -> Result<bool> {
        self.move_current(MoveRequest::Position(position), "move_current_to_position")
    }

    /// Moves to `entry`, or before the first entry if it is not shown.
    pub fn move_current_to(&self, entry: &ViewItem<T>) -> Result<bool> {
        let (position, item, generation) = {
            let state = self.read_state("move_current_to")?;
            if state.currency.item() == Some(entry) {
                return Ok(false);
            }
            let position = match state.position_of(entry, state.currency.position().index()) {
                Some(p) if Some(p) == state.avoided_slot() => return Ok(false),
                Some(p) => CurrentPosition::InRange(p),
                None => CurrentPosition::BeforeFirst,
            };
            let item = position.index().map(|_| entry.clone());
            if state.currency.is_same(position, item.as_ref()) {
                return Ok(false);
            }
            (position, item, state.generation)
        };
        self.commit_move(position, item, generation)
    }

    fn move_current(&self, request: MoveRequest, operation: &'static str) -> Result<bool> {
        let (position, item, generation) = {
            let state = self.read_state(operation)?;
            let count = state.mapping.len();
            let Some(position) = state.currency.candidate(request, count, state.avoided_slot())? else {
                return Ok(false);
            };
            let item = position.index().and_then(|i| state.entry_at(i));
            (position, item, state.generation)
        };
        self.commit_move(position, item, generation)
    }

    fn commit_move(&self, position: CurrentPosition, item: Option<ViewItem<T>>, generation: u64) -> Result<bool> {
        let changing = CurrentChanging {
            candidate: item.clone(),
            candidate_position: position,
            pending_requests: 0,
            is_cancelable: true,
        };
        if !self.listeners.query_changing(&changing) {
            return Ok(false);
        }
        self.ensure_not_recomputing("move_current")?;
        {
            let mut state = self.lock_state();
            if state.generation != generation || state.defer_depth > 0 {
                tracing::warn!(
                    target: targets::CURRENCY,
                    candidate = ?position,
                    "view changed while listeners were consulted, move abandoned"
                );
                return Ok(false);
            }
            state.currency.set(position, item.clone());
            state.generation += 1;
        }
        tracing::trace!(target: targets::CURRENCY, ?position, "current changed");
        self.listeners.notify_changed(&CurrentChanged {
            item,
            position,
            pending_requests: 0,
        });
        Ok(true)
    }

    // -- transactions ---------------------------------------------------

    /// The open transaction.
    pub fn transaction_kind(&self) -> Result<TransactionKind> {
        Ok(self.read_config("transaction_kind")?.transaction.kind())
    }

    /// Returns `true` while an item is being added.
    pub fn is_adding_new(&self) -> Result<bool> {
        Ok(self.transaction_kind()? == TransactionKind::Adding)
    }

    /// The item being added.
    pub fn current_add_item(&self) -> Result<Option<ItemHandle<T>>> {
        Ok(self.read_config("current_add_item")?.transaction.adding_item().cloned())
    }

    /// Returns `true` while an item is being edited.
    pub fn is_editing_item(&self) -> Result<bool> {
        Ok(self.transaction_kind()? == TransactionKind::Editing)
    }

    /// The item being edited.
    pub fn current_edit_item(&self) -> Result<Option<ItemHandle<T>>> {
        Ok(self.read_config("current_edit_item")?.transaction.editing_item().cloned())
    }

    fn ensure_live(&self, operation: &'static str) -> Result<()> {
        self.ensure_not_recomputing(operation)?;
        if self.state.read().defer_depth > 0 {
            return Err(ViewError::invalid_state(operation, "a deferred refresh is open"));
        }
        Ok(())
    }

    fn commit_open(&self) -> Result<()> {
        match self.transaction_kind()? {
            TransactionKind::Adding => self.commit_new(),
            TransactionKind::Editing => self.commit_edit(),
            TransactionKind::Idle => Ok(()),
        }
    }

    /// Creates an item with the source's factory, appends it to the source
    /// and opens an add transaction on it. Currency moves to the new item.
    ///
    /// An open transaction is committed first.
    pub fn add_new(&self) -> Result<ItemHandle<T>> {
        self.begin_add("add_new", |source| source.create_item())
    }

    /// Like [`add_new`](Self::add_new) with a caller-supplied value.
    pub fn add_new_item(&self, value: T) -> Result<ItemHandle<T>> {
        self.begin_add("add_new_item", move |_| Ok(ItemHandle::new(value)))
    }

    fn begin_add(
        &self,
        operation: &'static str,
        create: impl FnOnce(&dyn CollectionSource<T>) -> Result<ItemHandle<T>>,
    ) -> Result<ItemHandle<T>> {
        self.ensure_live(operation)?;
        self.require(self.can_add_new(), "this source cannot add items")?;
        self.commit_open()?;

        let item = create(&*self.source)?;
        editing::begin_add(&item);
        {
            let mut state = self.lock_live(operation)?;
            let prior = state.currency.clone();
            state.transaction = Transaction::Adding {
                item: item.clone(),
                prior,
                cancelling: false,
            };
        }
        tracing::debug!(target: targets::EDITING, "add transaction opened");

        if let Err(err) = self.source.insert(self.source.len(), item.clone()) {
            self.lock_state().transaction = Transaction::Idle;
            editing::cancel_add(&item);
            tracing::debug!(target: targets::EDITING, error = %err, "source rejected the new item");
            return Err(err);
        }
        self.flush_pending();
        self.move_current_to(&ViewItem::Item(item.clone()))?;
        Ok(item)
    }

    /// Ends the add transaction, keeping the item. The item is then placed
    /// by filter, order and groups like any other. Does nothing unless an
    /// item is being added.
    pub fn commit_new(&self) -> Result<()> {
        self.ensure_live("commit_new")?;
        let Some(item) = self.current_add_item()? else {
            return Ok(());
        };
        editing::commit_add(&item);
        let outcome = {
            let mut state = self.lock_state();
            if !state.transaction.adding_item().is_some_and(|a| a.ptr_eq(&item)) {
                return Ok(());
            }
            state.transaction = Transaction::Idle;
            state.reposition(&item)
        };
        tracing::debug!(target: targets::EDITING, "add transaction committed");
        self.deliver(outcome);
        self.flush_pending();
        Ok(())
    }

    /// Ends the add transaction by removing the item from the source.
    /// Currency returns to where it was before the add. Does nothing
    /// unless an item is being added.
    pub fn cancel_new(&self) -> Result<()> {
        self.ensure_live("cancel_new")?;
        let Some(item) = self.current_add_item()? else {
            return Ok(());
        };
        editing::cancel_add(&item);
        self.set_cancelling(true);

        let removal = match self.source.index_of(&item) {
            Some(index) => self.source.remove_at(index).map(drop),
            None => Ok(()),
        };
        if let Err(err) = removal {
            self.set_cancelling(false);
            return Err(err);
        }

        // A source that did not report the removal leaves the transaction open.
        let outcome = {
            let mut state = self.lock_state();
            let prior = match &state.transaction {
                Transaction::Adding { item: open, prior, .. } if open.ptr_eq(&item) => Some(prior.clone()),
                _ => None,
            };
            prior.map(|prior| {
                state.transaction = Transaction::Idle;
                state.refresh(Some(&*self.source), Reanchor::Restore(prior), 0)
            })
        };
        if let Some(outcome) = outcome {
            self.deliver(outcome);
        }
        tracing::debug!(target: targets::EDITING, "add transaction cancelled");
        self.flush_pending();
        Ok(())
    }

    fn set_cancelling(&self, value: bool) {
        if let Transaction::Adding { cancelling, .. } = &mut self.lock_state().transaction {
            *cancelling = value;
        }
    }

    /// Opens an edit transaction on `entry` and moves currency to it if
    /// it is shown.
    ///
    /// An open add is committed first, as is an edit of another item.
    /// Editing the item that is already being edited or added does nothing.
    pub fn edit_item(&self, entry: &ViewItem<T>) -> Result<()> {
        const OPERATION: &str = "edit_item";
        self.ensure_live(OPERATION)?;
        let ViewItem::Item(item) = entry else {
            return Err(ViewError::argument("the new-item placeholder cannot be edited"));
        };
        self.require(self.can_edit(), "this source does not allow editing")?;

        let subject = self.state.read().transaction.subject().cloned();
        if subject.is_some_and(|s| s.ptr_eq(item)) {
            return Ok(());
        }
        self.commit_open()?;

        item.write().begin_edit();
        self.lock_live(OPERATION)?.transaction = Transaction::Editing { item: item.clone() };
        tracing::debug!(target: targets::EDITING, "edit transaction opened");

        if self.contains(entry)? {
            self.move_current_to(entry)?;
        }
        Ok(())
    }

    /// Ends the edit transaction, keeping the changes, and repositions the
    /// item. Does nothing unless an item is being edited.
    pub fn commit_edit(&self) -> Result<()> {
        self.ensure_live("commit_edit")?;
        let Some(item) = self.current_edit_item()? else {
            return Ok(());
        };
        item.write().end_edit();
        self.close_edit(&item);
        tracing::debug!(target: targets::EDITING, "edit transaction committed");
        Ok(())
    }

    /// Ends the edit transaction, reverting the changes. Fails if the item
    /// cannot revert. Does nothing unless an item is being edited.
    pub fn cancel_edit(&self) -> Result<()> {
        const OPERATION: &str = "cancel_edit";
        self.ensure_live(OPERATION)?;
        let Some(item) = self.current_edit_item()? else {
            return Ok(());
        };
        if !item.read().supports_cancel_edit() {
            return Err(ViewError::invalid_state(OPERATION, "the item being edited cannot revert changes"));
        }
        item.write().cancel_edit();
        self.close_edit(&item);
        tracing::debug!(target: targets::EDITING, "edit transaction cancelled");
        Ok(())
    }

    fn close_edit(&self, item: &ItemHandle<T>) {
        let outcome = {
            let mut state = self.lock_state();
            if !state.transaction.editing_item().is_some_and(|e| e.ptr_eq(item)) {
                return;
            }
            state.transaction = Transaction::Idle;
            state.reposition(item)
        };
        self.deliver(outcome);
        self.flush_pending();
    }

    fn guard_removal(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, ViewState<T>>> {
        let state = self.read_state(operation)?;
        self.require(self.capabilities().can_remove, "this source does not allow removal")?;
        state.transaction.ensure_idle(operation)?;
        Ok(state)
    }

    /// Removes the entry at `index` from the source.
    pub fn remove_at(&self, index: usize) -> Result<()> {
        const OPERATION: &str = "remove_at";
        let item = {
            let state = self.guard_removal(OPERATION)?;
            match state.mapping.slot(index) {
                None => return Err(ViewError::out_of_range(index as isize, state.mapping.len())),
                Some(Slot::Placeholder) => {
                    return Err(ViewError::invalid_state(OPERATION, "the index holds the new-item placeholder"));
                }
                Some(Slot::Source(i)) => state.items[i].clone(),
            }
        };
        self.remove_from_source(&item)
    }

    /// Removes `entry` from the source. Does nothing if the source does
    /// not hold it.
    pub fn remove(&self, entry: &ViewItem<T>) -> Result<()> {
        const OPERATION: &str = "remove";
        drop(self.guard_removal(OPERATION)?);
        match entry {
            ViewItem::Placeholder => Err(ViewError::invalid_state(
                OPERATION,
                "the new-item placeholder cannot be removed",
            )),
            ViewItem::Item(item) => self.remove_from_source(item),
        }
    }

    fn remove_from_source(&self, item: &ItemHandle<T>) -> Result<()> {
        match self.source.index_of(item) {
            Some(index) => {
                self.source.remove_at(index)?;
            }
            None => tracing::trace!(target: targets::EDITING, "item to remove is not in the source"),
        }
        self.flush_pending();
        Ok(())
    }
}

impl<T: CollectionItem> Drop for CollectionView<T> {
    fn drop(&mut self) {
        self.source.signals().collection_changed.disconnect(self.connection);
    }
}

impl<T: CollectionItem> fmt::Debug for CollectionView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("CollectionView");
        if let Some(state) = self.state.try_read() {
            s.field("count", &state.mapping.len())
                .field("comparer", &state.comparer)
                .field("currency", &state.currency)
                .field("transaction", &state.transaction.kind())
                .field("deferred", &(state.defer_depth > 0));
        }
        s.field("currency_listeners", &self.listeners.len());
        s.finish_non_exhaustive()
    }
}

/// A live traversal of a view, returned by [`CollectionView::iter`].
pub struct Iter<'a, T: CollectionItem> {
    view: &'a CollectionView<T>,
    next: usize,
}

impl<T: CollectionItem> Iterator for Iter<'_, T> {
    type Item = ViewItem<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.view.item_at(self.next).ok()?;
        self.next += 1;
        Some(item)
    }
}

/// Scope returned by [`CollectionView::defer_refresh`].
#[must_use = "the refresh is released as soon as the guard is dropped"]
pub struct DeferRefresh<'a, T: CollectionItem> {
    view: &'a CollectionView<T>,
}

impl<T: CollectionItem> Drop for DeferRefresh<'_, T> {
    fn drop(&mut self) {
        self.view.end_defer();
    }
}

/// Builder for configured views.
///
/// Configuration is applied inside one deferred refresh, so the view is
/// built once.
pub struct CollectionViewBuilder<T: CollectionItem> {
    source: Arc<dyn CollectionSource<T>>,
    sort: Vec<SortDescription>,
    filter: Option<FilterFn<T>>,
    custom_filter: Option<String>,
    groups: Vec<GroupDescription<T>>,
    placeholder: PlaceholderPosition,
    culture: Option<Culture>,
    natural_ordering: bool,
    restore_current_on_reset: bool,
}

impl<T: CollectionItem> CollectionViewBuilder<T> {
    /// Creates a new builder over `source`.
    pub fn new(source: Arc<dyn CollectionSource<T>>) -> Self {
        Self {
            source,
            sort: Vec::new(),
            filter: None,
            custom_filter: None,
            groups: Vec::new(),
            placeholder: PlaceholderPosition::None,
            culture: None,
            natural_ordering: false,
            restore_current_on_reset: false,
        }
    }

    /// Adds a sort description.
    pub fn sort(mut self, description: SortDescription) -> Self {
        self.sort.push(description);
        self
    }

    /// Sets a filter predicate.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(predicate));
        self
    }

    /// Sets a custom filter expression.
    pub fn custom_filter(mut self, expression: impl Into<String>) -> Self {
        self.custom_filter = Some(expression.into());
        self
    }

    /// Adds a grouping level.
    pub fn group_by(mut self, description: GroupDescription<T>) -> Self {
        self.groups.push(description);
        self
    }

    /// Sets the placeholder position.
    pub fn placeholder(mut self, position: PlaceholderPosition) -> Self {
        self.placeholder = position;
        self
    }

    /// Sets the culture.
    pub fn culture(mut self, culture: Culture) -> Self {
        self.culture = Some(culture);
        self
    }

    /// Enables natural ordering.
    pub fn natural_ordering(mut self, enabled: bool) -> Self {
        self.natural_ordering = enabled;
        self
    }

    /// Sets the reset policy.
    pub fn restore_current_on_reset(mut self, enabled: bool) -> Self {
        self.restore_current_on_reset = enabled;
        self
    }

    /// Builds the view.
    pub fn build(self) -> Result<Arc<CollectionView<T>>> {
        let view = CollectionView::new(self.source);
        {
            let _scope = view.defer_refresh()?;
            if !self.sort.is_empty() {
                view.set_sort_descriptions(self.sort)?;
            }
            if let Some(filter) = self.filter {
                view.set_filter_fn(filter)?;
            }
            if let Some(expression) = &self.custom_filter {
                view.set_custom_filter(expression)?;
            }
            for group in self.groups {
                view.add_group_description(group)?;
            }
            if let Some(culture) = self.culture {
                view.set_culture(culture)?;
            }
            view.set_natural_ordering(self.natural_ordering)?;
            view.set_restore_current_on_reset(self.restore_current_on_reset)?;
            view.set_placeholder_position(self.placeholder)?;
        }
        Ok(view)
    }
}
