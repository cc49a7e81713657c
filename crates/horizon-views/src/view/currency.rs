//! Currency: the single current position over a view.
//!
//! Moves are two-phase. Listeners are first asked whether the move may
//! proceed ([`CurrencyListener::current_changing`]); if none objects, the
//! move is committed and [`CurrencyListener::current_changed`] follows.
//! Moves forced by changes to the projection are announced with
//! `is_cancelable == false` and cannot be vetoed.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use horizon_views_core::logging::targets;

use crate::error::{Result, ViewError};
use crate::item::ViewItem;

/// Where currency sits relative to the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurrentPosition {
    /// Before the first entry. The initial state.
    #[default]
    BeforeFirst,
    /// On the entry at this index.
    InRange(usize),
    /// After the last entry.
    AfterLast,
}

impl CurrentPosition {
    /// The index, if currency is on an entry.
    pub fn index(self) -> Option<usize> {
        match self {
            CurrentPosition::InRange(index) => Some(index),
            _ => None,
        }
    }

    /// The position as a signed index: `-1` before the first entry, `count`
    /// after the last.
    pub fn to_signed(self, count: usize) -> isize {
        match self {
            CurrentPosition::BeforeFirst => -1,
            CurrentPosition::InRange(index) => index as isize,
            CurrentPosition::AfterLast => count as isize,
        }
    }

    /// Interprets a signed index for a projection of `count` entries.
    ///
    /// ```
    /// use horizon_views::view::CurrentPosition;
    ///
    /// assert_eq!(CurrentPosition::from_signed(-1, 3).unwrap(), CurrentPosition::BeforeFirst);
    /// assert_eq!(CurrentPosition::from_signed(3, 3).unwrap(), CurrentPosition::AfterLast);
    /// assert!(CurrentPosition::from_signed(4, 3).is_err());
    /// ```
    pub fn from_signed(position: isize, count: usize) -> Result<Self> {
        match position {
            -1 => Ok(CurrentPosition::BeforeFirst),
            p if p >= 0 && (p as usize) < count => Ok(CurrentPosition::InRange(p as usize)),
            p if p >= 0 && p as usize == count => Ok(CurrentPosition::AfterLast),
            p => Err(ViewError::out_of_range(p, count)),
        }
    }
}

/// A requested relative or absolute move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MoveRequest {
    First,
    Last,
    Next,
    Previous,
    Position(isize),
}

/// Raised before currency moves.
pub struct CurrentChanging<T> {
    /// The entry currency will land on, `None` for the sentinels.
    pub candidate: Option<ViewItem<T>>,
    /// The position currency will land on.
    pub candidate_position: CurrentPosition,
    /// Number of changes coalesced into this move by a deferred refresh.
    pub pending_requests: usize,
    /// Whether returning `false` from the listener cancels the move.
    pub is_cancelable: bool,
}

/// Raised after currency moved.
pub struct CurrentChanged<T> {
    /// The new current entry, `None` for the sentinels.
    pub item: Option<ViewItem<T>>,
    /// The new position.
    pub position: CurrentPosition,
    /// Number of changes coalesced into this move by a deferred refresh.
    pub pending_requests: usize,
}

/// Receives two-phase currency notifications.
pub trait CurrencyListener<T>: Send + Sync {
    /// Asked before a move. Return `false` to veto a cancelable move.
    fn current_changing(&self, event: &CurrentChanging<T>) -> bool {
        let _ = event;
        true
    }

    /// Told after a move.
    fn current_changed(&self, event: &CurrentChanged<T>) {
        let _ = event;
    }
}

type ChangingFn<T> = Box<dyn Fn(&CurrentChanging<T>) -> bool + Send + Sync>;
type ChangedFn<T> = Box<dyn Fn(&CurrentChanged<T>) + Send + Sync>;

/// A [`CurrencyListener`] built from closures.
///
/// ```
/// use horizon_views::view::CurrencyHooks;
///
/// let hooks = CurrencyHooks::<String>::new()
///     .on_changing(|event| event.candidate_position.index() != Some(0))
///     .on_changed(|event| println!("now at {:?}", event.position));
/// ```
pub struct CurrencyHooks<T> {
    changing: Option<ChangingFn<T>>,
    changed: Option<ChangedFn<T>>,
}

impl<T> Default for CurrencyHooks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CurrencyHooks<T> {
    /// Hooks that approve everything.
    pub fn new() -> Self {
        Self {
            changing: None,
            changed: None,
        }
    }

    /// Sets the changing handler.
    pub fn on_changing<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CurrentChanging<T>) -> bool + Send + Sync + 'static,
    {
        self.changing = Some(Box::new(handler));
        self
    }

    /// Sets the changed handler.
    pub fn on_changed<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CurrentChanged<T>) + Send + Sync + 'static,
    {
        self.changed = Some(Box::new(handler));
        self
    }
}

impl<T> CurrencyListener<T> for CurrencyHooks<T> {
    fn current_changing(&self, event: &CurrentChanging<T>) -> bool {
        self.changing.as_ref().is_none_or(|handler| handler(event))
    }

    fn current_changed(&self, event: &CurrentChanged<T>) {
        if let Some(handler) = &self.changed {
            handler(event);
        }
    }
}

new_key_type! {
    /// Identifies a registered [`CurrencyListener`].
    pub struct ListenerId;
}

/// The listener list a view owns.
pub(crate) struct CurrencyListeners<T> {
    listeners: Mutex<SlotMap<ListenerId, Arc<dyn CurrencyListener<T>>>>,
}

impl<T> CurrencyListeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(SlotMap::with_key()),
        }
    }

    pub(crate) fn add(&self, listener: Arc<dyn CurrencyListener<T>>) -> ListenerId {
        self.listeners.lock().insert(listener)
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        self.listeners.lock().remove(id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn CurrencyListener<T>>> {
        self.listeners.lock().values().cloned().collect()
    }

    /// Asks every listener. Returns `false` if a cancelable move was vetoed.
    ///
    /// Every listener is consulted even after a veto, so all of them observe
    /// the same request.
    pub(crate) fn query_changing(&self, event: &CurrentChanging<T>) -> bool {
        let mut approved = true;
        for listener in self.snapshot() {
            approved &= listener.current_changing(event);
        }
        if !approved && event.is_cancelable {
            tracing::debug!(
                target: targets::CURRENCY,
                candidate = ?event.candidate_position,
                "currency change vetoed"
            );
            return false;
        }
        true
    }

    pub(crate) fn notify_changed(&self, event: &CurrentChanged<T>) {
        for listener in self.snapshot() {
            listener.current_changed(event);
        }
    }
}

/// The current position and entry of a view.
pub struct CurrencyTracker<T> {
    position: CurrentPosition,
    item: Option<ViewItem<T>>,
}

impl<T> Clone for CurrencyTracker<T> {
    fn clone(&self) -> Self {
        Self {
            position: self.position,
            item: self.item.clone(),
        }
    }
}

impl<T> Default for CurrencyTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CurrencyTracker<T> {
    /// Currency before the first entry.
    pub fn new() -> Self {
        Self {
            position: CurrentPosition::BeforeFirst,
            item: None,
        }
    }

    /// The current position.
    pub fn position(&self) -> CurrentPosition {
        self.position
    }

    /// The current entry.
    pub fn item(&self) -> Option<&ViewItem<T>> {
        self.item.as_ref()
    }

    /// Moves currency. The entry must match the position.
    pub(crate) fn set(&mut self, position: CurrentPosition, item: Option<ViewItem<T>>) {
        debug_assert_eq!(position.index().is_some(), item.is_some());
        self.position = position;
        self.item = item;
    }

    /// Returns `true` if currency already sits at `position` on `item`.
    pub(crate) fn is_same(&self, position: CurrentPosition, item: Option<&ViewItem<T>>) -> bool {
        self.position == position && self.item.as_ref() == item
    }

    /// The position a request would move to, or `None` if it is a no-op.
    ///
    /// `avoid` names a slot currency may not land on. Relative moves step
    /// over it; absolute moves onto it are ignored.
    pub(crate) fn candidate(
        &self,
        request: MoveRequest,
        count: usize,
        avoid: Option<usize>,
    ) -> Result<Option<CurrentPosition>> {
        let next = match (request, self.position) {
            (MoveRequest::First, _) if count == 0 => None,
            (MoveRequest::First, _) => step_forward(0, count, avoid),
            (MoveRequest::Last, _) if count == 0 => None,
            (MoveRequest::Last, _) => step_backward(count as isize - 1, avoid),
            (MoveRequest::Next, CurrentPosition::AfterLast) => None,
            (MoveRequest::Next, CurrentPosition::BeforeFirst) => Some(step_past(0, count, avoid)),
            (MoveRequest::Next, CurrentPosition::InRange(i)) => Some(step_past(i + 1, count, avoid)),
            (MoveRequest::Previous, CurrentPosition::BeforeFirst) => None,
            (MoveRequest::Previous, CurrentPosition::AfterLast) => {
                Some(step_before(count as isize - 1, avoid))
            }
            (MoveRequest::Previous, CurrentPosition::InRange(i)) => {
                Some(step_before(i as isize - 1, avoid))
            }
            (MoveRequest::Position(p), _) => {
                let target = CurrentPosition::from_signed(p, count)?;
                (target.index().is_none() || target.index() != avoid).then_some(target)
            }
        };
        Ok(next.filter(|&p| p != self.position))
    }
}

fn step_past(index: usize, count: usize, avoid: Option<usize>) -> CurrentPosition {
    let index = if avoid == Some(index) { index + 1 } else { index };
    if index < count {
        CurrentPosition::InRange(index)
    } else {
        CurrentPosition::AfterLast
    }
}

fn step_before(index: isize, avoid: Option<usize>) -> CurrentPosition {
    let index = if index >= 0 && avoid == Some(index as usize) { index - 1 } else { index };
    if index >= 0 {
        CurrentPosition::InRange(index as usize)
    } else {
        CurrentPosition::BeforeFirst
    }
}

fn step_forward(index: usize, count: usize, avoid: Option<usize>) -> Option<CurrentPosition> {
    match step_past(index, count, avoid) {
        CurrentPosition::InRange(i) => Some(CurrentPosition::InRange(i)),
        _ => None,
    }
}

fn step_backward(index: isize, avoid: Option<usize>) -> Option<CurrentPosition> {
    match step_before(index, avoid) {
        CurrentPosition::InRange(i) => Some(CurrentPosition::InRange(i)),
        _ => None,
    }
}

impl<T> fmt::Debug for CurrencyTracker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrencyTracker")
            .field("position", &self.position)
            .field("has_item", &self.item.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(position: CurrentPosition) -> CurrencyTracker<String> {
        let mut tracker = CurrencyTracker::new();
        let item = position
            .index()
            .map(|_| ViewItem::Item(crate::item::ItemHandle::new(String::new())));
        tracker.set(position, item);
        tracker
    }

    #[test]
    fn test_starts_before_first() {
        let tracker = CurrencyTracker::<String>::new();
        assert_eq!(tracker.position(), CurrentPosition::BeforeFirst);
        assert!(tracker.item().is_none());
    }

    #[test]
    fn test_next_walks_off_the_end() {
        let tracker = at(CurrentPosition::InRange(2));
        assert_eq!(
            tracker.candidate(MoveRequest::Next, 3, None).unwrap(),
            Some(CurrentPosition::AfterLast)
        );
        let tracker = at(CurrentPosition::AfterLast);
        assert_eq!(tracker.candidate(MoveRequest::Next, 3, None).unwrap(), None);
        assert_eq!(
            tracker.candidate(MoveRequest::Previous, 3, None).unwrap(),
            Some(CurrentPosition::InRange(2))
        );
    }

    #[test]
    fn test_previous_walks_off_the_start() {
        let tracker = at(CurrentPosition::InRange(0));
        assert_eq!(
            tracker.candidate(MoveRequest::Previous, 3, None).unwrap(),
            Some(CurrentPosition::BeforeFirst)
        );
        let tracker = at(CurrentPosition::BeforeFirst);
        assert_eq!(tracker.candidate(MoveRequest::Previous, 3, None).unwrap(), None);
        assert_eq!(
            tracker.candidate(MoveRequest::Next, 3, None).unwrap(),
            Some(CurrentPosition::InRange(0))
        );
    }

    #[test]
    fn test_empty_projection() {
        let tracker = at(CurrentPosition::BeforeFirst);
        assert_eq!(tracker.candidate(MoveRequest::First, 0, None).unwrap(), None);
        assert_eq!(tracker.candidate(MoveRequest::Last, 0, None).unwrap(), None);
        assert_eq!(
            tracker.candidate(MoveRequest::Next, 0, None).unwrap(),
            Some(CurrentPosition::AfterLast)
        );
    }

    #[test]
    fn test_position_bounds() {
        let tracker = at(CurrentPosition::InRange(1));
        assert_eq!(
            tracker.candidate(MoveRequest::Position(-1), 3, None).unwrap(),
            Some(CurrentPosition::BeforeFirst)
        );
        assert_eq!(
            tracker.candidate(MoveRequest::Position(3), 3, None).unwrap(),
            Some(CurrentPosition::AfterLast)
        );
        assert_eq!(tracker.candidate(MoveRequest::Position(1), 3, None).unwrap(), None);
        assert_eq!(
            tracker.candidate(MoveRequest::Position(4), 3, None),
            Err(ViewError::OutOfRange { index: 4, count: 3 })
        );
        assert!(tracker.candidate(MoveRequest::Position(-2), 3, None).is_err());
    }

    #[test]
    fn test_avoided_slot_is_stepped_over() {
        // [placeholder, new, a, b]: the placeholder sits at 0.
        let tracker = at(CurrentPosition::InRange(1));
        assert_eq!(
            tracker.candidate(MoveRequest::Previous, 4, Some(0)).unwrap(),
            Some(CurrentPosition::BeforeFirst)
        );
        assert_eq!(tracker.candidate(MoveRequest::First, 4, Some(0)).unwrap(), None);
        assert_eq!(tracker.candidate(MoveRequest::Position(0), 4, Some(0)).unwrap(), None);

        let tracker = at(CurrentPosition::BeforeFirst);
        assert_eq!(
            tracker.candidate(MoveRequest::Next, 4, Some(0)).unwrap(),
            Some(CurrentPosition::InRange(1))
        );

        // [a, new, placeholder]
        let tracker = at(CurrentPosition::InRange(1));
        assert_eq!(tracker.candidate(MoveRequest::Last, 3, Some(2)).unwrap(), None);
        assert_eq!(
            tracker.candidate(MoveRequest::Next, 3, Some(2)).unwrap(),
            Some(CurrentPosition::AfterLast)
        );
        let tracker = at(CurrentPosition::AfterLast);
        assert_eq!(
            tracker.candidate(MoveRequest::Previous, 3, Some(2)).unwrap(),
            Some(CurrentPosition::InRange(1))
        );
    }

    #[test]
    fn test_signed_round_trip() {
        for (position, signed) in [
            (CurrentPosition::BeforeFirst, -1),
            (CurrentPosition::InRange(1), 1),
            (CurrentPosition::AfterLast, 4),
        ] {
            assert_eq!(position.to_signed(4), signed);
            assert_eq!(CurrentPosition::from_signed(signed, 4).unwrap(), position);
        }
    }

    #[test]
    fn test_veto_only_counts_when_cancelable() {
        let listeners = CurrencyListeners::<String>::new();
        let asked = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let asked = asked.clone();
            listeners.add(Arc::new(CurrencyHooks::new().on_changing(move |_| {
                asked.fetch_add(1, Ordering::SeqCst);
                false
            })));
        }

        let mut event = CurrentChanging {
            candidate: None,
            candidate_position: CurrentPosition::AfterLast,
            pending_requests: 0,
            is_cancelable: true,
        };
        assert!(!listeners.query_changing(&event));
        assert_eq!(asked.load(Ordering::SeqCst), 2);

        event.is_cancelable = false;
        assert!(listeners.query_changing(&event));
    }

    #[test]
    fn test_listener_registration() {
        let listeners = CurrencyListeners::<String>::new();
        let id = listeners.add(Arc::new(CurrencyHooks::new()));
        assert_eq!(listeners.len(), 1);
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        assert_eq!(listeners.len(), 0);
    }
}
