//! Inclusion filtering.

use crate::error::{Result, ViewError};
use crate::item::{CollectionItem, ItemHandle, ViewItem};
use crate::source::FilterFn;

enum FilterMode<T> {
    Off,
    Predicate(FilterFn<T>),
    Expression { text: String, compiled: FilterFn<T> },
}

/// Decides which source items a view includes.
///
/// A stage holds at most one of two mutually exclusive filters: a predicate
/// supplied by the caller, or a custom expression compiled by the source.
/// The new-item placeholder and the item of an open add transaction always
/// pass.
pub struct FilterStage<T> {
    mode: FilterMode<T>,
}

impl<T: CollectionItem> Default for FilterStage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CollectionItem> FilterStage<T> {
    /// A stage that lets everything through.
    pub fn new() -> Self {
        Self {
            mode: FilterMode::Off,
        }
    }

    /// Returns `true` if any filter is configured.
    pub fn is_active(&self) -> bool {
        !matches!(self.mode, FilterMode::Off)
    }

    /// Returns `true` if a predicate filter is configured.
    pub fn has_predicate(&self) -> bool {
        matches!(self.mode, FilterMode::Predicate(_))
    }

    /// The custom expression, if one is configured.
    pub fn custom_expression(&self) -> Option<&str> {
        match &self.mode {
            FilterMode::Expression { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Installs a predicate filter, replacing any previous predicate.
    pub fn set_predicate(&mut self, predicate: FilterFn<T>) -> Result<()> {
        if let FilterMode::Expression { text, .. } = &self.mode {
            return Err(ViewError::configuration(format!(
                "cannot set a predicate filter while the custom filter '{text}' is active"
            )));
        }
        self.mode = FilterMode::Predicate(predicate);
        Ok(())
    }

    /// Installs a compiled custom expression, replacing any previous one.
    pub fn set_expression(&mut self, text: impl Into<String>, compiled: FilterFn<T>) -> Result<()> {
        if self.has_predicate() {
            return Err(ViewError::configuration(
                "cannot set a custom filter while a predicate filter is active",
            ));
        }
        self.mode = FilterMode::Expression {
            text: text.into(),
            compiled,
        };
        Ok(())
    }

    /// Removes the predicate filter. Returns `true` if one was set.
    pub fn clear_predicate(&mut self) -> bool {
        if self.has_predicate() {
            self.mode = FilterMode::Off;
            return true;
        }
        false
    }

    /// Removes the custom expression. Returns `true` if one was set.
    pub fn clear_expression(&mut self) -> bool {
        if self.custom_expression().is_some() {
            self.mode = FilterMode::Off;
            return true;
        }
        false
    }

    /// Tests an item against the configured filter.
    pub fn passes(&self, item: &T) -> bool {
        match &self.mode {
            FilterMode::Off => true,
            FilterMode::Predicate(predicate) => predicate(item),
            FilterMode::Expression { compiled, .. } => compiled(item),
        }
    }

    /// Tests an item handle.
    pub fn passes_handle(&self, item: &ItemHandle<T>) -> bool {
        !self.is_active() || self.passes(&item.read())
    }

    /// Tests a projection entry, exempting the placeholder and `adding`.
    pub fn passes_entry(&self, entry: &ViewItem<T>, adding: Option<&ItemHandle<T>>) -> bool {
        match entry {
            ViewItem::Placeholder => true,
            ViewItem::Item(handle) if adding.is_some_and(|a| a.ptr_eq(handle)) => true,
            ViewItem::Item(handle) => self.passes_handle(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Place, places};
    use std::sync::Arc;

    fn in_state(state: &'static str) -> FilterFn<Place> {
        Arc::new(move |p: &Place| p.state == state)
    }

    #[test]
    fn test_inactive_stage_passes_everything() {
        let stage = FilterStage::<Place>::new();
        assert!(!stage.is_active());
        assert!(places().iter().all(|p| stage.passes(p)));
    }

    #[test]
    fn test_modes_are_mutually_exclusive() {
        let mut stage = FilterStage::<Place>::new();
        stage.set_predicate(in_state("WA")).unwrap();
        assert!(matches!(
            stage.set_expression("State = 'OR'", in_state("OR")),
            Err(ViewError::Configuration(_))
        ));

        assert!(stage.clear_predicate());
        stage.set_expression("State = 'OR'", in_state("OR")).unwrap();
        assert!(matches!(stage.set_predicate(in_state("WA")), Err(ViewError::Configuration(_))));
        assert_eq!(stage.custom_expression(), Some("State = 'OR'"));
        assert!(!stage.clear_predicate());
        assert!(stage.clear_expression());
        assert!(!stage.is_active());
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let mut stage = FilterStage::<Place>::new();
        stage.set_predicate(in_state("CA")).unwrap();
        let once: Vec<Place> = places().into_iter().filter(|p| stage.passes(p)).collect();
        let twice: Vec<Place> = once.clone().into_iter().filter(|p| stage.passes(p)).collect();
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_placeholder_and_new_item_are_exempt() {
        let mut stage = FilterStage::<Place>::new();
        stage.set_predicate(in_state("WA")).unwrap();
        let fresh = ItemHandle::new(Place::default());
        let other = ItemHandle::new(Place::default());

        assert!(stage.passes_entry(&ViewItem::Placeholder, None));
        assert!(stage.passes_entry(&ViewItem::Item(fresh.clone()), Some(&fresh)));
        assert!(!stage.passes_entry(&ViewItem::Item(other), Some(&fresh)));
    }
}
