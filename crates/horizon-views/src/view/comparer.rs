//! Item ordering from sort descriptions.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::culture::Culture;
use crate::error::Result;
use crate::item::{CollectionItem, ItemHandle, PropertyAccessor, ViewItem, resolve_accessor};
use crate::value::PropertyValue;

/// Sort direction of a [`SortDescription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// One level of a view's ordering: a property path and a direction.
///
/// An empty path (or `"."`) sorts by the item's natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescription {
    /// The property path to sort by.
    pub property: String,
    /// The direction.
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortDescription {
    /// Creates a sort description.
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            property: property.into(),
            direction,
        }
    }

    /// Ascending sort on `property`.
    pub fn ascending(property: impl Into<String>) -> Self {
        Self::new(property, SortDirection::Ascending)
    }

    /// Descending sort on `property`.
    pub fn descending(property: impl Into<String>) -> Self {
        Self::new(property, SortDirection::Descending)
    }
}

struct SortKey<T> {
    description: SortDescription,
    accessor: PropertyAccessor<T>,
}

impl<T> Clone for SortKey<T> {
    fn clone(&self) -> Self {
        Self {
            description: self.description.clone(),
            accessor: self.accessor.clone(),
        }
    }
}

/// Orders items by a chain of sort descriptions.
///
/// Descriptions are resolved to accessors when they are added, so an
/// unknown property path fails immediately with a configuration error.
/// Null values sort before everything else; values of different kinds are
/// ranked `Bool < Number < Text`; text is compared under the comparer's
/// [`Culture`].
///
/// # Example
///
/// ```
/// use std::cmp::Ordering;
/// use horizon_views::view::{ItemComparer, SortDescription};
///
/// let mut comparer = ItemComparer::<String>::new();
/// comparer.push(SortDescription::descending("")).unwrap();
/// assert_eq!(comparer.compare(&"a".into(), &"b".into()), Ordering::Greater);
/// ```
pub struct ItemComparer<T> {
    keys: Vec<SortKey<T>>,
    culture: Culture,
    natural_ordering: bool,
}

impl<T> Clone for ItemComparer<T> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            culture: self.culture.clone(),
            natural_ordering: self.natural_ordering,
        }
    }
}

impl<T: CollectionItem> Default for ItemComparer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CollectionItem> ItemComparer<T> {
    /// A comparer with no descriptions under the invariant culture.
    pub fn new() -> Self {
        Self::with_culture(Culture::invariant())
    }

    /// A comparer with no descriptions under `culture`.
    pub fn with_culture(culture: Culture) -> Self {
        Self {
            keys: Vec::new(),
            culture,
            natural_ordering: false,
        }
    }

    /// The active descriptions, primary first.
    pub fn descriptions(&self) -> Vec<SortDescription> {
        self.keys.iter().map(|k| k.description.clone()).collect()
    }

    /// Returns `true` if the comparer considers all items equal.
    pub fn is_unordered(&self) -> bool {
        self.keys.is_empty() && !self.natural_ordering
    }

    /// Appends a description as the lowest-priority tie-break.
    pub fn push(&mut self, description: SortDescription) -> Result<()> {
        let key = Self::resolve(description)?;
        self.keys.push(key);
        Ok(())
    }

    /// Replaces all descriptions. On error the comparer is unchanged.
    pub fn set(&mut self, descriptions: Vec<SortDescription>) -> Result<()> {
        let keys = descriptions
            .into_iter()
            .map(Self::resolve)
            .collect::<Result<Vec<_>>>()?;
        self.keys = keys;
        Ok(())
    }

    /// Removes all descriptions.
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    fn resolve(description: SortDescription) -> Result<SortKey<T>> {
        let accessor = resolve_accessor::<T>(&description.property)?;
        Ok(SortKey {
            description,
            accessor,
        })
    }

    /// The culture used for text keys.
    pub fn culture(&self) -> &Culture {
        &self.culture
    }

    /// Changes the culture used for text keys.
    pub fn set_culture(&mut self, culture: Culture) {
        self.culture = culture;
    }

    /// Whether items are compared by natural key when no description is set.
    pub fn natural_ordering(&self) -> bool {
        self.natural_ordering
    }

    /// Enables or disables natural-key ordering.
    pub fn set_natural_ordering(&mut self, enabled: bool) {
        self.natural_ordering = enabled;
    }

    /// Compares two items.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        if self.keys.is_empty() {
            if !self.natural_ordering {
                return Ordering::Equal;
            }
            let (ka, kb) = (a.natural_key().unwrap_or_default(), b.natural_key().unwrap_or_default());
            return self.compare_values(&ka, &kb);
        }

        for key in &self.keys {
            let ordering = self.compare_values(&(key.accessor)(a), &(key.accessor)(b));
            let ordering = match key.description.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Compares two item handles.
    pub fn compare_handles(&self, a: &ItemHandle<T>, b: &ItemHandle<T>) -> Ordering {
        if a.ptr_eq(b) {
            return Ordering::Equal;
        }
        self.compare(&a.read(), &b.read())
    }

    /// Compares two projection entries.
    ///
    /// Returns `None` when either side is the placeholder, which is placed
    /// structurally and never ordered.
    pub fn compare_entries(&self, a: &ViewItem<T>, b: &ViewItem<T>) -> Option<Ordering> {
        match (a, b) {
            (ViewItem::Item(a), ViewItem::Item(b)) => Some(self.compare_handles(a, b)),
            _ => None,
        }
    }

    /// Compares two property values under the comparer's culture.
    pub fn compare_values(&self, a: &PropertyValue, b: &PropertyValue) -> Ordering {
        a.compare_with(b, |x, y| self.culture.compare(x, y))
    }
}

impl<T> fmt::Debug for ItemComparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemComparer")
            .field(
                "descriptions",
                &self.keys.iter().map(|k| &k.description).collect::<Vec<_>>(),
            )
            .field("culture", &self.culture)
            .field("natural_ordering", &self.natural_ordering)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewError;
    use crate::test_support::Place;

    fn sorted(comparer: &ItemComparer<Place>, mut places: Vec<Place>) -> Vec<String> {
        places.sort_by(|a, b| comparer.compare(a, b));
        places.into_iter().map(|p| p.name).collect()
    }

    #[test]
    fn test_unknown_property_rejected_on_push() {
        let mut comparer = ItemComparer::<Place>::new();
        let err = comparer.push(SortDescription::ascending("Zip")).err().unwrap();
        assert!(matches!(err, ViewError::Configuration(_)));
        assert!(comparer.descriptions().is_empty());
    }

    #[test]
    fn test_set_is_all_or_nothing() {
        let mut comparer = ItemComparer::<Place>::new();
        comparer.push(SortDescription::ascending("Name")).unwrap();
        let result = comparer.set(vec![
            SortDescription::ascending("State"),
            SortDescription::ascending("Nope"),
        ]);
        assert!(result.is_err());
        assert_eq!(comparer.descriptions(), vec![SortDescription::ascending("Name")]);
    }

    #[test]
    fn test_tie_break_chain() {
        let mut comparer = ItemComparer::<Place>::new();
        comparer
            .set(vec![
                SortDescription::ascending("State"),
                SortDescription::descending("Name"),
            ])
            .unwrap();
        let names = sorted(
            &comparer,
            vec![
                Place::new("Salem", "OR"),
                Place::new("Seattle", "WA"),
                Place::new("Portland", "OR"),
                Place::new("Redmond", "WA"),
            ],
        );
        assert_eq!(names, vec!["Salem", "Portland", "Seattle", "Redmond"]);
    }

    #[test]
    fn test_nulls_first() {
        let mut comparer = ItemComparer::<Place>::new();
        comparer.push(SortDescription::ascending("Population")).unwrap();
        let names = sorted(
            &comparer,
            vec![
                Place::new("Big", "WA").with_population(10),
                Place::new("Unknown", "WA"),
                Place::new("Small", "WA").with_population(1),
            ],
        );
        assert_eq!(names, vec!["Unknown", "Small", "Big"]);
    }

    #[test]
    fn test_empty_comparer_is_unordered() {
        let comparer = ItemComparer::<String>::new();
        assert!(comparer.is_unordered());
        assert_eq!(comparer.compare(&"b".into(), &"a".into()), Ordering::Equal);
    }

    #[test]
    fn test_natural_ordering() {
        let mut comparer = ItemComparer::<String>::new();
        comparer.set_natural_ordering(true);
        assert!(!comparer.is_unordered());
        assert_eq!(comparer.compare(&"b".into(), &"a".into()), Ordering::Greater);
    }

    #[test]
    fn test_placeholder_is_absent_from_comparison() {
        let comparer = ItemComparer::<String>::new();
        let item = ViewItem::Item(ItemHandle::new("x".to_string()));
        assert_eq!(comparer.compare_entries(&ViewItem::Placeholder, &item), None);
        assert_eq!(
            comparer.compare_entries(&ViewItem::Placeholder, &ViewItem::Placeholder),
            None
        );
        assert_eq!(comparer.compare_entries(&item, &item), Some(Ordering::Equal));
    }

    #[test]
    fn test_text_uses_culture() {
        let mut comparer = ItemComparer::<Place>::with_culture(Culture::new("en-US").unwrap());
        comparer.push(SortDescription::ascending("Name")).unwrap();
        let names = sorted(
            &comparer,
            vec![Place::new("beta", "WA"), Place::new("Alpha", "WA"), Place::new("Gamma", "WA")],
        );
        assert_eq!(names, vec!["Alpha", "beta", "Gamma"]);
    }
}
