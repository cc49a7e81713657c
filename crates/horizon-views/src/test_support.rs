//! Fixtures shared by unit tests.

use std::sync::Arc;

use crate::item::{CollectionItem, ItemPropertyInfo, PropertyAccessor, ValueKind, accessor};
use crate::source::ObservableList;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Place {
    pub name: String,
    pub state: String,
    pub population: Option<i64>,
    backup: Option<(String, String)>,
    pub edits: Vec<&'static str>,
}

impl Place {
    pub fn new(name: &str, state: &str) -> Self {
        Self {
            name: name.to_string(),
            state: state.to_string(),
            ..Self::default()
        }
    }

    pub fn with_population(mut self, population: i64) -> Self {
        self.population = Some(population);
        self
    }
}

impl CollectionItem for Place {
    fn property_accessor(path: &str) -> Option<PropertyAccessor<Self>> {
        match path {
            "Name" => Some(accessor(|p: &Place| p.name.clone())),
            "State" => Some(accessor(|p: &Place| p.state.clone())),
            "Population" => Some(accessor(|p: &Place| p.population)),
            _ => None,
        }
    }

    fn item_properties() -> Vec<ItemPropertyInfo> {
        vec![
            ItemPropertyInfo::new("Name", ValueKind::String),
            ItemPropertyInfo::new("State", ValueKind::String),
            ItemPropertyInfo::new("Population", ValueKind::Int),
        ]
    }

    fn natural_key(&self) -> Option<crate::PropertyValue> {
        Some(self.name.clone().into())
    }

    fn begin_init(&mut self) {
        self.edits.push("begin_init");
    }

    fn end_init(&mut self) {
        self.edits.push("end_init");
    }

    fn begin_edit(&mut self) {
        self.edits.push("begin_edit");
        self.backup = Some((self.name.clone(), self.state.clone()));
    }

    fn end_edit(&mut self) {
        self.edits.push("end_edit");
        self.backup = None;
    }

    fn cancel_edit(&mut self) {
        self.edits.push("cancel_edit");
        if let Some((name, state)) = self.backup.take() {
            self.name = name;
            self.state = state;
        }
    }

    fn supports_cancel_edit(&self) -> bool {
        true
    }
}

/// The record set used throughout the tests.
pub(crate) fn places() -> Vec<Place> {
    vec![
        Place::new("Seattle", "WA").with_population(737_000),
        Place::new("Salem", "OR").with_population(175_000),
        Place::new("Redmond", "WA").with_population(73_000),
        Place::new("Sacramento", "CA").with_population(524_000),
        Place::new("Portland", "OR").with_population(652_000),
        Place::new("San Diego", "CA").with_population(1_386_000),
        Place::new("Spokane", "WA").with_population(228_000),
    ]
}

pub(crate) fn place_list() -> Arc<ObservableList<Place>> {
    Arc::new(ObservableList::new(places()).with_default_factory())
}

pub(crate) fn string_list(n: usize) -> Arc<ObservableList<String>> {
    Arc::new(
        ObservableList::new((0..n).map(|i| format!("Item{i}")).collect())
            .with_default_factory(),
    )
}
