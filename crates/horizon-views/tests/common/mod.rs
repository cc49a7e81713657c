//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use parking_lot::Mutex;

use horizon_views::prelude::*;

/// A city record with revertible edits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Place {
    pub name: String,
    pub state: String,
    pub population: Option<i64>,
    backup: Option<(String, String)>,
    pub hooks: Vec<&'static str>,
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

    fn natural_key(&self) -> Option<PropertyValue> {
        Some(self.name.clone().into())
    }

    fn begin_init(&mut self) {
        self.hooks.push("begin_init");
    }

    fn end_init(&mut self) {
        self.hooks.push("end_init");
    }

    fn begin_edit(&mut self) {
        self.hooks.push("begin_edit");
        self.backup = Some((self.name.clone(), self.state.clone()));
    }

    fn end_edit(&mut self) {
        self.hooks.push("end_edit");
        self.backup = None;
    }

    fn cancel_edit(&mut self) {
        self.hooks.push("cancel_edit");
        if let Some((name, state)) = self.backup.take() {
            self.name = name;
            self.state = state;
        }
    }

    fn supports_cancel_edit(&self) -> bool {
        true
    }
}

/// Installs a test subscriber once. Set `RUST_LOG` to see view logs.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn places() -> Vec<Place> {
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

pub fn place_list() -> Arc<ObservableList<Place>> {
    init_tracing();
    Arc::new(ObservableList::new(places()).with_default_factory())
}

/// `Item0`, `Item1`, ... with a default factory.
pub fn string_list(n: usize) -> Arc<ObservableList<String>> {
    init_tracing();
    Arc::new(ObservableList::new((0..n).map(|i| format!("Item{i}")).collect()).with_default_factory())
}

/// Text of every entry, `<new>` for the placeholder.
pub fn strings(view: &CollectionView<String>) -> Vec<String> {
    view.iter()
        .unwrap()
        .map(|entry| match entry.item() {
            Some(h) => h.read().clone(),
            None => "<new>".to_string(),
        })
        .collect()
}

/// Names of every entry, `<new>` for the placeholder.
pub fn names(view: &CollectionView<Place>) -> Vec<String> {
    view.iter()
        .unwrap()
        .map(|entry| match entry.item() {
            Some(h) => h.read().name.clone(),
            None => "<new>".to_string(),
        })
        .collect()
}

pub fn find(list: &ObservableList<Place>, name: &str) -> ItemHandle<Place> {
    list.items()
        .into_iter()
        .find(|h| h.read().name == name)
        .unwrap()
}

/// Records view changes as `Added(i)`, `Removed(i)` and `Reset`.
pub fn record_changes<T: CollectionItem>(view: &CollectionView<T>) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    view.signals()
        .collection_changed
        .connect(move |change| sink.lock().push(format!("{change:?}")));
    log
}

/// Records currency notifications as `changing(pos)` and `changed(pos)`.
pub fn record_currency<T: CollectionItem>(view: &CollectionView<T>) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let changing = log.clone();
    let changed = log.clone();
    view.add_currency_listener(Arc::new(
        CurrencyHooks::new()
            .on_changing(move |event: &CurrentChanging<T>| {
                changing
                    .lock()
                    .push(format!("changing({:?})", event.candidate_position));
                true
            })
            .on_changed(move |event: &CurrentChanged<T>| {
                changed.lock().push(format!("changed({:?})", event.position));
            }),
    ));
    log
}
