//! Invariants that hold for every view configuration, checked after each
//! step of a mixed sequence of source changes, moves and transactions.

mod common;

use std::sync::Arc;

use horizon_views::prelude::*;

use common::{Place, names, place_list};

type Build = fn(Arc<ObservableList<Place>>) -> Arc<CollectionView<Place>>;

fn size(place: &Place) -> &'static str {
    if place.population.unwrap_or(0) > 500_000 { "large" } else { "small" }
}

fn plain(list: Arc<ObservableList<Place>>) -> Arc<CollectionView<Place>> {
    CollectionView::new(list)
}

fn sorted(list: Arc<ObservableList<Place>>) -> Arc<CollectionView<Place>> {
    CollectionViewBuilder::new(list)
        .sort(SortDescription::descending("Name"))
        .build()
        .unwrap()
}

fn filtered(list: Arc<ObservableList<Place>>) -> Arc<CollectionView<Place>> {
    CollectionViewBuilder::new(list)
        .filter(|p: &Place| p.population.unwrap_or(0) > 200_000)
        .build()
        .unwrap()
}

fn sorted_and_filtered(list: Arc<ObservableList<Place>>) -> Arc<CollectionView<Place>> {
    CollectionViewBuilder::new(list)
        .sort(SortDescription::ascending("State"))
        .sort(SortDescription::ascending("Name"))
        .filter(|p: &Place| !p.name.starts_with('R'))
        .build()
        .unwrap()
}

fn grouped(list: Arc<ObservableList<Place>>) -> Arc<CollectionView<Place>> {
    CollectionViewBuilder::new(list)
        .sort(SortDescription::ascending("Name"))
        .group_by(GroupDescription::by_property("State").unwrap())
        .build()
        .unwrap()
}

fn nested_groups(list: Arc<ObservableList<Place>>) -> Arc<CollectionView<Place>> {
    CollectionViewBuilder::new(list)
        .group_by(GroupDescription::by_property("State").unwrap())
        .group_by(GroupDescription::by_key("Size", size))
        .build()
        .unwrap()
}

fn custom_filter_with_groups(list: Arc<ObservableList<Place>>) -> Arc<CollectionView<Place>> {
    CollectionViewBuilder::new(list)
        .sort(SortDescription::descending("Population"))
        .custom_filter("State <> 'CA'")
        .group_by(GroupDescription::by_property("State").unwrap())
        .build()
        .unwrap()
}

fn placeholder_first(list: Arc<ObservableList<Place>>) -> Arc<CollectionView<Place>> {
    CollectionViewBuilder::new(list)
        .sort(SortDescription::ascending("Name"))
        .placeholder(PlaceholderPosition::AtBeginning)
        .build()
        .unwrap()
}

fn placeholder_last_with_groups(list: Arc<ObservableList<Place>>) -> Arc<CollectionView<Place>> {
    CollectionViewBuilder::new(list)
        .group_by(GroupDescription::by_property("State").unwrap())
        .placeholder(PlaceholderPosition::AtEnd)
        .build()
        .unwrap()
}

fn natural_ordering(list: Arc<ObservableList<Place>>) -> Arc<CollectionView<Place>> {
    CollectionViewBuilder::new(list)
        .natural_ordering(true)
        .restore_current_on_reset(true)
        .build()
        .unwrap()
}

const CONFIGURATIONS: &[(&str, Build)] = &[
    ("plain", plain),
    ("sorted", sorted),
    ("filtered", filtered),
    ("sorted and filtered", sorted_and_filtered),
    ("grouped", grouped),
    ("nested groups", nested_groups),
    ("custom filter with groups", custom_filter_with_groups),
    ("placeholder first", placeholder_first),
    ("placeholder last with groups", placeholder_last_with_groups),
    ("natural ordering", natural_ordering),
];

#[derive(Debug, Clone, Copy)]
enum Step {
    Push(&'static str, &'static str, i64),
    Insert(usize, &'static str, &'static str, i64),
    Remove(&'static str),
    Replace(&'static str, &'static str, &'static str, i64),
    First,
    Last,
    Next,
    Previous,
    To(isize),
    AddNew,
    CommitNew,
    CancelNew,
    Rename(&'static str, &'static str),
    Edit(&'static str),
    CancelEdit,
    RemoveCurrent,
}

const STEPS: &[Step] = &[
    Step::Last,
    Step::Push("Aberdeen", "WA", 17_000),
    Step::Previous,
    Step::Remove("Portland"),
    Step::First,
    Step::Next,
    Step::AddNew,
    Step::Next,
    Step::Push("Eugene", "OR", 176_000),
    Step::CommitNew,
    Step::To(2),
    Step::Edit("Seattle"),
    Step::AddNew,
    Step::Edit("Salem"),
    Step::CancelEdit,
    Step::Rename("Spokane", "Bellingham"),
    Step::Insert(0, "Anaheim", "CA", 346_000),
    Step::RemoveCurrent,
    Step::Replace("San Diego", "Fresno", "CA", 542_000),
    Step::AddNew,
    Step::CancelNew,
    Step::Last,
    Step::Remove("Redmond"),
    Step::Next,
    Step::Previous,
    Step::Rename("Aberdeen", "Yakima"),
    Step::To(-1),
    Step::Remove("Sacramento"),
    Step::Push("Bend", "OR", 99_000),
    Step::Last,
    Step::RemoveCurrent,
];

fn lookup(list: &ObservableList<Place>, name: &str) -> Option<ItemHandle<Place>> {
    list.items().into_iter().find(|h| h.read().name == name)
}

fn source_index(list: &ObservableList<Place>, name: &str) -> Option<usize> {
    list.items().iter().position(|h| h.read().name == name)
}

/// Runs one step. Steps the view may refuse, such as removal during a
/// transaction, are allowed to fail.
fn run(view: &CollectionView<Place>, list: &ObservableList<Place>, step: Step) {
    match step {
        Step::Push(name, state, population) => {
            list.push(Place::new(name, state).with_population(population));
        }
        Step::Insert(at, name, state, population) => {
            list.insert_value(at, Place::new(name, state).with_population(population))
                .unwrap();
        }
        Step::Remove(name) => {
            if let Some(item) = lookup(list, name) {
                list.remove_item(&item);
            }
        }
        Step::Replace(name, with, state, population) => {
            if let Some(index) = source_index(list, name) {
                list.replace(index, Place::new(with, state).with_population(population));
            }
        }
        Step::First => {
            view.move_current_to_first().unwrap();
        }
        Step::Last => {
            view.move_current_to_last().unwrap();
        }
        Step::Next => {
            view.move_current_to_next().unwrap();
        }
        Step::Previous => {
            view.move_current_to_previous().unwrap();
        }
        Step::To(position) => {
            let _ = view.move_current_to_position(position);
        }
        Step::AddNew => {
            view.add_new().unwrap();
        }
        Step::CommitNew => view.commit_new().unwrap(),
        Step::CancelNew => view.cancel_new().unwrap(),
        Step::Rename(name, to) => {
            if let Some(item) = lookup(list, name) {
                view.edit_item(&ViewItem::from(item.clone())).unwrap();
                item.write().name = to.to_string();
                view.commit_edit().unwrap();
            }
        }
        Step::Edit(name) => {
            if let Some(item) = lookup(list, name) {
                view.edit_item(&ViewItem::from(item)).unwrap();
            }
        }
        Step::CancelEdit => view.cancel_edit().unwrap(),
        Step::RemoveCurrent => {
            if let CurrentPosition::InRange(position) = view.current_position().unwrap() {
                let _ = view.remove_at(position);
            }
        }
    }
}

fn group_keys(view: &CollectionView<Place>) -> Vec<String> {
    view.groups()
        .unwrap()
        .iter()
        .filter_map(GroupEntry::as_group)
        .map(|group| group.key().to_string())
        .collect()
}

fn assert_invariants(view: &CollectionView<Place>, context: &str) {
    let count = view.count().unwrap();

    for position in 0..count {
        let entry = view.item_at(position).unwrap();
        assert_eq!(view.index_of(&entry).unwrap(), Some(position), "{context}: round trip at {position}");
        assert!(view.passes_filter(&entry).unwrap(), "{context}: shown entry fails the filter");
    }

    let position = view.current_position().unwrap();
    let sentinels = [
        view.is_current_before_first().unwrap(),
        view.is_current_in_view().unwrap(),
        view.is_current_after_last().unwrap(),
    ];
    assert_eq!(sentinels.iter().filter(|&&flag| flag).count(), 1, "{context}: {position:?}");
    match position {
        CurrentPosition::InRange(index) => {
            assert!(index < count, "{context}: current index {index} of {count}");
            assert_eq!(view.current_item().unwrap(), Some(view.item_at(index).unwrap()), "{context}");
        }
        _ => assert_eq!(view.current_item().unwrap(), None, "{context}"),
    }

    let adding = view.is_adding_new().unwrap();
    let editing = view.is_editing_item().unwrap();
    assert!(!(adding && editing), "{context}: two transactions open");
    assert_eq!(view.current_add_item().unwrap().is_some(), adding, "{context}");
    assert_eq!(view.current_edit_item().unwrap().is_some(), editing, "{context}");
    let expected = match (adding, editing) {
        (true, _) => TransactionKind::Adding,
        (_, true) => TransactionKind::Editing,
        _ => TransactionKind::Idle,
    };
    assert_eq!(view.transaction_kind().unwrap(), expected, "{context}");

    if expected == TransactionKind::Idle {
        let before = (names(view), group_keys(view));
        view.refresh().unwrap();
        assert_eq!((names(view), group_keys(view)), before, "{context}: refresh changed the view");
    }
}

#[test]
fn test_round_trip_holds_in_every_configuration() {
    for &(name, build) in CONFIGURATIONS {
        let list = place_list();
        let view = build(list.clone());
        assert_invariants(&view, name);

        view.add_new().unwrap();
        assert_invariants(&view, &format!("{name}, adding"));
    }
}

#[test]
fn test_invariants_survive_mixed_steps() {
    for &(name, build) in CONFIGURATIONS {
        let list = place_list();
        let view = build(list.clone());
        for (number, step) in STEPS.iter().enumerate() {
            run(&view, &list, *step);
            assert_invariants(&view, &format!("{name}, step {number} {step:?}"));
        }
    }
}

#[test]
fn test_reapplying_a_filter_changes_nothing() {
    fn large(place: &Place) -> bool {
        place.population.unwrap_or(0) > 200_000
    }

    for &(name, build) in CONFIGURATIONS {
        let list = place_list();
        let view = build(list.clone());
        if view.custom_filter().unwrap().is_some() {
            let expression = view.custom_filter().unwrap().unwrap_or_default();
            let once = names(&view);
            view.set_custom_filter(&expression).unwrap();
            assert_eq!(names(&view), once, "{name}");
            continue;
        }

        view.clear_filter().unwrap();
        view.set_filter(large).unwrap();
        let once = (names(&view), group_keys(&view));
        view.set_filter(large).unwrap();
        assert_eq!((names(&view), group_keys(&view)), once, "{name}");
    }
}
