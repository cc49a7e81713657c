//! Tests for deferred refresh, declarative settings and the builder.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use horizon_views::prelude::*;

use common::{Place, names, place_list, record_changes, string_list, strings};

#[test]
fn test_nested_deferrals_refresh_once() {
    let list = string_list(4);
    let view = CollectionView::new(list.clone());
    let changes = record_changes(&view);

    {
        let _outer = view.defer_refresh().unwrap();
        view.add_sort_description(SortDescription::descending(".")).unwrap();
        {
            let _inner = view.defer_refresh().unwrap();
            view.set_filter(|s: &String| s != "Item0").unwrap();
        }
        assert!(changes.lock().is_empty());
        assert!(view.count().unwrap_err().is_invalid_state());
        assert_eq!(view.sort_descriptions().unwrap(), vec![SortDescription::descending(".")]);
    }

    assert_eq!(*changes.lock(), vec!["Reset"]);
    assert_eq!(strings(&view), ["Item3", "Item2", "Item1"]);
}

#[test]
fn test_reads_and_moves_fail_while_deferred() {
    let list = string_list(3);
    let view = CollectionView::new(list.clone());
    let scope = view.defer_refresh().unwrap();

    assert!(view.iter().err().unwrap().is_invalid_state());
    assert!(view.item_at(0).unwrap_err().is_invalid_state());
    assert!(view.current_item().unwrap_err().is_invalid_state());
    assert!(view.groups().unwrap_err().is_invalid_state());
    assert!(view.move_current_to_first().unwrap_err().is_invalid_state());
    assert!(view.add_new().unwrap_err().is_invalid_state());
    assert!(view.remove_at(0).unwrap_err().is_invalid_state());

    drop(scope);
    assert_eq!(view.count().unwrap(), 3);
    assert!(view.move_current_to_first().unwrap());
}

#[test]
fn test_source_changes_are_coalesced() {
    let list = string_list(5);
    let view = CollectionView::new(list.clone());
    view.move_current_to_position(2).unwrap();

    let pending = Arc::new(Mutex::new(Vec::new()));
    let sink = pending.clone();
    view.add_currency_listener(Arc::new(CurrencyHooks::new().on_changed(
        move |event: &CurrentChanged<String>| sink.lock().push(event.pending_requests),
    )));
    let changes = record_changes(&view);

    {
        let _scope = view.defer_refresh().unwrap();
        view.add_sort_description(SortDescription::descending(".")).unwrap();
        view.set_filter(|s: &String| s != "Item2").unwrap();
        list.push("Item5".to_string());
    }

    assert_eq!(*changes.lock(), vec!["Reset"]);
    assert_eq!(*pending.lock(), vec![3]);
    assert_eq!(strings(&view), ["Item5", "Item4", "Item3", "Item1", "Item0"]);
    assert_eq!(view.current_position().unwrap(), CurrentPosition::InRange(2));
}

#[test]
fn test_cannot_defer_during_a_transaction() {
    let list = string_list(2);
    let view = CollectionView::new(list.clone());
    view.add_new().unwrap();

    let err = view.defer_refresh().err().unwrap();
    assert!(err.is_invalid_state());

    view.commit_new().unwrap();
    let _scope = view.defer_refresh().unwrap();
}

#[test]
fn test_refresh_while_deferred_is_counted() {
    let list = string_list(2);
    let view = CollectionView::new(list.clone());
    let changes = record_changes(&view);

    {
        let _scope = view.defer_refresh().unwrap();
        view.refresh().unwrap();
        view.refresh().unwrap();
    }

    assert_eq!(*changes.lock(), vec!["Reset"]);
}

#[test]
fn test_apply_settings_refreshes_once() {
    let list = place_list();
    let view = CollectionView::new(list.clone());
    let changes = record_changes(&view);

    let settings = ViewSettings {
        sort: vec![SortDescription::descending("Name")],
        group_by: vec!["State".to_string()],
        placeholder: PlaceholderPosition::AtEnd,
        custom_filter: Some("Population > 200000".to_string()),
        ..ViewSettings::default()
    };
    view.apply_settings(&settings).unwrap();

    assert_eq!(*changes.lock(), vec!["Reset"]);
    assert_eq!(
        names(&view),
        ["Spokane", "Seattle", "San Diego", "Sacramento", "Portland", "<new>"]
    );
    assert_eq!(view.custom_filter().unwrap().as_deref(), Some("Population > 200000"));
}

#[test]
fn test_invalid_settings_change_nothing() {
    let list = place_list();
    let view = CollectionView::new(list.clone());
    view.set_filter(|p: &Place| p.state == "WA").unwrap();
    let changes = record_changes(&view);

    let grouped = ViewSettings {
        group_by: vec!["Zip".to_string()],
        ..ViewSettings::default()
    };
    assert!(matches!(
        view.apply_settings(&grouped).unwrap_err(),
        ViewError::Configuration(_)
    ));

    let filtered = ViewSettings {
        custom_filter: Some("State = 'OR'".to_string()),
        ..ViewSettings::default()
    };
    assert!(matches!(
        view.apply_settings(&filtered).unwrap_err(),
        ViewError::Configuration(_)
    ));

    let localized = ViewSettings {
        culture: Some("not a locale!".to_string()),
        ..ViewSettings::default()
    };
    assert!(view.apply_settings(&localized).is_err());

    assert!(changes.lock().is_empty());
    assert_eq!(view.count().unwrap(), 3);
}

#[test]
fn test_builder_configures_before_first_build() {
    let list = place_list();
    let view = CollectionViewBuilder::new(list.clone())
        .sort(SortDescription::ascending("State"))
        .sort(SortDescription::ascending("Name"))
        .filter(|p: &Place| p.population.unwrap_or(0) > 200_000)
        .placeholder(PlaceholderPosition::AtBeginning)
        .restore_current_on_reset(true)
        .build()
        .unwrap();

    assert_eq!(
        names(&view),
        ["<new>", "Sacramento", "San Diego", "Portland", "Seattle", "Spokane"]
    );
    assert!(view.restore_current_on_reset().unwrap());
    assert!(view.has_filter().unwrap());
    assert_eq!(view.sort_descriptions().unwrap().len(), 2);
}

#[test]
fn test_builder_reports_configuration_errors() {
    let list = place_list();
    let result = CollectionViewBuilder::new(list.clone())
        .sort(SortDescription::ascending("Zip"))
        .build();

    assert!(matches!(result.err().unwrap(), ViewError::Configuration(_)));
}
