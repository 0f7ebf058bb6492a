use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, TimeZone};
use serde_json::{json, Value};

use gridkit::config::GridConfig;
use gridkit::io::csv_export::DownloadsDir;
use gridkit::io::storage::MemoryStorage;
use gridkit::state::column::{Column, ColumnType, Pinned};
use gridkit::state::edit::{CommitTrigger, RowsChanged};
use gridkit::state::filter::{FilterOp, FilterSpec};
use gridkit::state::grid::{DataGrid, GridEvents, GridOptions, StorePublisher};
use gridkit::state::row;
use gridkit::state::selection::{CellRef, Modifiers, Selection, SelectionMode};
use gridkit::state::store::Store;
use gridkit::state::view_state::GridInstance;
use gridkit::state::viewport::Viewport;

#[derive(Default)]
struct Recorder {
    rows: Vec<RowsChanged>,
    selections: Vec<Selection>,
}

impl GridEvents for Recorder {
    fn on_rows_changed(&mut self, change: &RowsChanged) {
        self.rows.push(change.clone());
    }

    fn on_selection_changed(&mut self, selection: &Selection) {
        self.selections.push(selection.clone());
    }
}

fn age_columns() -> Vec<Column> {
    vec![
        Column::new("name", ColumnType::String),
        Column::new("age", ColumnType::Integer),
    ]
}

fn age_grid_with<E: GridEvents>(
    storage: Arc<MemoryStorage>,
    options: GridOptions,
    events: E,
) -> DataGrid<E> {
    let columns = age_columns();
    let rows = row::rows_from_values(
        &[
            vec![json!("ann"), json!(5)],
            vec![json!("bob"), json!(30)],
            vec![json!("cy"), json!(2)],
        ],
        None,
        &columns,
    );
    DataGrid::new(
        GridInstance::new("grid-1", "data_editor"),
        columns,
        rows,
        storage,
        GridConfig::default(),
        options,
        events,
    )
}

fn age_grid(options: GridOptions) -> DataGrid<Recorder> {
    age_grid_with(Arc::new(MemoryStorage::new()), options, Recorder::default())
}

fn editable_options() -> GridOptions {
    GridOptions {
        selection_mode: SelectionMode::parse(["multi-row"]).unwrap(),
        editable: true,
        live_columns: BTreeSet::from(["name".to_string()]),
    }
}

#[test]
fn test_sort_then_filter_display_order() {
    let mut grid = age_grid(GridOptions::default());
    assert_eq!(grid.display_positions(), vec![0, 1, 2]);

    assert!(grid.toggle_sort("age", false));
    assert_eq!(grid.display_positions(), vec![2, 0, 1]);

    assert!(grid.add_filter(FilterSpec::new("age", FilterOp::Gte, json!(10))));
    assert_eq!(grid.display_positions(), vec![1]);

    assert!(grid.clear_filters());
    assert!(grid.set_search("N"));
    assert_eq!(grid.display_positions(), vec![0]);
    assert_eq!(grid.display_row(0).unwrap().row_id, "row-0");
}

#[test]
fn test_filters_on_same_column_are_anded() {
    let mut grid = age_grid(GridOptions::default());
    assert!(grid.add_filter(FilterSpec::new("name", FilterOp::NotContains, json!("b"))));
    assert!(grid.add_filter(FilterSpec::new("name", FilterOp::NotContains, json!("c"))));

    assert_eq!(grid.view().filters.len(), 2);
    assert_eq!(grid.display_positions(), vec![0]);
}

#[test]
fn test_row_clicks_translate_display_index_and_sort_clears() {
    let mut grid = age_grid(editable_options());
    grid.toggle_sort("age", false);

    assert!(grid.click_row(0, Modifiers::NONE));
    assert_eq!(grid.selection().rows, BTreeSet::from([2]));

    assert!(grid.toggle_sort("age", false));
    assert!(grid.selection().rows.is_empty());
    assert_eq!(grid.events().selections.len(), 2);
    assert!(!grid.click_row(10, Modifiers::NONE));
}

#[test]
fn test_cell_rectangle_uses_display_order() {
    let options = GridOptions {
        selection_mode: SelectionMode::parse(["multi-cell"]).unwrap(),
        ..GridOptions::default()
    };
    let mut grid = age_grid(options);
    grid.toggle_sort("age", true);

    grid.click_cell(0, "name", Modifiers::NONE);
    grid.click_cell(1, "age", Modifiers::SHIFT);
    let expected = BTreeSet::from([
        CellRef::new(2, "name"),
        CellRef::new(2, "age"),
        CellRef::new(0, "name"),
        CellRef::new(0, "age"),
    ]);
    assert_eq!(grid.selection().cells, expected);
}

#[test]
fn test_live_edit_commits_after_debounce() {
    let mut grid = age_grid(editable_options());
    let t0 = Instant::now();

    let key = grid.begin_edit(1, "name").unwrap();
    assert_eq!(grid.edit_buffer(&key), Some("bob"));
    grid.edit_input(&key, "bo", t0);
    grid.edit_input(&key, "bobby", t0 + Duration::from_millis(100));

    assert_eq!(grid.tick(t0 + Duration::from_millis(300)), 0);
    assert_eq!(grid.tick(t0 + Duration::from_millis(350)), 1);

    let change = grid.events().rows.last().unwrap();
    assert!(change.should_reprocess);
    assert_eq!(change.rows[1], vec![json!("bobby"), json!(30)]);
    assert!(change.index.is_none());

    assert!(grid.commit_edit(&key, CommitTrigger::Blur));
    assert_eq!(grid.events().rows.len(), 2);
    assert!(!grid.events().rows[1].should_reprocess);
}

#[test]
fn test_invalid_edit_keeps_previous_value() {
    let mut grid = age_grid(editable_options());
    let key = grid.begin_edit(0, "age").unwrap();
    grid.edit_input(&key, "old", Instant::now());
    assert!(grid.commit_edit(&key, CommitTrigger::Enter));

    let change = grid.events().rows.last().unwrap();
    assert!(!change.should_reprocess);
    assert_eq!(change.rows[0][1], json!(5));
}

#[test]
fn test_escape_and_read_only_grid() {
    let mut grid = age_grid(editable_options());
    let key = grid.begin_edit(0, "name").unwrap();
    grid.edit_input(&key, "zed", Instant::now());
    assert!(grid.cancel_edit(&key));
    assert_eq!(grid.tick(Instant::now() + Duration::from_secs(1)), 0);
    assert!(grid.events().rows.is_empty());

    let mut read_only = age_grid(GridOptions::default());
    assert!(read_only.begin_edit(0, "name").is_none());
    assert!(read_only.add_row().is_none());
}

#[test]
fn test_add_and_delete_rows() {
    let mut grid = age_grid(editable_options());
    grid.click_row(2, Modifiers::NONE);

    let row_id = grid.add_row().unwrap();
    assert_eq!(grid.display_len(), 4);
    assert_eq!(grid.events().rows.last().unwrap().rows[3], vec![Value::Null, Value::Null]);

    assert!(grid.delete_row("row-0"));
    assert_eq!(grid.display_len(), 3);
    assert!(grid.selection().rows.is_empty());
    assert_eq!(grid.rows()[2].row_id, row_id);
    assert!(grid.events().rows.last().unwrap().should_reprocess);
}

#[test]
fn test_delete_row_keeps_edits_on_surviving_rows() {
    let mut grid = age_grid(editable_options());
    let t0 = Instant::now();
    let kept = grid.begin_edit(0, "name").unwrap();
    grid.edit_input(&kept, "ANN", t0);
    let doomed = grid.begin_edit(2, "name").unwrap();
    grid.edit_input(&doomed, "CY", t0);

    assert!(grid.delete_row("row-2"));
    assert_eq!(grid.edit_buffer(&kept), Some("ANN"));
    assert_eq!(grid.edit_buffer(&doomed), None);

    assert!(grid.commit_edit(&kept, CommitTrigger::Enter));
    assert_eq!(grid.rows()[0].cells[0].canonical_string(), "ANN");
    assert_eq!(grid.tick(t0 + Duration::from_secs(1)), 0);
}

#[test]
fn test_selection_mode_change_normalizes_selection() {
    let mut grid = age_grid(editable_options());
    grid.click_row(0, Modifiers::NONE);
    grid.click_row(2, Modifiers::NONE);
    assert_eq!(grid.selection().rows, BTreeSet::from([0, 2]));

    assert!(grid.set_selection_mode(SelectionMode::parse(["single-row"]).unwrap()));
    assert_eq!(grid.selection().rows, BTreeSet::from([0]));
    assert_eq!(grid.events().selections.last().unwrap().rows, BTreeSet::from([0]));

    assert!(grid.set_selection_mode(SelectionMode::parse(["single-column"]).unwrap()));
    assert!(grid.selection().rows.is_empty());
}

#[test]
fn test_view_state_survives_remount() {
    let storage = Arc::new(MemoryStorage::new());
    {
        let mut grid = age_grid_with(storage.clone(), GridOptions::default(), Recorder::default());
        grid.toggle_sort("age", false);
        grid.pin_column("age", Some(Pinned::Left));
        grid.set_column_hidden("name", true);
        let t0 = Instant::now();
        grid.scroll(Viewport::new(70.0, 35.0), 0.0, t0);
        grid.tick(t0 + Duration::from_secs(1));
        grid.teardown();
    }

    let grid = age_grid_with(storage, GridOptions::default(), Recorder::default());
    assert_eq!(grid.display_positions(), vec![2, 0, 1]);
    assert_eq!(grid.layout().names(), vec!["age"]);
    assert_eq!(grid.layout().columns[0].pinned, Pinned::Left);
    assert_eq!(grid.view().scroll_top, 35.0);
}

#[test]
fn test_column_operations_relayout() {
    let mut grid = age_grid(GridOptions::default());
    assert!(grid.move_column("age", 0));
    assert_eq!(grid.layout().names(), vec!["age", "name"]);
    assert!(grid.resize_column("name", Some(333.0)));
    assert_eq!(grid.layout().columns[1].width_px, 333.0);
    assert!(grid.reset_view());
    assert_eq!(grid.layout().names(), vec!["name", "age"]);
}

#[test]
fn test_scroll_schedules_render_window() {
    let mut grid = age_grid(GridOptions::default());
    let window = grid.scroll(Viewport::new(70.0, 35.0), 0.0, Instant::now());
    assert_eq!(window.visible, 1..3);
    assert_eq!(window.render, 0..3);
    assert_eq!(window.total_height, 105.0);
    assert_eq!(grid.row_offset(2), 70.0);
}

#[test]
fn test_export_displayed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut grid = age_grid(GridOptions::default());
    grid.toggle_sort("age", false);
    grid.toggle_sort("age", false);

    assert_eq!(grid.to_csv().unwrap(), "name,age\nbob,30\nann,5\ncy,2");

    let now = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let path = grid.export_csv(&DownloadsDir::new(dir.path()), now).unwrap();
    assert_eq!(path.file_name().unwrap(), "data-20240102-030405.csv");
    assert_eq!(std::fs::read_to_string(path).unwrap(), grid.to_csv().unwrap());
}

#[test]
fn test_store_publisher_receives_outputs() {
    let store: Store<String, Value> = Store::new();
    let publisher = StorePublisher::new(store.clone(), "grid-1");
    let selection_key = publisher.selection_key();
    let rows_key = publisher.rows_key();
    let mut grid = age_grid_with(Arc::new(MemoryStorage::new()), editable_options(), publisher);

    grid.click_row(1, Modifiers::NONE);
    assert_eq!(
        store.get(&selection_key),
        Some(json!({"rows": [1], "columns": [], "cells": []}))
    );

    let key = grid.begin_edit(2, "age").unwrap();
    grid.edit_input(&key, "3", Instant::now());
    grid.commit_edit(&key, CommitTrigger::Enter);
    let published = store.get(&rows_key).unwrap();
    assert_eq!(published["shouldReprocess"], json!(true));
    assert_eq!(published["rows"][2], json!(["cy", 3]));
}
