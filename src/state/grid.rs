use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

use crate::config::GridConfig;
use crate::io::csv_export::{self, ExportError, SaveBytes};
use crate::io::storage::ViewStorage;
use crate::state::column::{Column, ColumnIndex, Pinned};
use crate::state::edit::{CellKey, CommitTrigger, EditPipeline, EditableRows, RowsChanged};
use crate::state::filter::{self, FilterSpec};
use crate::state::layout::{self, ColumnLayout};
use crate::state::row::Row;
use crate::state::selection::{
    CellRef, Modifiers, Selection, SelectionController, SelectionMode, VisualOrder,
};
use crate::state::sort::{self, SortSpec};
use crate::state::store::Store;
use crate::state::view_state::{GridInstance, ViewState, ViewStateStore};
use crate::state::viewport::{RenderWindow, Viewport, VirtualRowScheduler};

/// Outputs of a grid instance.
pub trait GridEvents {
    fn on_rows_changed(&mut self, change: &RowsChanged);
    fn on_selection_changed(&mut self, selection: &Selection);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEvents;

impl GridEvents for NoEvents {
    fn on_rows_changed(&mut self, _change: &RowsChanged) {}
    fn on_selection_changed(&mut self, _selection: &Selection) {}
}

/// Publishes grid outputs into a shared store under `<instance>.selection`
/// and `<instance>.rows`.
#[derive(Clone)]
pub struct StorePublisher {
    store: Store<String, Value>,
    instance_id: String,
}

impl StorePublisher {
    pub fn new(store: Store<String, Value>, instance_id: impl Into<String>) -> Self {
        Self {
            store,
            instance_id: instance_id.into(),
        }
    }

    pub fn selection_key(&self) -> String {
        format!("{}.selection", self.instance_id)
    }

    pub fn rows_key(&self) -> String {
        format!("{}.rows", self.instance_id)
    }
}

impl GridEvents for StorePublisher {
    fn on_rows_changed(&mut self, change: &RowsChanged) {
        let value = json!({
            "rows": change.rows,
            "index": change.index,
            "shouldReprocess": change.should_reprocess,
        });
        self.store.set(self.rows_key(), value);
    }

    fn on_selection_changed(&mut self, selection: &Selection) {
        match serde_json::to_value(selection) {
            Ok(value) => {
                self.store.set(self.selection_key(), value);
            }
            Err(err) => tracing::warn!(error = %err, "failed to encode selection"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct GridOptions {
    pub selection_mode: SelectionMode,
    pub editable: bool,
    /// Columns whose edits commit on the debounce timer while typing.
    pub live_columns: BTreeSet<String>,
}

/// One local grid instance: runs search/filter, sort and layout whenever
/// their inputs change and routes gestures to selection and editing.
pub struct DataGrid<E: GridEvents> {
    instance: GridInstance,
    config: GridConfig,
    column_index: ColumnIndex,
    data: EditableRows,
    view: ViewStateStore,
    selection: SelectionController,
    edits: EditPipeline,
    scheduler: VirtualRowScheduler,
    editable: bool,
    display: Vec<usize>,
    layout: ColumnLayout,
    events: E,
}

impl<E: GridEvents> DataGrid<E> {
    pub fn new(
        instance: GridInstance,
        columns: Vec<Column>,
        rows: Vec<Row>,
        storage: Arc<dyn ViewStorage>,
        config: GridConfig,
        options: GridOptions,
        events: E,
    ) -> Self {
        let view = ViewStateStore::open(
            storage,
            &instance,
            &columns,
            config.scroll_persist_debounce(),
        );
        let mut grid = Self {
            column_index: ColumnIndex::new(&columns),
            scheduler: VirtualRowScheduler::new(config.row_height, config.overscan_rows),
            edits: EditPipeline::new(config.edit_debounce(), options.live_columns),
            selection: SelectionController::new(options.selection_mode),
            editable: options.editable,
            data: EditableRows::new(columns, rows),
            view,
            instance,
            config,
            display: Vec::new(),
            layout: ColumnLayout::default(),
            events,
        };
        grid.refresh();
        grid
    }

    pub fn instance(&self) -> &GridInstance {
        &self.instance
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn columns(&self) -> &[Column] {
        self.data.columns()
    }

    pub fn rows(&self) -> &[Row] {
        self.data.rows()
    }

    pub fn view(&self) -> &ViewState {
        self.view.state()
    }

    pub fn view_store(&self) -> &ViewStateStore {
        &self.view
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn selection(&self) -> &Selection {
        self.selection.current()
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    /// Original positions in display order.
    pub fn display_positions(&self) -> Vec<usize> {
        self.display
            .iter()
            .filter_map(|idx| self.data.rows().get(*idx))
            .map(|row| row.original_position)
            .collect()
    }

    pub fn display_len(&self) -> usize {
        self.display.len()
    }

    pub fn display_row(&self, index: usize) -> Option<&Row> {
        self.display
            .get(index)
            .and_then(|idx| self.data.rows().get(*idx))
    }

    /// Records the scroll position and returns the rows to materialize.
    pub fn scroll(&mut self, viewport: Viewport, scroll_left: f64, now: Instant) -> RenderWindow {
        self.view.set_scroll(viewport.scroll_top, scroll_left, now);
        self.render_window(viewport)
    }

    pub fn render_window(&self, viewport: Viewport) -> RenderWindow {
        self.scheduler.schedule(self.display.len(), viewport)
    }

    pub fn row_offset(&self, display_index: usize) -> f64 {
        self.scheduler.row_offset(display_index)
    }

    pub fn set_search(&mut self, query: &str) -> bool {
        let changed = self.view.set_search(query);
        if changed {
            self.refresh();
        }
        changed
    }

    pub fn toggle_sort(&mut self, column: &str, multi: bool) -> bool {
        let changed = self.view.toggle_sort(column, multi);
        if changed {
            self.after_sort_change();
        }
        changed
    }

    pub fn set_sorts(&mut self, sorts: Vec<SortSpec>) -> bool {
        let changed = self.view.set_sorts(sorts);
        if changed {
            self.after_sort_change();
        }
        changed
    }

    pub fn add_filter(&mut self, filter: FilterSpec) -> bool {
        let changed = self.view.add_filter(filter);
        if changed {
            self.refresh();
        }
        changed
    }

    pub fn remove_filter(&mut self, id: &str) -> bool {
        let changed = self.view.remove_filter(id);
        if changed {
            self.refresh();
        }
        changed
    }

    pub fn clear_filters(&mut self) -> bool {
        let changed = self.view.clear_filters();
        if changed {
            self.refresh();
        }
        changed
    }

    pub fn set_column_hidden(&mut self, column: &str, hidden: bool) -> bool {
        let changed = self.view.set_hidden(column, hidden);
        if changed {
            self.relayout();
        }
        changed
    }

    pub fn resize_column(&mut self, column: &str, width: Option<f64>) -> bool {
        let changed = self.view.set_manual_width(column, width);
        if changed {
            self.relayout();
        }
        changed
    }

    pub fn pin_column(&mut self, column: &str, pinned: Option<Pinned>) -> bool {
        let changed = self.view.set_pinned(column, pinned);
        if changed {
            self.relayout();
        }
        changed
    }

    pub fn move_column(&mut self, column: &str, to_index: usize) -> bool {
        let changed = self.view.move_column(column, to_index);
        if changed {
            self.relayout();
        }
        changed
    }

    pub fn reset_view(&mut self) -> bool {
        let had_sorts = !self.view.state().sorts.is_empty();
        let changed = self.view.reset();
        if changed {
            if had_sorts {
                self.after_sort_change();
            } else {
                self.refresh();
            }
        }
        changed
    }

    pub fn click_row(&mut self, display_index: usize, modifiers: Modifiers) -> bool {
        let Some(position) = self.display_row(display_index).map(|r| r.original_position) else {
            return false;
        };
        let emitted = self.selection.click_row(position, modifiers);
        self.publish_selection(emitted)
    }

    pub fn click_column(&mut self, column: &str, modifiers: Modifiers) -> bool {
        if self.layout.position(column).is_none() {
            return false;
        }
        let rows = self.display_positions();
        let columns = self.layout.names();
        let emitted = self.selection.click_column(
            column,
            modifiers,
            VisualOrder {
                rows: &rows,
                columns: &columns,
            },
        );
        self.publish_selection(emitted)
    }

    pub fn click_cell(&mut self, display_index: usize, column: &str, modifiers: Modifiers) -> bool {
        let Some(position) = self.display_row(display_index).map(|r| r.original_position) else {
            return false;
        };
        if self.layout.position(column).is_none() {
            return false;
        }
        let rows = self.display_positions();
        let columns = self.layout.names();
        let emitted = self.selection.click_cell(
            CellRef::new(position, column),
            modifiers,
            VisualOrder {
                rows: &rows,
                columns: &columns,
            },
        );
        self.publish_selection(emitted)
    }

    pub fn set_selection(&mut self, selection: Selection) -> bool {
        let emitted = self.selection.set_external(selection);
        self.publish_selection(emitted)
    }

    pub fn set_selection_mode(&mut self, mode: SelectionMode) -> bool {
        let emitted = self.selection.set_mode(mode);
        self.publish_selection(emitted)
    }

    /// Opens an editor on a displayed cell, seeded with its current value.
    pub fn begin_edit(&mut self, display_index: usize, column: &str) -> Option<CellKey> {
        if !self.editable {
            return None;
        }
        let (column_index, _) = self.column_index.get(column)?;
        let meta = &self.data.columns()[column_index];
        if meta.disabled || !meta.column_type.is_editable() {
            return None;
        }
        let row = self.display_row(display_index)?;
        let key = CellKey::new(row.row_id.clone(), column);
        let initial = row
            .cell(column_index)
            .map(|c| c.edit_text())
            .unwrap_or_default();
        self.edits.open(key.clone(), initial);
        Some(key)
    }

    pub fn edit_input(&mut self, key: &CellKey, text: impl Into<String>, now: Instant) -> bool {
        self.edits.input(key, text.into(), now)
    }

    pub fn edit_buffer(&self, key: &CellKey) -> Option<&str> {
        self.edits.buffer(key)
    }

    /// Commits the buffered text on blur or Enter.
    pub fn commit_edit(&mut self, key: &CellKey, trigger: CommitTrigger) -> bool {
        let Some(text) = self.edits.commit(key) else {
            return false;
        };
        self.apply_edit(key, &text, trigger)
    }

    /// Escape: drops the buffer and any pending debounce.
    pub fn cancel_edit(&mut self, key: &CellKey) -> bool {
        self.edits.cancel(key)
    }

    /// Fires expired debounce timers: live edits and scroll persistence.
    pub fn tick(&mut self, now: Instant) -> usize {
        let due = self.edits.take_due(now);
        let mut applied = 0;
        for (key, text) in due {
            if self.apply_edit(&key, &text, CommitTrigger::Debounce) {
                applied += 1;
            }
        }
        self.view.flush_due(now);
        applied
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.edits.next_deadline(), self.view.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn add_row(&mut self) -> Option<String> {
        if !self.editable {
            return None;
        }
        let row_id = self.data.add_row().row_id.clone();
        self.refresh();
        let change = self.data.snapshot(true);
        self.events.on_rows_changed(&change);
        Some(row_id)
    }

    pub fn delete_row(&mut self, row_id: &str) -> bool {
        if !self.editable || self.data.delete_row(row_id).is_none() {
            return false;
        }
        self.edits.cancel_row(row_id);
        self.refresh();
        // Later rows shifted down one position, so positional selections are stale.
        let emitted = self.selection.on_sort_changed();
        self.publish_selection(emitted);
        let change = self.data.snapshot(true);
        self.events.on_rows_changed(&change);
        true
    }

    /// CSV of the displayed rows and visible columns.
    pub fn to_csv(&self) -> Result<String, ExportError> {
        let rows: Vec<&Row> = self
            .display
            .iter()
            .filter_map(|idx| self.data.rows().get(*idx))
            .collect();
        csv_export::rows_to_csv(&self.layout.columns, rows)
    }

    pub fn export_csv(
        &self,
        sink: &dyn SaveBytes,
        now: chrono::DateTime<chrono::Local>,
    ) -> Result<PathBuf, ExportError> {
        let csv = self.to_csv()?;
        let filename = csv_export::export_filename(&self.config.csv_prefix, now);
        sink.save(&filename, csv.as_bytes())
    }

    /// Cancels pending timers and open editors without committing them.
    pub fn teardown(&mut self) {
        self.edits.teardown();
        self.view.teardown();
    }

    fn apply_edit(&mut self, key: &CellKey, text: &str, trigger: CommitTrigger) -> bool {
        tracing::debug!(row = %key.row_id, column = %key.column, ?trigger, "committing edit");
        let Some(outcome) = self.data.apply(key, text) else {
            return false;
        };
        if outcome.changed {
            self.refresh();
        }
        let change = self.data.snapshot(outcome.changed);
        self.events.on_rows_changed(&change);
        true
    }

    fn after_sort_change(&mut self) {
        self.refresh();
        let emitted = self.selection.on_sort_changed();
        self.publish_selection(emitted);
    }

    fn publish_selection(&mut self, emitted: Option<Selection>) -> bool {
        match emitted {
            Some(selection) => {
                self.events.on_selection_changed(&selection);
                true
            }
            None => false,
        }
    }

    fn refresh(&mut self) {
        let state = self.view.state();
        let filtered = filter::apply_search_and_filters(
            self.data.rows(),
            &state.search,
            &state.filters,
            &self.column_index,
        );
        let sorted = sort::apply_sorts(filtered, &state.sorts, &self.column_index);
        self.display = sorted.iter().map(|row| row.original_position).collect();
        tracing::debug!(
            instance = %self.instance.instance_id,
            rows = self.data.rows().len(),
            displayed = self.display.len(),
            "recomputed display rows"
        );
        self.relayout();
    }

    fn relayout(&mut self) {
        self.layout = layout::resolve_layout(
            self.data.columns(),
            self.view.state(),
            self.data.rows(),
            &self.config.layout,
        );
    }
}
