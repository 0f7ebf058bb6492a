use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::io::storage::ViewStorage;
use crate::state::column::{Column, Pinned, SchemaFingerprint};
use crate::state::debounce::Debouncer;
use crate::state::filter::FilterSpec;
use crate::state::sort::{self, SortSpec};

/// Bumped whenever the persisted layout of `ViewState` changes.
pub const VIEW_STATE_FORMAT_VERSION: u32 = 1;

/// User-adjustable view settings for one grid instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewState {
    pub search: String,
    pub sorts: Vec<SortSpec>,
    pub filters: Vec<FilterSpec>,
    pub hidden_columns: BTreeSet<String>,
    pub manual_widths: BTreeMap<String, f64>,
    pub pinned_columns: BTreeMap<String, Pinned>,
    pub column_order: Vec<String>,
    pub scroll_top: f64,
    pub scroll_left: f64,
}

impl ViewState {
    pub fn defaults_for(columns: &[Column]) -> Self {
        Self {
            column_order: columns.iter().map(|c| c.name.clone()).collect(),
            ..Self::default()
        }
    }

    /// True when every column this state mentions exists in `schema`.
    pub fn references_valid(&self, schema: &SchemaFingerprint) -> bool {
        self.hidden_columns.iter().all(|n| schema.contains(n))
            && self.manual_widths.keys().all(|n| schema.contains(n))
            && self.pinned_columns.keys().all(|n| schema.contains(n))
            && self.sorts.iter().all(|s| schema.contains(&s.column))
            && self.filters.iter().all(|f| schema.contains(&f.column))
    }

    /// Makes `column_order` a permutation of the schema's names: unknown
    /// names are dropped and missing ones appended in schema order.
    pub fn normalize_order(&mut self, schema: &SchemaFingerprint) {
        let mut seen = BTreeSet::new();
        let mut order: Vec<String> = self
            .column_order
            .drain(..)
            .filter(|name| schema.contains(name) && seen.insert(name.clone()))
            .collect();
        for (name, _) in &schema.0 {
            if !seen.contains(name) {
                order.push(name.clone());
            }
        }
        self.column_order = order;
    }

    pub fn sort_direction(&self, column: &str) -> Option<sort::SortDirection> {
        self.sorts
            .iter()
            .find(|s| s.column == column)
            .map(|s| s.direction)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedView {
    version: u32,
    schema: SchemaFingerprint,
    state: ViewState,
}

/// Rebuilds a view state from a stored blob. Any problem with the blob
/// (corrupt, older format, different schema, dangling references) yields the
/// defaults for `columns`.
pub fn restore(blob: Option<&str>, columns: &[Column]) -> ViewState {
    let schema = SchemaFingerprint::of(columns);
    let defaults = || ViewState::defaults_for(columns);

    let Some(blob) = blob else {
        return defaults();
    };
    let persisted: PersistedView = match serde_json::from_str(blob) {
        Ok(persisted) => persisted,
        Err(err) => {
            tracing::warn!(error = %err, "discarding malformed persisted view state");
            return defaults();
        }
    };
    if persisted.version != VIEW_STATE_FORMAT_VERSION {
        tracing::debug!(
            found = persisted.version,
            expected = VIEW_STATE_FORMAT_VERSION,
            "discarding persisted view state with old format"
        );
        return defaults();
    }
    if persisted.schema != schema || !persisted.state.references_valid(&schema) {
        tracing::debug!("discarding persisted view state for a different schema");
        return defaults();
    }

    let mut state = persisted.state;
    state.normalize_order(&schema);
    state
}

pub fn encode(state: &ViewState, columns: &[Column]) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PersistedView {
        version: VIEW_STATE_FORMAT_VERSION,
        schema: SchemaFingerprint::of(columns),
        state: state.clone(),
    })
}

/// Identity of a grid instance for persistence.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GridInstance {
    pub instance_id: String,
    pub widget_kind: String,
}

impl GridInstance {
    pub fn new(instance_id: impl Into<String>, widget_kind: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            widget_kind: widget_kind.into(),
        }
    }

    pub fn storage_key(&self, schema: &SchemaFingerprint) -> String {
        format!(
            "gridkit.view.{}.{}.{}",
            self.instance_id,
            self.widget_kind,
            schema.tag()
        )
    }
}

/// Owns and persists the view state of one grid instance.
pub struct ViewStateStore {
    key: String,
    columns: Vec<Column>,
    schema: SchemaFingerprint,
    state: ViewState,
    storage: Arc<dyn ViewStorage>,
    scroll_writes: Debouncer<()>,
}

impl std::fmt::Debug for ViewStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewStateStore")
            .field("key", &self.key)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ViewStateStore {
    pub fn open(
        storage: Arc<dyn ViewStorage>,
        instance: &GridInstance,
        columns: &[Column],
        scroll_delay: Duration,
    ) -> Self {
        let schema = SchemaFingerprint::of(columns);
        let key = instance.storage_key(&schema);
        let blob = match storage.load(&key) {
            Ok(blob) => blob,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "failed to read persisted view state");
                None
            }
        };
        let state = restore(blob.as_deref(), columns);

        Self {
            key,
            columns: columns.to_vec(),
            schema,
            state,
            storage,
            scroll_writes: Debouncer::new(scroll_delay),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn schema(&self) -> &SchemaFingerprint {
        &self.schema
    }

    /// Applies `f` and persists when the state actually changed.
    pub fn update(&mut self, f: impl FnOnce(&mut ViewState)) -> bool {
        let mut next = self.state.clone();
        f(&mut next);
        next.normalize_order(&self.schema);
        if next == self.state {
            return false;
        }
        self.state = next;
        self.persist();
        true
    }

    pub fn set_search(&mut self, query: &str) -> bool {
        let query = query.trim().to_string();
        self.update(|state| state.search = query)
    }

    pub fn set_sorts(&mut self, sorts: Vec<SortSpec>) -> bool {
        let sorts: Vec<SortSpec> = sorts
            .into_iter()
            .filter(|s| self.schema.contains(&s.column))
            .collect();
        self.update(|state| state.sorts = sorts)
    }

    pub fn toggle_sort(&mut self, column: &str, multi: bool) -> bool {
        if !self.schema.contains(column) {
            return false;
        }
        let next = sort::toggle_sort(&self.state.sorts, column, multi);
        self.update(|state| state.sorts = next)
    }

    /// Adds a filter, or replaces the one sharing its id. Filters on unknown
    /// columns are rejected.
    pub fn add_filter(&mut self, filter: FilterSpec) -> bool {
        if !self.schema.contains(&filter.column) {
            return false;
        }
        self.update(|state| {
            match state.filters.iter_mut().find(|f| f.id == filter.id) {
                Some(existing) => *existing = filter,
                None => state.filters.push(filter),
            }
        })
    }

    pub fn remove_filter(&mut self, id: &str) -> bool {
        self.update(|state| state.filters.retain(|f| f.id != id))
    }

    pub fn clear_filters(&mut self) -> bool {
        self.update(|state| state.filters.clear())
    }

    pub fn set_hidden(&mut self, column: &str, hidden: bool) -> bool {
        if !self.schema.contains(column) {
            return false;
        }
        self.update(|state| {
            if hidden {
                state.hidden_columns.insert(column.to_string());
            } else {
                state.hidden_columns.remove(column);
            }
        })
    }

    pub fn set_manual_width(&mut self, column: &str, width: Option<f64>) -> bool {
        if !self.schema.contains(column) {
            return false;
        }
        let resizable = self
            .columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.resizable)
            .unwrap_or(false);
        if width.is_some() && !resizable {
            return false;
        }
        self.update(|state| match width.filter(|w| w.is_finite() && *w > 0.0) {
            Some(width) => {
                state.manual_widths.insert(column.to_string(), width);
            }
            None => {
                state.manual_widths.remove(column);
            }
        })
    }

    pub fn set_pinned(&mut self, column: &str, pinned: Option<Pinned>) -> bool {
        if !self.schema.contains(column) {
            return false;
        }
        self.update(|state| match pinned {
            Some(side) => {
                state.pinned_columns.insert(column.to_string(), side);
            }
            None => {
                state.pinned_columns.remove(column);
            }
        })
    }

    /// Moves `column` to `to_index` within the full column order.
    pub fn move_column(&mut self, column: &str, to_index: usize) -> bool {
        let Some(from) = self.state.column_order.iter().position(|n| n == column) else {
            return false;
        };
        self.update(|state| {
            let name = state.column_order.remove(from);
            let to = to_index.min(state.column_order.len());
            state.column_order.insert(to, name);
        })
    }

    /// Records the scroll position; the write to storage is debounced.
    pub fn set_scroll(&mut self, top: f64, left: f64, now: Instant) -> bool {
        if self.state.scroll_top == top && self.state.scroll_left == left {
            return false;
        }
        self.state.scroll_top = top;
        self.state.scroll_left = left;
        self.scroll_writes.schedule((), now);
        true
    }

    pub fn scroll_write_pending(&self) -> bool {
        !self.scroll_writes.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scroll_writes.next_deadline()
    }

    /// Persists a pending scroll write once its debounce window has passed.
    pub fn flush_due(&mut self, now: Instant) -> bool {
        if self.scroll_writes.take_due(now).is_empty() {
            return false;
        }
        self.persist();
        true
    }

    /// Restores defaults and drops the persisted entry, so a remount starts
    /// from defaults too.
    pub fn reset(&mut self) -> bool {
        self.scroll_writes.clear();
        let defaults = ViewState::defaults_for(&self.columns);
        if defaults == self.state {
            return false;
        }
        self.state = defaults;
        if let Err(err) = self.storage.remove(&self.key) {
            tracing::warn!(key = %self.key, error = %err, "failed to remove view state");
        }
        true
    }

    /// Drops pending scroll writes without persisting them.
    pub fn teardown(&mut self) {
        self.scroll_writes.clear();
    }

    fn persist(&mut self) {
        self.scroll_writes.clear();
        let blob = match encode(&self.state, &self.columns) {
            Ok(blob) => blob,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to encode view state");
                return;
            }
        };
        if let Err(err) = self.storage.store(&self.key, &blob) {
            tracing::warn!(key = %self.key, error = %err, "failed to persist view state");
        }
    }
}
