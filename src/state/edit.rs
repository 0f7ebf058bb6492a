use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;

use crate::state::column::{Column, ColumnType, TypeFamily};
use crate::state::debounce::Debouncer;
use crate::state::row::Row;
use crate::state::value::{self, CellValue};

/// Identifies the cell an edit buffer belongs to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub row_id: String,
    pub column: String,
}

impl CellKey {
    pub fn new(row_id: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            row_id: row_id.into(),
            column: column.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitTrigger {
    Blur,
    Enter,
    Debounce,
}

/// Buffers raw editor text per cell until a commit trigger fires.
#[derive(Clone, Debug)]
pub struct EditPipeline {
    buffers: BTreeMap<CellKey, String>,
    timers: Debouncer<CellKey>,
    live_columns: BTreeSet<String>,
}

impl EditPipeline {
    pub fn new(debounce: Duration, live_columns: BTreeSet<String>) -> Self {
        Self {
            buffers: BTreeMap::new(),
            timers: Debouncer::new(debounce),
            live_columns,
        }
    }

    pub fn is_editing(&self, key: &CellKey) -> bool {
        self.buffers.contains_key(key)
    }

    pub fn buffer(&self, key: &CellKey) -> Option<&str> {
        self.buffers.get(key).map(String::as_str)
    }

    pub fn open(&mut self, key: CellKey, initial: String) {
        self.timers.cancel(&key);
        self.buffers.insert(key, initial);
    }

    /// Replaces the buffered text. Live columns restart their debounce timer.
    pub fn input(&mut self, key: &CellKey, text: String, now: Instant) -> bool {
        let Some(buffer) = self.buffers.get_mut(key) else {
            return false;
        };
        *buffer = text;
        if self.live_columns.contains(&key.column) {
            self.timers.schedule(key.clone(), now);
        }
        true
    }

    /// Ends editing and hands back the buffered text for coercion.
    pub fn commit(&mut self, key: &CellKey) -> Option<String> {
        self.timers.cancel(key);
        self.buffers.remove(key)
    }

    /// Discards the buffer and any pending debounce without committing.
    pub fn cancel(&mut self, key: &CellKey) -> bool {
        self.timers.cancel(key);
        self.buffers.remove(key).is_some()
    }

    /// Discards every open editor on `row_id`. Returns how many were dropped.
    pub fn cancel_row(&mut self, row_id: &str) -> usize {
        let keys: Vec<CellKey> = self
            .buffers
            .keys()
            .filter(|key| key.row_id == row_id)
            .cloned()
            .collect();
        for key in &keys {
            self.cancel(key);
        }
        keys.len()
    }

    /// Live buffers whose debounce expired. The editor stays open.
    pub fn take_due(&mut self, now: Instant) -> Vec<(CellKey, String)> {
        self.timers
            .take_due(now)
            .into_iter()
            .filter_map(|key| {
                let text = self.buffers.get(&key)?.clone();
                Some((key, text))
            })
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn teardown(&mut self) {
        self.timers.clear();
        self.buffers.clear();
    }
}

/// Parses editor text for `column`. Anything that fails to parse or validate
/// keeps `previous`.
pub fn coerce_input(text: &str, column: &Column, previous: &CellValue) -> CellValue {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return if column.required {
            previous.clone()
        } else {
            CellValue::Empty
        };
    }

    let parsed = match column.column_type.family() {
        TypeFamily::Numeric => coerce_numeric(trimmed, column),
        TypeFamily::Boolean => value::parse_bool(trimmed).map(CellValue::Bool),
        TypeFamily::Temporal => match column.column_type {
            ColumnType::Date => value::parse_date(trimmed).map(CellValue::Date),
            ColumnType::Time => value::parse_time(trimmed).map(CellValue::Time),
            _ => value::parse_datetime(trimmed).map(CellValue::DateTime),
        },
        TypeFamily::List => coerce_list(trimmed, column),
        TypeFamily::Text => coerce_text(text, column),
    };

    parsed.unwrap_or_else(|| {
        tracing::debug!(column = %column.name, "edit rejected, keeping previous value");
        previous.clone()
    })
}

fn coerce_numeric(raw: &str, column: &Column) -> Option<CellValue> {
    if column.column_type == ColumnType::Integer {
        return coerce_integer(raw, column);
    }
    value::parse_f64(raw).map(|n| CellValue::Number(constrain(n, column)))
}

fn coerce_integer(raw: &str, column: &Column) -> Option<CellValue> {
    let unconstrained = column.step.is_none() && column.min.is_none() && column.max.is_none();
    if let Ok(n) = raw.parse::<i64>() {
        if unconstrained {
            return Some(CellValue::Integer(n));
        }
    }

    let n = constrain(value::parse_f64(raw)?, column);
    if n.fract() != 0.0 {
        return None;
    }
    Some(CellValue::Integer(n as i64))
}

/// Snaps to `step` (counted from `min`), then clamps to `[min, max]`.
fn constrain(mut n: f64, column: &Column) -> f64 {
    if let Some(step) = column.step.filter(|s| *s > 0.0) {
        let base = column.min.unwrap_or(0.0);
        n = base + ((n - base) / step).round() * step;
    }
    if let Some(min) = column.min {
        n = n.max(min);
    }
    if let Some(max) = column.max {
        n = n.min(max);
    }
    n
}

fn coerce_list(raw: &str, column: &Column) -> Option<CellValue> {
    let items: Vec<Value> = serde_json::from_str(raw).ok()?;
    let items: Vec<String> = items.iter().map(value::display_json).collect();
    if column.column_type == ColumnType::Multiselect
        && !column.options.is_empty()
        && !items.iter().all(|item| column.options.contains(item))
    {
        return None;
    }
    Some(CellValue::List(items))
}

fn coerce_text(raw: &str, column: &Column) -> Option<CellValue> {
    match column.column_type {
        ColumnType::Json | ColumnType::LineChart | ColumnType::BarChart | ColumnType::AreaChart => {
            return serde_json::from_str::<Value>(raw).ok().map(CellValue::Json);
        }
        ColumnType::Selectbox => {
            if !column.options.is_empty() && !column.options.iter().any(|o| o == raw.trim()) {
                return None;
            }
        }
        _ => {}
    }

    let text: String = match column.max_chars {
        Some(max) => raw.chars().take(max).collect(),
        None => raw.to_string(),
    };

    if let Some(pattern) = column.validate.as_deref() {
        match Regex::new(pattern) {
            Ok(re) if !re.is_match(&text) => return None,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    column = %column.name,
                    error = %err,
                    "ignoring invalid validate pattern"
                );
            }
        }
    }
    Some(CellValue::Text(text))
}

/// Snapshot handed to the external collaborator after a structural or cell change.
#[derive(Clone, Debug, PartialEq)]
pub struct RowsChanged {
    pub rows: Vec<Vec<Value>>,
    pub index: Option<Vec<Value>>,
    pub should_reprocess: bool,
}

/// Result of applying committed text to a cell.
#[derive(Clone, Debug, PartialEq)]
pub struct CommitOutcome {
    pub value: CellValue,
    pub changed: bool,
}

/// Locally materialized rows of an editable grid.
#[derive(Clone, Debug, PartialEq)]
pub struct EditableRows {
    columns: Vec<Column>,
    rows: Vec<Row>,
    has_index: bool,
}

impl EditableRows {
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        let has_index = rows.iter().any(|r| r.index_value.is_some());
        Self {
            columns,
            rows,
            has_index,
        }
    }

    pub fn with_index(mut self, has_index: bool) -> Self {
        self.has_index = has_index;
        self
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn has_index(&self) -> bool {
        self.has_index
    }

    pub fn row_by_id(&self, row_id: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.row_id == row_id)
    }

    pub fn cell(&self, key: &CellKey) -> Option<&CellValue> {
        let column = self.columns.iter().position(|c| c.name == key.column)?;
        self.row_by_id(&key.row_id)?.cell(column)
    }

    /// Coerces `text` and writes it into the cell. Disabled columns and
    /// unknown cells are left untouched.
    pub fn apply(&mut self, key: &CellKey, text: &str) -> Option<CommitOutcome> {
        let column_index = self.columns.iter().position(|c| c.name == key.column)?;
        let column = &self.columns[column_index];
        if column.disabled || !column.column_type.is_editable() {
            return None;
        }
        let row = self.rows.iter_mut().find(|r| r.row_id == key.row_id)?;
        let previous = row.cells.get(column_index)?.clone();
        let value = coerce_input(text, column, &previous);
        let changed = value != previous;
        row.cells[column_index] = value.clone();
        Some(CommitOutcome { value, changed })
    }

    /// Appends a row of column defaults at the next original position.
    pub fn add_row(&mut self) -> &Row {
        let position = self.rows.len();
        let cells = self
            .columns
            .iter()
            .map(|c| {
                c.default
                    .as_ref()
                    .map(|v| CellValue::from_json(v, c.column_type))
                    .unwrap_or(CellValue::Empty)
            })
            .collect();
        let index_value = self.has_index.then(|| self.next_index_value());

        self.rows.push(Row {
            row_id: format!("row-{}", uuid::Uuid::new_v4()),
            original_position: position,
            index_value,
            cells,
        });
        &self.rows[position]
    }

    /// Removes a row by id. Later rows shift down one original position.
    pub fn delete_row(&mut self, row_id: &str) -> Option<Row> {
        let at = self.rows.iter().position(|r| r.row_id == row_id)?;
        let removed = self.rows.remove(at);
        for row in &mut self.rows[at..] {
            row.original_position -= 1;
        }
        Some(removed)
    }

    pub fn snapshot(&self, should_reprocess: bool) -> RowsChanged {
        RowsChanged {
            rows: self.rows.iter().map(Row::to_json).collect(),
            index: self.has_index.then(|| {
                self.rows
                    .iter()
                    .map(|r| r.index_value.as_ref().map(CellValue::to_json).unwrap_or(Value::Null))
                    .collect()
            }),
            should_reprocess,
        }
    }

    fn next_index_value(&self) -> CellValue {
        let values: Vec<&CellValue> = self
            .rows
            .iter()
            .filter_map(|r| r.index_value.as_ref())
            .collect();

        let integers: Option<Vec<i64>> = values
            .iter()
            .map(|v| match v {
                CellValue::Integer(n) => Some(*n),
                _ => None,
            })
            .collect();
        if let Some(integers) = integers {
            match integers.iter().max() {
                None => return CellValue::Integer(0),
                Some(max) => {
                    if let Some(next) = max.checked_add(1) {
                        return CellValue::Integer(next);
                    }
                }
            }
        } else if values.iter().all(|v| v.as_f64().is_some()) {
            let max = values
                .iter()
                .filter_map(|v| v.as_f64())
                .fold(f64::NEG_INFINITY, f64::max);
            return CellValue::Number((max + 1.0).floor());
        }
        CellValue::Text(uuid::Uuid::new_v4().simple().to_string())
    }
}
