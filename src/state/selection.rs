use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::state::column::SchemaError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    Multi,
}

/// Enabled selection families. `None` means the family is disabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionMode {
    pub rows: Option<Cardinality>,
    pub columns: Option<Cardinality>,
    pub cells: Option<Cardinality>,
}

impl SelectionMode {
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses tokens such as `single-row`, `multi-column`, `multi-cell`.
    pub fn parse<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Result<Self, SchemaError> {
        let mut mode = Self::default();
        for token in tokens {
            let token = token.trim();
            let (cardinality, family) = token
                .split_once('-')
                .ok_or_else(|| SchemaError::UnknownSelectionMode(token.to_string()))?;
            let cardinality = match cardinality {
                "single" => Cardinality::Single,
                "multi" => Cardinality::Multi,
                _ => return Err(SchemaError::UnknownSelectionMode(token.to_string())),
            };
            match family {
                "row" => mode.rows = Some(cardinality),
                "column" => mode.columns = Some(cardinality),
                "cell" => mode.cells = Some(cardinality),
                _ => return Err(SchemaError::UnknownSelectionMode(token.to_string())),
            }
        }
        Ok(mode)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Ctrl on most platforms, Cmd on macOS.
    pub toggle: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        toggle: false,
        shift: false,
    };
    pub const TOGGLE: Self = Self {
        toggle: true,
        shift: false,
    };
    pub const SHIFT: Self = Self {
        toggle: false,
        shift: true,
    };
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub column: String,
}

impl CellRef {
    pub fn new(row: usize, column: impl Into<String>) -> Self {
        Self {
            row,
            column: column.into(),
        }
    }
}

/// Selected rows (by original position), columns (by name) and cells.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub rows: BTreeSet<usize>,
    pub columns: BTreeSet<String>,
    pub cells: BTreeSet<CellRef>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.columns.is_empty() && self.cells.is_empty()
    }

    /// Forces disabled families empty and single families to at most one entry.
    pub fn normalized(&self, mode: SelectionMode) -> Self {
        Self {
            rows: clamp(&self.rows, mode.rows),
            columns: clamp(&self.columns, mode.columns),
            cells: clamp(&self.cells, mode.cells),
        }
    }
}

fn clamp<T: Ord + Clone>(set: &BTreeSet<T>, cardinality: Option<Cardinality>) -> BTreeSet<T> {
    match cardinality {
        None => BTreeSet::new(),
        Some(Cardinality::Single) => set.iter().take(1).cloned().collect(),
        Some(Cardinality::Multi) => set.clone(),
    }
}

/// Visual order the gesture was performed against: display row order (by
/// original position) and resolved column order.
#[derive(Clone, Copy, Debug)]
pub struct VisualOrder<'a> {
    pub rows: &'a [usize],
    pub columns: &'a [String],
}

/// Gesture-driven selection state machine for one grid instance.
#[derive(Clone, Debug, Default)]
pub struct SelectionController {
    mode: SelectionMode,
    selection: Selection,
    column_anchor: Option<String>,
    cell_anchor: Option<CellRef>,
    emitted: Selection,
}

impl SelectionController {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// The normalized selection as last emitted.
    pub fn current(&self) -> &Selection {
        &self.emitted
    }

    pub fn set_mode(&mut self, mode: SelectionMode) -> Option<Selection> {
        self.mode = mode;
        if mode.columns.is_none() {
            self.column_anchor = None;
        }
        if mode.cells.is_none() {
            self.cell_anchor = None;
        }
        self.selection = self.selection.normalized(mode);
        self.emit()
    }

    pub fn click_row(&mut self, position: usize, _modifiers: Modifiers) -> Option<Selection> {
        match self.mode.rows? {
            Cardinality::Single => {
                self.selection.rows = BTreeSet::from([position]);
            }
            Cardinality::Multi => {
                if !self.selection.rows.remove(&position) {
                    self.selection.rows.insert(position);
                }
            }
        }
        self.emit()
    }

    pub fn click_column(
        &mut self,
        column: &str,
        modifiers: Modifiers,
        order: VisualOrder<'_>,
    ) -> Option<Selection> {
        let cardinality = self.mode.columns?;
        if self.mode.cells.is_some() {
            return None;
        }

        match (cardinality, modifiers) {
            (Cardinality::Multi, Modifiers { shift: true, .. }) => {
                let range = self
                    .column_anchor
                    .as_deref()
                    .and_then(|anchor| span(order.columns, anchor, column));
                match range {
                    Some(range) => {
                        self.selection.columns = range.iter().cloned().collect();
                    }
                    None => self.select_single_column(column),
                }
            }
            (Cardinality::Multi, Modifiers { toggle: true, .. }) => {
                if !self.selection.columns.remove(column) {
                    self.selection.columns.insert(column.to_string());
                }
                self.column_anchor = Some(column.to_string());
            }
            _ => self.select_single_column(column),
        }
        self.emit()
    }

    pub fn click_cell(
        &mut self,
        cell: CellRef,
        modifiers: Modifiers,
        order: VisualOrder<'_>,
    ) -> Option<Selection> {
        let cardinality = self.mode.cells?;

        match (cardinality, modifiers) {
            (Cardinality::Multi, Modifiers { shift: true, .. }) => {
                let rect = self
                    .cell_anchor
                    .as_ref()
                    .and_then(|anchor| rectangle(order, anchor, &cell));
                match rect {
                    Some(cells) => self.selection.cells = cells,
                    None => self.select_single_cell(cell),
                }
            }
            (Cardinality::Multi, Modifiers { toggle: true, .. }) => {
                if !self.selection.cells.remove(&cell) {
                    self.selection.cells.insert(cell.clone());
                }
                self.cell_anchor = Some(cell);
            }
            _ => self.select_single_cell(cell),
        }
        self.emit()
    }

    /// Sorting changes which visual row a position lands on: row and cell
    /// selections are cleared, column selection is kept.
    pub fn on_sort_changed(&mut self) -> Option<Selection> {
        self.selection.rows.clear();
        self.selection.cells.clear();
        self.cell_anchor = None;
        self.emit()
    }

    /// Drops references to rows or columns that no longer exist.
    pub fn retain_existing(
        &mut self,
        rows: &BTreeSet<usize>,
        columns: &BTreeSet<String>,
    ) -> Option<Selection> {
        self.selection.rows.retain(|r| rows.contains(r));
        self.selection.columns.retain(|c| columns.contains(c));
        self.selection
            .cells
            .retain(|c| rows.contains(&c.row) && columns.contains(&c.column));
        if self
            .column_anchor
            .as_ref()
            .is_some_and(|c| !columns.contains(c))
        {
            self.column_anchor = None;
        }
        if self
            .cell_anchor
            .as_ref()
            .is_some_and(|c| !rows.contains(&c.row) || !columns.contains(&c.column))
        {
            self.cell_anchor = None;
        }
        self.emit()
    }

    /// Replaces the selection with a caller-supplied value.
    pub fn set_external(&mut self, selection: Selection) -> Option<Selection> {
        self.selection = selection.normalized(self.mode);
        self.column_anchor = None;
        self.cell_anchor = None;
        self.emit()
    }

    pub fn clear(&mut self) -> Option<Selection> {
        self.set_external(Selection::default())
    }

    fn select_single_column(&mut self, column: &str) {
        self.selection.columns = BTreeSet::from([column.to_string()]);
        self.column_anchor = Some(column.to_string());
    }

    fn select_single_cell(&mut self, cell: CellRef) {
        self.selection.cells = BTreeSet::from([cell.clone()]);
        self.cell_anchor = Some(cell);
    }

    /// Normalizes internal state and reports it when it differs from the
    /// last emitted value.
    fn emit(&mut self) -> Option<Selection> {
        let normalized = self.selection.normalized(self.mode);
        self.selection = normalized.clone();
        if normalized == self.emitted {
            return None;
        }
        self.emitted = normalized.clone();
        Some(normalized)
    }
}

fn span<'a>(items: &'a [String], from: &str, to: &str) -> Option<&'a [String]> {
    let a = items.iter().position(|c| c == from)?;
    let b = items.iter().position(|c| c == to)?;
    Some(&items[a.min(b)..=a.max(b)])
}

fn rectangle(
    order: VisualOrder<'_>,
    anchor: &CellRef,
    target: &CellRef,
) -> Option<BTreeSet<CellRef>> {
    let r0 = order.rows.iter().position(|r| *r == anchor.row)?;
    let r1 = order.rows.iter().position(|r| *r == target.row)?;
    let columns = span(order.columns, &anchor.column, &target.column)?;

    let rows = &order.rows[r0.min(r1)..=r0.max(r1)];
    Some(
        rows.iter()
            .flat_map(|row| columns.iter().map(move |column| CellRef::new(*row, column.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode_tokens() {
        let mode = SelectionMode::parse(["multi-row", "single-column"]).unwrap();
        assert_eq!(mode.rows, Some(Cardinality::Multi));
        assert_eq!(mode.columns, Some(Cardinality::Single));
        assert_eq!(mode.cells, None);
        assert!(SelectionMode::parse(["many-row"]).is_err());
    }

    #[test]
    fn normalize_clamps_singles_and_disabled_families() {
        let selection = Selection {
            rows: BTreeSet::from([3, 1]),
            columns: BTreeSet::from(["a".to_string()]),
            cells: BTreeSet::new(),
        };
        let mode = SelectionMode {
            rows: Some(Cardinality::Single),
            ..SelectionMode::default()
        };
        let normalized = selection.normalized(mode);
        assert_eq!(normalized.rows, BTreeSet::from([1]));
        assert!(normalized.columns.is_empty());
    }
}
