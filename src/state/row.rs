use serde_json::Value;

use crate::state::column::{Column, ColumnType};
use crate::state::value::CellValue;

/// One row of grid data. `cells` follow the original column order.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub row_id: String,
    pub original_position: usize,
    pub index_value: Option<CellValue>,
    pub cells: Vec<CellValue>,
}

impl Row {
    /// Builds a row from raw values, coercing each cell for its column.
    /// Missing trailing cells are filled with `Empty`, extra cells are dropped.
    pub fn from_values(position: usize, values: &[Value], types: &[ColumnType]) -> Self {
        let cells = types
            .iter()
            .enumerate()
            .map(|(idx, ty)| {
                values
                    .get(idx)
                    .map(|v| CellValue::from_json(v, *ty))
                    .unwrap_or(CellValue::Empty)
            })
            .collect();

        Self {
            row_id: default_row_id(position),
            original_position: position,
            index_value: None,
            cells,
        }
    }

    pub fn with_index(mut self, index_value: Option<CellValue>) -> Self {
        self.index_value = index_value;
        self
    }

    pub fn cell(&self, column_index: usize) -> Option<&CellValue> {
        self.cells.get(column_index)
    }

    pub fn to_json(&self) -> Vec<Value> {
        self.cells.iter().map(CellValue::to_json).collect()
    }
}

pub fn default_row_id(position: usize) -> String {
    format!("row-{position}")
}

pub fn column_types(columns: &[Column]) -> Vec<ColumnType> {
    columns.iter().map(|c| c.column_type).collect()
}

/// Builds rows for a fully materialized source. `index` is aligned with `rows`.
pub fn rows_from_values(
    rows: &[Vec<Value>],
    index: Option<&[Value]>,
    columns: &[Column],
) -> Vec<Row> {
    let types = column_types(columns);
    rows.iter()
        .enumerate()
        .map(|(position, values)| {
            let index_value = index
                .and_then(|idx| idx.get(position))
                .map(index_cell);
            Row::from_values(position, values, &types).with_index(index_value)
        })
        .collect()
}

pub fn index_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::Number(n) => match n.as_i64() {
            Some(i) => CellValue::Integer(i),
            None => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Empty),
        },
        other => CellValue::Text(crate::state::value::display_json(other)),
    }
}
