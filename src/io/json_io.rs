use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::io::atomic_write_string;
use crate::state::column::{Column, ColumnConfig, ColumnDescriptor, ColumnType, SchemaError};
use crate::state::row::{self, Row};
use crate::state::value;

#[derive(Debug, Error)]
pub enum JsonIoError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("JSON root is not an array")]
    NotAnArray,
    #[error("JSON array contains non-object elements")]
    NotArrayOfObjects,
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// A JSON array of objects split into inferred columns and positional rows.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonTable {
    pub descriptors: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<Value>>,
}

impl JsonTable {
    /// Normalizes the inferred columns with `config` and coerces every row.
    pub fn into_grid(
        self,
        config: &BTreeMap<String, ColumnConfig>,
    ) -> Result<(Vec<Column>, Vec<Row>), JsonIoError> {
        let columns = crate::state::column::normalize_columns(&self.descriptors, config)?;
        let rows = row::rows_from_values(&self.rows, None, &columns);
        Ok((columns, rows))
    }
}

pub fn load_json(path: &Path) -> Result<JsonTable, JsonIoError> {
    let content = fs::read_to_string(path)?;
    parse_json(&content)
}

/// Columns appear in first-seen key order. Keys missing from an object
/// become nulls.
pub fn parse_json(content: &str) -> Result<JsonTable, JsonIoError> {
    let value: Value = serde_json::from_str(content)?;
    let Value::Array(items) = value else {
        return Err(JsonIoError::NotAnArray);
    };

    let mut objects = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Object(map) => objects.push(map),
            _ => return Err(JsonIoError::NotArrayOfObjects),
        }
    }

    let mut names: Vec<String> = Vec::new();
    for object in &objects {
        for key in object.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }

    let rows: Vec<Vec<Value>> = objects
        .iter()
        .map(|object| {
            names
                .iter()
                .map(|name| object.get(name).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    let descriptors = names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let column_type = infer_type(rows.iter().map(|r| &r[idx]));
            ColumnDescriptor::new(name.clone(), column_type)
        })
        .collect();

    Ok(JsonTable { descriptors, rows })
}

/// Picks the narrowest type every non-null value fits. All-null columns are
/// strings.
pub fn infer_type<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
    let mut candidate: Option<ColumnType> = None;
    for value in values {
        let ty = match value {
            Value::Null => continue,
            Value::Bool(_) => ColumnType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
            Value::Number(_) => ColumnType::Number,
            Value::Array(_) => ColumnType::List,
            Value::Object(_) => ColumnType::Json,
            Value::String(s) => string_type(s),
        };
        candidate = Some(match (candidate, ty) {
            (None, ty) => ty,
            (Some(a), b) if a == b => a,
            (Some(ColumnType::Integer), ColumnType::Number)
            | (Some(ColumnType::Number), ColumnType::Integer) => ColumnType::Number,
            (Some(ColumnType::Date), ColumnType::Datetime)
            | (Some(ColumnType::Datetime), ColumnType::Date) => ColumnType::Datetime,
            _ => return ColumnType::String,
        });
    }
    candidate.unwrap_or(ColumnType::String)
}

fn string_type(s: &str) -> ColumnType {
    let trimmed = s.trim();
    if trimmed.len() == 10 && value::parse_date(trimmed).is_some() {
        ColumnType::Date
    } else if trimmed.len() > 10
        && trimmed.contains('T')
        && value::parse_datetime(trimmed).is_some()
    {
        ColumnType::Datetime
    } else {
        ColumnType::String
    }
}

/// Writes rows back as an array of objects keyed by column name.
pub fn save_json(path: &Path, columns: &[Column], rows: &[Vec<Value>]) -> Result<(), JsonIoError> {
    let array: Vec<Value> = rows
        .iter()
        .map(|row| {
            let map: Map<String, Value> = columns
                .iter()
                .zip(row.iter())
                .map(|(column, value)| (column.name.clone(), value.clone()))
                .collect();
            Value::Object(map)
        })
        .collect();

    let json = serde_json::to_string_pretty(&array)?;
    atomic_write_string(path, &json)?;
    Ok(())
}
