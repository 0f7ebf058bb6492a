use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Number, Value};

use crate::state::column::ColumnType;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Runtime value of one cell, tagged by the kind of column it was coerced for.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    List(Vec<String>),
    Json(Value),
}

impl CellValue {
    /// Coerces a raw JSON value into the representation used by `column_type`.
    ///
    /// Values that cannot be represented keep their text form so that typed
    /// predicates exclude them instead of failing the row set.
    pub fn from_json(value: &Value, column_type: ColumnType) -> Self {
        if value.is_null() {
            return Self::Empty;
        }

        match column_type {
            ColumnType::Number | ColumnType::Progress => match value_as_f64(value) {
                Some(n) => Self::Number(n),
                None => Self::Text(display_json(value)),
            },
            ColumnType::Integer => match value_as_i64(value) {
                Some(n) => Self::Integer(n),
                None => match value_as_f64(value) {
                    Some(n) => Self::Number(n),
                    None => Self::Text(display_json(value)),
                },
            },
            ColumnType::Boolean => match value {
                Value::Bool(b) => Self::Bool(*b),
                Value::String(s) => parse_bool(s)
                    .map(Self::Bool)
                    .unwrap_or_else(|| Self::Text(s.clone())),
                Value::Number(n) => Self::Bool(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
                other => Self::Text(display_json(other)),
            },
            ColumnType::Date => text_or(value, |s| parse_date(s).map(Self::Date)),
            ColumnType::Time => text_or(value, |s| parse_time(s).map(Self::Time)),
            ColumnType::Datetime => text_or(value, |s| parse_datetime(s).map(Self::DateTime)),
            ColumnType::List | ColumnType::Multiselect => match value {
                Value::Array(items) => Self::List(items.iter().map(display_json).collect()),
                Value::String(s) => match serde_json::from_str::<Vec<Value>>(s) {
                    Ok(items) => Self::List(items.iter().map(display_json).collect()),
                    Err(_) => Self::List(vec![s.clone()]),
                },
                other => Self::List(vec![display_json(other)]),
            },
            ColumnType::Json
            | ColumnType::LineChart
            | ColumnType::BarChart
            | ColumnType::AreaChart => Self::Json(value.clone()),
            ColumnType::String
            | ColumnType::Link
            | ColumnType::Image
            | ColumnType::Selectbox => Self::Text(display_json(value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Json(value) => value.is_null(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Canonical string form used by search, CSV export and text filters.
    pub fn canonical_string(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => b.to_string(),
            Self::Date(d) => d.format(DATE_FORMAT).to_string(),
            Self::Time(t) => t.format(TIME_FORMAT).to_string(),
            Self::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
            Self::List(items) => Value::from(items.clone()).to_string(),
            Self::Json(value) => value.to_string(),
        }
    }

    /// String form suitable for seeding an editor buffer.
    pub fn edit_text(&self) -> String {
        match self {
            Self::Json(Value::String(s)) => s.clone(),
            other => other.canonical_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Text(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::Number((*n).into()),
            Self::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
            Self::Bool(b) => Value::Bool(*b),
            Self::Date(_) | Self::Time(_) | Self::DateTime(_) => {
                Value::String(self.canonical_string())
            }
            Self::List(items) => Value::from(items.clone()),
            Self::Json(value) => value.clone(),
        }
    }

    /// Items of a list-like value, used by set-membership filters.
    pub fn list_items(&self) -> Option<Vec<String>> {
        match self {
            Self::List(items) => Some(items.clone()),
            Self::Json(Value::Array(items)) => Some(items.iter().map(display_json).collect()),
            Self::Empty => Some(Vec::new()),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) | Self::Number(_) => 2,
            Self::Date(_) | Self::DateTime(_) => 3,
            Self::Time(_) => 4,
            Self::Text(_) => 5,
            Self::List(_) | Self::Json(_) => 6,
        }
    }
}

/// Orders two non-empty cells. Mixed kinds fall back to a fixed kind rank.
pub fn compare_cells(left: &CellValue, right: &CellValue) -> Ordering {
    use CellValue::*;

    match (left, right) {
        (Integer(a), Integer(b)) => a.cmp(b),
        (Integer(_) | Number(_), Integer(_) | Number(_)) => {
            let a = left.as_f64().unwrap_or(f64::NAN);
            let b = right.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Bool(a), Bool(b)) => u8::from(*a).cmp(&u8::from(*b)),
        (Text(a), Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Date(a), Date(b)) => a.cmp(b),
        (Time(a), Time(b)) => a.cmp(b),
        (DateTime(a), DateTime(b)) => a.cmp(b),
        (Date(a), DateTime(b)) => a.and_time(NaiveTime::MIN).cmp(b),
        (DateTime(a), Date(b)) => a.cmp(&b.and_time(NaiveTime::MIN)),
        (List(_) | Json(_), List(_) | Json(_)) => {
            left.canonical_string().cmp(&right.canonical_string())
        }
        _ => left
            .type_rank()
            .cmp(&right.type_rank())
            .then_with(|| left.canonical_string().cmp(&right.canonical_string())),
    }
}

/// Formats a JSON value for display, without quoting plain strings.
pub fn display_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_f64(s),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

pub fn parse_f64(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    let trimmed = raw.trim().to_ascii_lowercase();
    match trimmed.as_str() {
        "true" | "1" | "yes" | "y" | "on" | "checked" => Some(true),
        "false" | "0" | "no" | "n" | "off" | "unchecked" => Some(false),
        _ => None,
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .ok()
        .or_else(|| parse_datetime(trimmed).map(|dt| dt.date()))
}

pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f"))
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .ok()
}

/// Accepts ISO timestamps with or without an offset, or a bare date at midnight.
/// Offset timestamps are normalized to UTC.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

fn text_or(value: &Value, parse: impl Fn(&str) -> Option<CellValue>) -> CellValue {
    match value {
        Value::String(s) => parse(s).unwrap_or_else(|| CellValue::Text(s.clone())),
        other => CellValue::Text(display_json(other)),
    }
}

fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return String::new();
    }
    value.to_string()
}
