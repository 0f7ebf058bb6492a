use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::column::{ColumnIndex, ColumnType, TypeFamily};
use crate::state::row::Row;
use crate::state::value::{self, CellValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    IsEmpty,
    NotEmpty,
    IsTrue,
    IsFalse,
    Before,
    OnOrBefore,
    After,
    OnOrAfter,
    ContainsAny,
    ContainsAll,
}

impl FilterOp {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_value(Value::String(raw.trim().to_ascii_lowercase())).ok()
    }

    /// Operators that ignore the filter value.
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Self::IsEmpty | Self::NotEmpty | Self::IsTrue | Self::IsFalse
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub id: String,
    pub column: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: Value,
}

impl FilterSpec {
    /// Builds a filter under a fresh id, so it is added alongside any
    /// existing filter on the same column.
    pub fn new(column: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            id: format!("filter-{}", uuid::Uuid::new_v4().simple()),
            column: column.into(),
            op,
            value,
        }
    }

    /// Reuses `id`; adding the result replaces the filter holding that id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Narrows `rows` to those matching the free-text search and every filter.
/// Input order is preserved.
pub fn apply_search_and_filters<'a, I>(
    rows: I,
    search: &str,
    filters: &[FilterSpec],
    columns: &ColumnIndex,
) -> Vec<&'a Row>
where
    I: IntoIterator<Item = &'a Row>,
{
    let needle = search.trim().to_lowercase();
    rows.into_iter()
        .filter(|row| matches_search(row, &needle))
        .filter(|row| filters.iter().all(|f| matches_filter(row, f, columns)))
        .collect()
}

fn matches_search(row: &Row, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    row.cells
        .iter()
        .any(|cell| cell.canonical_string().to_lowercase().contains(needle))
}

/// Evaluates one filter. A filter on a column that no longer exists passes.
pub fn matches_filter(row: &Row, filter: &FilterSpec, columns: &ColumnIndex) -> bool {
    let Some((index, column_type)) = columns.get(&filter.column) else {
        return true;
    };
    let cell = row.cell(index).unwrap_or(&CellValue::Empty);

    match filter.op {
        FilterOp::IsEmpty => return cell.is_empty(),
        FilterOp::NotEmpty => return !cell.is_empty(),
        _ => {}
    }

    match column_type.family() {
        TypeFamily::Numeric => numeric_predicate(cell, filter),
        TypeFamily::Boolean => boolean_predicate(cell, filter.op),
        TypeFamily::Temporal => temporal_predicate(cell, filter, column_type),
        TypeFamily::List => list_predicate(cell, filter),
        TypeFamily::Text => text_predicate(cell, filter),
    }
}

fn numeric_predicate(cell: &CellValue, filter: &FilterSpec) -> bool {
    if filter.op == FilterOp::Between {
        let Some((lo, hi)) = numeric_bounds(&filter.value) else {
            return true;
        };
        return cell.as_f64().is_some_and(|n| n >= lo && n <= hi);
    }

    let Some(target) = value::value_as_f64(&filter.value) else {
        return true;
    };
    let Some(n) = cell.as_f64() else {
        return false;
    };

    match filter.op {
        FilterOp::Equals => n == target,
        FilterOp::NotEquals => n != target,
        FilterOp::Gt => n > target,
        FilterOp::Gte => n >= target,
        FilterOp::Lt => n < target,
        FilterOp::Lte => n <= target,
        _ => true,
    }
}

fn numeric_bounds(value: &Value) -> Option<(f64, f64)> {
    let Value::Array(items) = value else {
        return None;
    };
    let [lo, hi] = items.as_slice() else {
        return None;
    };
    Some((value::value_as_f64(lo)?, value::value_as_f64(hi)?))
}

fn boolean_predicate(cell: &CellValue, op: FilterOp) -> bool {
    match op {
        FilterOp::IsTrue => matches!(cell, CellValue::Bool(true)),
        FilterOp::IsFalse => matches!(cell, CellValue::Bool(false)),
        _ => true,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
enum TemporalKey {
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

fn temporal_key(cell: &CellValue, column_type: ColumnType) -> Option<TemporalKey> {
    match (cell, column_type) {
        (CellValue::Date(d), ColumnType::Datetime) => {
            Some(TemporalKey::DateTime(d.and_time(NaiveTime::MIN)))
        }
        (CellValue::Date(d), _) => Some(TemporalKey::Date(*d)),
        (CellValue::Time(t), _) => Some(TemporalKey::Time(*t)),
        (CellValue::DateTime(dt), ColumnType::Date) => Some(TemporalKey::Date(dt.date())),
        (CellValue::DateTime(dt), _) => Some(TemporalKey::DateTime(*dt)),
        (CellValue::Text(s), ty) => parse_temporal(s, ty),
        _ => None,
    }
}

fn parse_temporal(raw: &str, column_type: ColumnType) -> Option<TemporalKey> {
    match column_type {
        ColumnType::Date => value::parse_date(raw).map(TemporalKey::Date),
        ColumnType::Time => value::parse_time(raw).map(TemporalKey::Time),
        _ => value::parse_datetime(raw).map(TemporalKey::DateTime),
    }
}

fn temporal_bound(value: &Value, column_type: ColumnType) -> Option<TemporalKey> {
    match value {
        Value::String(s) => parse_temporal(s, column_type),
        _ => None,
    }
}

fn temporal_predicate(cell: &CellValue, filter: &FilterSpec, column_type: ColumnType) -> bool {
    let Some(key) = temporal_key(cell, column_type) else {
        return false;
    };
    let compare = |bound: TemporalKey| key.partial_cmp(&bound);

    if filter.op == FilterOp::Between {
        let Value::Array(items) = &filter.value else {
            return false;
        };
        let [lo, hi] = items.as_slice() else {
            return false;
        };
        let (Some(lo), Some(hi)) = (
            temporal_bound(lo, column_type),
            temporal_bound(hi, column_type),
        ) else {
            return false;
        };
        return matches!(compare(lo), Some(Ordering::Greater | Ordering::Equal))
            && matches!(compare(hi), Some(Ordering::Less | Ordering::Equal));
    }

    let Some(bound) = temporal_bound(&filter.value, column_type) else {
        return false;
    };
    match (filter.op, compare(bound)) {
        (_, None) => false,
        (FilterOp::Before, Some(ord)) => ord == Ordering::Less,
        (FilterOp::OnOrBefore, Some(ord)) => ord != Ordering::Greater,
        (FilterOp::After, Some(ord)) => ord == Ordering::Greater,
        (FilterOp::OnOrAfter, Some(ord)) => ord != Ordering::Less,
        (FilterOp::Equals, Some(ord)) => ord == Ordering::Equal,
        _ => true,
    }
}

fn list_predicate(cell: &CellValue, filter: &FilterSpec) -> bool {
    let Some(items) = cell.list_items() else {
        return false;
    };
    let items: BTreeSet<String> = items.into_iter().map(|s| s.to_lowercase()).collect();
    let wanted: Vec<String> = match &filter.value {
        Value::Array(values) => values
            .iter()
            .map(|v| value::display_json(v).to_lowercase())
            .collect(),
        Value::Null => Vec::new(),
        other => vec![value::display_json(other).to_lowercase()],
    };

    match filter.op {
        FilterOp::ContainsAny => wanted.iter().any(|w| items.contains(w)),
        FilterOp::ContainsAll => wanted.iter().all(|w| items.contains(w)),
        _ => true,
    }
}

fn text_predicate(cell: &CellValue, filter: &FilterSpec) -> bool {
    let haystack = cell.canonical_string().to_lowercase();
    let needle = value::display_json(&filter.value).to_lowercase();

    match filter.op {
        FilterOp::Contains => haystack.contains(&needle),
        FilterOp::NotContains => !haystack.contains(&needle),
        FilterOp::Equals => haystack == needle,
        FilterOp::NotEquals => haystack != needle,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_parses_snake_case() {
        assert_eq!(FilterOp::parse("on_or_after"), Some(FilterOp::OnOrAfter));
        assert_eq!(FilterOp::parse("GTE"), Some(FilterOp::Gte));
        assert_eq!(FilterOp::parse("nope"), None);
    }

    #[test]
    fn between_requires_two_numeric_bounds() {
        assert_eq!(numeric_bounds(&serde_json::json!([1, 5])), Some((1.0, 5.0)));
        assert_eq!(numeric_bounds(&serde_json::json!([1, "x"])), None);
        assert_eq!(numeric_bounds(&serde_json::json!(3)), None);
    }
}
