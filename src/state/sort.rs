use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::state::column::ColumnIndex;
use crate::state::row::Row;
use crate::state::value::{self, CellValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Asc)
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Desc)
    }
}

/// Stable multi-key sort. The first spec is the primary key; empty cells
/// always sort last; ties fall back to the original position.
pub fn apply_sorts<'a>(
    mut rows: Vec<&'a Row>,
    sorts: &[SortSpec],
    columns: &ColumnIndex,
) -> Vec<&'a Row> {
    let keys: Vec<(usize, SortDirection)> = sorts
        .iter()
        .filter_map(|spec| columns.get(&spec.column).map(|(idx, _)| (idx, spec.direction)))
        .collect();

    rows.sort_by(|a, b| {
        keys.iter()
            .map(|(idx, direction)| compare_keyed(a.cell(*idx), b.cell(*idx), *direction))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.original_position.cmp(&b.original_position))
    });
    rows
}

fn compare_keyed(
    a: Option<&CellValue>,
    b: Option<&CellValue>,
    direction: SortDirection,
) -> Ordering {
    let a = a.filter(|cell| !matches!(cell, CellValue::Empty));
    let b = b.filter(|cell| !matches!(cell, CellValue::Empty));

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(left), Some(right)) => {
            let ord = value::compare_cells(left, right);
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }
    }
}

/// Cycles `column` through asc -> desc -> unsorted. With `multi` the other
/// keys are kept; otherwise the result holds at most this column.
pub fn toggle_sort(current: &[SortSpec], column: &str, multi: bool) -> Vec<SortSpec> {
    let existing = current.iter().find(|s| s.column == column).map(|s| s.direction);
    let next = match existing {
        None => Some(SortDirection::Asc),
        Some(SortDirection::Asc) => Some(SortDirection::Desc),
        Some(SortDirection::Desc) => None,
    };

    if !multi {
        return next
            .map(|direction| vec![SortSpec::new(column, direction)])
            .unwrap_or_default();
    }

    let mut out: Vec<SortSpec> = Vec::with_capacity(current.len() + 1);
    for spec in current {
        if spec.column == column {
            if let Some(direction) = next {
                out.push(SortSpec::new(column, direction));
            }
        } else {
            out.push(spec.clone());
        }
    }
    if existing.is_none() {
        out.push(SortSpec::asc(column));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_toggle_cycles_and_replaces_others() {
        let current = vec![SortSpec::asc("a")];
        assert_eq!(toggle_sort(&current, "b", false), vec![SortSpec::asc("b")]);
        assert_eq!(toggle_sort(&current, "a", false), vec![SortSpec::desc("a")]);
        assert!(toggle_sort(&[SortSpec::desc("a")], "a", false).is_empty());
    }

    #[test]
    fn multi_toggle_keeps_priority_slot() {
        let current = vec![SortSpec::asc("a"), SortSpec::asc("b")];
        assert_eq!(
            toggle_sort(&current, "a", true),
            vec![SortSpec::desc("a"), SortSpec::asc("b")]
        );
        assert_eq!(
            toggle_sort(&current, "c", true),
            vec![SortSpec::asc("a"), SortSpec::asc("b"), SortSpec::asc("c")]
        );
        assert_eq!(
            toggle_sort(&[SortSpec::desc("a"), SortSpec::asc("b")], "a", true),
            vec![SortSpec::asc("b")]
        );
    }
}
