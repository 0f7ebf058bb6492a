use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::LayoutConfig;
use crate::state::column::{Column, ColumnWidth, Pinned, SizeToken};
use crate::state::row::Row;
use crate::state::view_state::ViewState;

/// A visible column with its final width and sticky offsets.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedColumn {
    pub column: Column,
    pub original_index: usize,
    pub width_px: f64,
    pub pinned: Pinned,
    pub left_offset: Option<f64>,
    pub right_offset: Option<f64>,
}

impl ResolvedColumn {
    pub fn name(&self) -> &str {
        &self.column.name
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLayout {
    pub columns: Vec<ResolvedColumn>,
    pub total_width: f64,
}

impl ColumnLayout {
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.column.name.clone()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.column.name == name)
    }
}

/// Computes ordered, sized and pinned columns. Pure in its inputs.
pub fn resolve_layout(
    columns: &[Column],
    view: &ViewState,
    sample: &[Row],
    config: &LayoutConfig,
) -> ColumnLayout {
    let by_name: BTreeMap<&str, (usize, &Column)> = columns
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.name.as_str(), (idx, c)))
        .collect();
    let sample = &sample[..sample.len().min(config.sample_rows)];

    let mut left = Vec::new();
    let mut middle = Vec::new();
    let mut right = Vec::new();

    for name in &view.column_order {
        let Some((original_index, column)) = by_name.get(name.as_str()).copied() else {
            continue;
        };
        if column.hidden || view.hidden_columns.contains(name) {
            continue;
        }

        let pinned = view
            .pinned_columns
            .get(name)
            .copied()
            .unwrap_or(column.pinned);
        let resolved = ResolvedColumn {
            column: column.clone(),
            original_index,
            width_px: resolve_width(column, original_index, view, sample, config),
            pinned,
            left_offset: None,
            right_offset: None,
        };
        match pinned {
            Pinned::Left => left.push(resolved),
            Pinned::Right => right.push(resolved),
            Pinned::None => middle.push(resolved),
        }
    }

    let mut offset = 0.0;
    for column in &mut left {
        column.left_offset = Some(offset);
        offset += column.width_px;
    }
    let mut offset = 0.0;
    for column in right.iter_mut().rev() {
        column.right_offset = Some(offset);
        offset += column.width_px;
    }

    let mut resolved = left;
    resolved.extend(middle);
    resolved.extend(right);
    let total_width = resolved.iter().map(|c| c.width_px).sum();

    ColumnLayout {
        columns: resolved,
        total_width,
    }
}

fn resolve_width(
    column: &Column,
    original_index: usize,
    view: &ViewState,
    sample: &[Row],
    config: &LayoutConfig,
) -> f64 {
    let min = column.min_width.unwrap_or(config.min_width_px);
    let max = column
        .max_width
        .unwrap_or(config.max_auto_width_px)
        .max(min);

    let longest = sample
        .iter()
        .filter_map(|row| row.cell(original_index))
        .map(|cell| cell.canonical_string().chars().count())
        .max()
        .unwrap_or(0)
        .max(column.label.chars().count());
    let mut width =
        (longest as f64 * config.char_width_px + config.cell_padding_px).clamp(min, max);

    if let Some(ColumnWidth::Pixels(px)) = column.width {
        width = px;
    }
    if let Some(manual) = view.manual_widths.get(&column.name) {
        width = *manual;
    }
    if let Some(ColumnWidth::Size(token)) = column.width {
        width = match token {
            SizeToken::Small => config.small_px,
            SizeToken::Medium => config.medium_px,
            SizeToken::Large => config.large_px,
        };
    }

    clamp_explicit(width, column)
}

fn clamp_explicit(width: f64, column: &Column) -> f64 {
    let mut width = width;
    if let Some(min) = column.min_width {
        width = width.max(min);
    }
    if let Some(max) = column.max_width {
        width = width.min(max);
    }
    width
}
