use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Sizing constants used by the column layout resolver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub char_width_px: f64,
    pub cell_padding_px: f64,
    pub min_width_px: f64,
    pub max_auto_width_px: f64,
    pub sample_rows: usize,
    pub small_px: f64,
    pub medium_px: f64,
    pub large_px: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            char_width_px: 8.0,
            cell_padding_px: 16.0,
            min_width_px: 110.0,
            max_auto_width_px: 500.0,
            sample_rows: 50,
            small_px: 75.0,
            medium_px: 200.0,
            large_px: 400.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub row_height: f64,
    pub overscan_rows: usize,
    pub window_size: usize,
    pub edit_debounce_ms: u64,
    pub scroll_persist_debounce_ms: u64,
    pub export_chunk_size: usize,
    pub csv_prefix: String,
    pub layout: LayoutConfig,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            row_height: 35.0,
            overscan_rows: 6,
            window_size: 300,
            edit_debounce_ms: 250,
            scroll_persist_debounce_ms: 500,
            export_chunk_size: 1000,
            csv_prefix: "data".to_string(),
            layout: LayoutConfig::default(),
        }
    }
}

impl GridConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn edit_debounce(&self) -> Duration {
        Duration::from_millis(self.edit_debounce_ms)
    }

    pub fn scroll_persist_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_persist_debounce_ms)
    }
}
