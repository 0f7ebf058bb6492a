use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Time,
    Datetime,
    Progress,
    Link,
    Image,
    List,
    Multiselect,
    Json,
    LineChart,
    BarChart,
    AreaChart,
    Selectbox,
}

/// Operator family a column type is filtered and edited with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeFamily {
    Numeric,
    Boolean,
    Temporal,
    List,
    Text,
}

impl ColumnType {
    pub fn family(self) -> TypeFamily {
        match self {
            Self::Number | Self::Integer | Self::Progress => TypeFamily::Numeric,
            Self::Boolean => TypeFamily::Boolean,
            Self::Date | Self::Time | Self::Datetime => TypeFamily::Temporal,
            Self::List | Self::Multiselect => TypeFamily::List,
            _ => TypeFamily::Text,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::Datetime => "datetime",
            Self::Progress => "progress",
            Self::Link => "link",
            Self::Image => "image",
            Self::List => "list",
            Self::Multiselect => "multiselect",
            Self::Json => "json",
            Self::LineChart => "line_chart",
            Self::BarChart => "bar_chart",
            Self::AreaChart => "area_chart",
            Self::Selectbox => "selectbox",
        }
    }

    /// Chart and image cells have no text editor.
    pub fn is_editable(self) -> bool {
        !matches!(
            self,
            Self::Image | Self::LineChart | Self::BarChart | Self::AreaChart
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeToken {
    Small,
    Medium,
    Large,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnWidth {
    Pixels(f64),
    Size(SizeToken),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pinned {
    Left,
    Right,
    #[default]
    None,
}

/// Raw column as described by the data source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            label: None,
        }
    }
}

/// Per-column overrides supplied by the caller. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnConfig {
    #[serde(rename = "type")]
    pub column_type: Option<ColumnType>,
    pub label: Option<String>,
    pub help: Option<String>,
    pub hidden: Option<bool>,
    pub disabled: Option<bool>,
    pub required: Option<bool>,
    pub width: Option<ColumnWidth>,
    pub min_width: Option<f64>,
    pub max_width: Option<f64>,
    pub resizable: Option<bool>,
    pub pinned: Option<Pinned>,
    pub options: Option<Vec<String>>,
    pub default: Option<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub max_chars: Option<usize>,
    pub validate: Option<String>,
}

/// Canonical column record after merging descriptor and config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub label: String,
    pub help: Option<String>,
    pub hidden: bool,
    pub disabled: bool,
    pub required: bool,
    pub width: Option<ColumnWidth>,
    pub min_width: Option<f64>,
    pub max_width: Option<f64>,
    pub resizable: bool,
    pub pinned: Pinned,
    pub options: Vec<String>,
    pub default: Option<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub max_chars: Option<usize>,
    pub validate: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            column_type,
            help: None,
            hidden: false,
            disabled: false,
            required: false,
            width: None,
            min_width: None,
            max_width: None,
            resizable: true,
            pinned: Pinned::None,
            options: Vec::new(),
            default: None,
            min: None,
            max: None,
            step: None,
            max_chars: None,
            validate: None,
        }
    }

    fn apply_config(mut self, config: &ColumnConfig) -> Self {
        if let Some(label) = config.label.as_ref() {
            self.label = label.clone();
        }
        self.help = config.help.clone().or(self.help);
        self.hidden = config.hidden.unwrap_or(self.hidden);
        self.disabled = config.disabled.unwrap_or(self.disabled);
        self.required = config.required.unwrap_or(self.required);
        self.width = config.width.or(self.width);
        self.min_width = config.min_width.or(self.min_width);
        self.max_width = config.max_width.or(self.max_width);
        self.resizable = config.resizable.unwrap_or(self.resizable);
        self.pinned = config.pinned.unwrap_or(self.pinned);
        if let Some(options) = config.options.as_ref() {
            self.options = options.clone();
        }
        self.default = config.default.clone().or(self.default);
        self.min = config.min.or(self.min);
        self.max = config.max.or(self.max);
        self.step = config.step.or(self.step);
        self.max_chars = config.max_chars.or(self.max_chars);
        self.validate = config.validate.clone().or(self.validate);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("column name must not be empty")]
    EmptyName,
    #[error("unknown selection mode '{0}'")]
    UnknownSelectionMode(String),
}

/// Merges raw descriptors with per-column config into canonical columns,
/// preserving descriptor order.
pub fn normalize_columns(
    descriptors: &[ColumnDescriptor],
    config: &BTreeMap<String, ColumnConfig>,
) -> Result<Vec<Column>, SchemaError> {
    let mut seen = BTreeSet::new();
    let mut columns = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let name = descriptor.name.trim();
        if name.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if !seen.insert(name.to_string()) {
            return Err(SchemaError::DuplicateColumn(name.to_string()));
        }

        let overrides = config.get(name);
        let column_type = overrides
            .and_then(|c| c.column_type)
            .unwrap_or(descriptor.column_type);
        let mut column = Column::new(name, column_type);
        if let Some(label) = descriptor.label.as_ref() {
            column.label = label.clone();
        }
        if let Some(overrides) = overrides {
            column = column.apply_config(overrides);
        }
        columns.push(column);
    }

    for name in config.keys() {
        if !seen.contains(name.as_str()) {
            tracing::debug!(column = %name, "ignoring config for unknown column");
        }
    }

    Ok(columns)
}

/// Ordered (name, type) pairs identifying a schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFingerprint(pub Vec<(String, ColumnType)>);

impl SchemaFingerprint {
    pub fn of(columns: &[Column]) -> Self {
        Self(
            columns
                .iter()
                .map(|c| (c.name.clone(), c.column_type))
                .collect(),
        )
    }

    /// Stable FNV-1a digest, used to scope storage keys to a schema.
    pub fn tag(&self) -> String {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = OFFSET;
        for (name, column_type) in &self.0 {
            for byte in name
                .bytes()
                .chain([0u8])
                .chain(column_type.as_str().bytes())
                .chain([0xffu8])
            {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(PRIME);
            }
        }
        format!("{hash:016x}")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(n, _)| n == name)
    }
}

/// Name lookup from column name to its position in a row's cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnIndex {
    entries: BTreeMap<String, (usize, ColumnType)>,
}

impl ColumnIndex {
    pub fn new(columns: &[Column]) -> Self {
        Self {
            entries: columns
                .iter()
                .enumerate()
                .map(|(idx, c)| (c.name.clone(), (idx, c.column_type)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<(usize, ColumnType)> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_tag_changes_with_type() {
        let a = SchemaFingerprint(vec![("age".into(), ColumnType::Integer)]);
        let b = SchemaFingerprint(vec![("age".into(), ColumnType::String)]);
        assert_ne!(a.tag(), b.tag());
        assert_eq!(a.tag(), a.clone().tag());
    }

    #[test]
    fn width_accepts_pixels_or_token() {
        let px: ColumnWidth = serde_json::from_str("120").unwrap();
        let token: ColumnWidth = serde_json::from_str("\"large\"").unwrap();
        assert_eq!(px, ColumnWidth::Pixels(120.0));
        assert_eq!(token, ColumnWidth::Size(SizeToken::Large));
    }
}
