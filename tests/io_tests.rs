use std::collections::BTreeMap;

use serde_json::{json, Value};

use gridkit::config::GridConfig;
use gridkit::io::json_io::{self, JsonIoError};
use gridkit::state::column::{ColumnConfig, ColumnType};
use gridkit::state::value::CellValue;

#[test]
fn test_load_json_valid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.json");
    std::fs::write(
        &path,
        r#"[{"name":"Alice","age":30},{"name":"Bob","age":25,"city":"Oslo"}]"#,
    )
    .unwrap();

    let table = json_io::load_json(&path).unwrap();
    let names: Vec<&str> = table.descriptors.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["name", "age", "city"]);
    assert_eq!(table.descriptors[1].column_type, ColumnType::Integer);
    assert_eq!(table.rows[0], vec![json!("Alice"), json!(30), Value::Null]);
}

#[test]
fn test_load_json_empty_array() {
    let table = json_io::parse_json("[]").unwrap();
    assert!(table.descriptors.is_empty());
    assert!(table.rows.is_empty());
}

#[test]
fn test_load_json_not_array() {
    assert!(matches!(
        json_io::parse_json(r#"{"a":1}"#),
        Err(JsonIoError::NotAnArray)
    ));
}

#[test]
fn test_load_json_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        json_io::load_json(&dir.path().join("nope.json")),
        Err(JsonIoError::Io(_))
    ));
}

#[test]
fn test_load_json_invalid_syntax() {
    assert!(matches!(
        json_io::parse_json("[{"),
        Err(JsonIoError::Parse(_))
    ));
}

#[test]
fn test_into_grid_applies_column_config() {
    let table = json_io::parse_json(r#"[{"when":"2024-05-01","n":"7"}]"#).unwrap();
    let config: BTreeMap<String, ColumnConfig> =
        serde_json::from_value(json!({"n": {"type": "integer", "label": "N"}})).unwrap();

    let (columns, rows) = table.into_grid(&config).unwrap();
    assert_eq!(columns[0].column_type, ColumnType::Date);
    assert_eq!(columns[1].label, "N");
    assert_eq!(rows[0].cells[1], CellValue::Integer(7));
}

#[test]
fn test_save_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.json");
    let table = json_io::parse_json(r#"[{"a":1,"b":"x"},{"a":2,"b":null}]"#).unwrap();
    let (columns, _) = table.clone().into_grid(&BTreeMap::new()).unwrap();

    json_io::save_json(&path, &columns, &table.rows).unwrap();
    let reloaded = json_io::load_json(&path).unwrap();
    assert_eq!(reloaded, table);
}

#[test]
fn test_grid_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.json");
    std::fs::write(&path, r#"{"row_height": 28, "csv_prefix": "export"}"#).unwrap();

    let config = GridConfig::load(&path).unwrap();
    assert_eq!(config.row_height, 28.0);
    assert_eq!(config.csv_prefix, "export");
    assert_eq!(config.edit_debounce_ms, 250);
    assert!(GridConfig::load(&dir.path().join("missing.json")).is_err());
}
