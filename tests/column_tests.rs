use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{json, Value};

use gridkit::state::column::{
    normalize_columns, Column, ColumnConfig, ColumnDescriptor, ColumnType, ColumnWidth, Pinned,
    SchemaError, SchemaFingerprint, SizeToken, TypeFamily,
};
use gridkit::state::row::{self, Row};
use gridkit::state::value::{self, CellValue};

fn descriptors() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("name", ColumnType::String),
        ColumnDescriptor::new("age", ColumnType::Integer),
        ColumnDescriptor::new("joined", ColumnType::Date),
    ]
}

#[test]
fn test_normalize_applies_config() {
    let config: BTreeMap<String, ColumnConfig> = serde_json::from_value(json!({
        "age": {"label": "Age (years)", "width": "small", "pinned": "left", "min": 0},
        "joined": {"type": "datetime", "hidden": true},
        "ghost": {"label": "never used"}
    }))
    .unwrap();

    let columns = normalize_columns(&descriptors(), &config).unwrap();
    assert_eq!(columns.len(), 3);
    assert_eq!(columns[0], Column::new("name", ColumnType::String));

    let age = &columns[1];
    assert_eq!(age.label, "Age (years)");
    assert_eq!(age.width, Some(ColumnWidth::Size(SizeToken::Small)));
    assert_eq!(age.pinned, Pinned::Left);
    assert_eq!(age.min, Some(0.0));
    assert!(age.resizable);

    assert_eq!(columns[2].column_type, ColumnType::Datetime);
    assert!(columns[2].hidden);
}

#[test]
fn test_normalize_rejects_duplicates_and_empty_names() {
    let mut dup = descriptors();
    dup.push(ColumnDescriptor::new("age", ColumnType::Number));
    assert_eq!(
        normalize_columns(&dup, &BTreeMap::new()),
        Err(SchemaError::DuplicateColumn("age".into()))
    );

    let empty = vec![ColumnDescriptor::new("  ", ColumnType::String)];
    assert_eq!(
        normalize_columns(&empty, &BTreeMap::new()),
        Err(SchemaError::EmptyName)
    );
}

#[test]
fn test_pixel_width_config() {
    let config: BTreeMap<String, ColumnConfig> =
        serde_json::from_value(json!({"name": {"width": 240}})).unwrap();
    let columns = normalize_columns(&descriptors(), &config).unwrap();
    assert_eq!(columns[0].width, Some(ColumnWidth::Pixels(240.0)));
}

#[test]
fn test_type_families() {
    assert_eq!(ColumnType::Progress.family(), TypeFamily::Numeric);
    assert_eq!(ColumnType::Time.family(), TypeFamily::Temporal);
    assert_eq!(ColumnType::Multiselect.family(), TypeFamily::List);
    assert_eq!(ColumnType::Link.family(), TypeFamily::Text);
    assert!(!ColumnType::Image.is_editable());
    assert!(ColumnType::Selectbox.is_editable());
}

#[test]
fn test_fingerprint_tracks_names_and_types() {
    let columns = normalize_columns(&descriptors(), &BTreeMap::new()).unwrap();
    let a = SchemaFingerprint::of(&columns);
    assert_eq!(a, SchemaFingerprint::of(&columns));
    assert_eq!(a.tag(), SchemaFingerprint::of(&columns).tag());
    assert_eq!(a.tag().len(), 16);
    assert!(a.contains("joined"));

    let mut retyped = columns.clone();
    retyped[1].column_type = ColumnType::Number;
    assert_ne!(a.tag(), SchemaFingerprint::of(&retyped).tag());

    let mut reordered = columns.clone();
    reordered.swap(0, 1);
    assert_ne!(a.tag(), SchemaFingerprint::of(&reordered).tag());
}

#[test]
fn test_cell_coercion_per_type() {
    assert_eq!(CellValue::from_json(&json!("42"), ColumnType::Integer), CellValue::Integer(42));
    assert_eq!(CellValue::from_json(&json!(1.5), ColumnType::Integer), CellValue::Number(1.5));
    assert_eq!(
        CellValue::from_json(&json!("abc"), ColumnType::Number),
        CellValue::Text("abc".into())
    );
    assert_eq!(CellValue::from_json(&json!("yes"), ColumnType::Boolean), CellValue::Bool(true));
    assert_eq!(
        CellValue::from_json(&json!("2024-02-29"), ColumnType::Date),
        CellValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
    );
    assert_eq!(
        CellValue::from_json(&json!(["a", 1]), ColumnType::List),
        CellValue::List(vec!["a".into(), "1".into()])
    );
    assert_eq!(CellValue::from_json(&Value::Null, ColumnType::String), CellValue::Empty);
}

#[test]
fn test_datetime_with_offset_normalizes_to_utc() {
    let parsed = value::parse_datetime("2024-01-01T10:00:00+02:00").unwrap();
    assert_eq!(parsed.format("%Y-%m-%dT%H:%M:%S").to_string(), "2024-01-01T08:00:00");
}

#[test]
fn test_rows_pad_missing_cells_and_carry_index() {
    let columns = normalize_columns(&descriptors(), &BTreeMap::new()).unwrap();
    let index = [json!("a"), json!(7)];
    let rows: Vec<Row> = row::rows_from_values(
        &[vec![json!("Ann")], vec![json!("Ben"), json!(3), json!("2020-05-05"), json!("extra")]],
        Some(&index[..]),
        &columns,
    );

    assert_eq!(rows[0].cells.len(), 3);
    assert_eq!(rows[0].cells[1], CellValue::Empty);
    assert_eq!(rows[0].index_value, Some(CellValue::Text("a".into())));
    assert_eq!(rows[1].cells.len(), 3);
    assert_eq!(rows[1].index_value, Some(CellValue::Integer(7)));
    assert_eq!(rows[1].row_id, "row-1");
    assert_eq!(rows[1].to_json()[2], json!("2020-05-05"));
}
