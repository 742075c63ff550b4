//! Purpose: Shared table JSON serializers for CLI output.
//! Exports: `table_info_json`, `columns_json`, `row_json`.
//! Role: Keep table metadata and row envelope shapes consistent across commands.
//! Invariants: Stable key names for table info and row payloads.

use rowstore::api::{Column, ColumnType, IndexEntry, Row, Schema, StoreInfo};
use serde_json::{Map, Value, json};

pub(crate) fn columns_json(columns: &[Column]) -> Value {
    let columns = columns
        .iter()
        .map(|column| {
            let mut map = Map::new();
            map.insert("name".to_string(), json!(column.name));
            map.insert("type".to_string(), json!(column.column_type.name()));
            if let ColumnType::FixedText(width) = column.column_type {
                map.insert("width".to_string(), json!(width));
            }
            map.insert("bytes".to_string(), json!(column.byte_width()));
            Value::Object(map)
        })
        .collect();
    Value::Array(columns)
}

pub(crate) fn table_info_json(info: &StoreInfo, schema: &Schema) -> Value {
    let mut map = Map::new();
    map.insert("name".to_string(), json!(info.name));
    map.insert(
        "data_path".to_string(),
        json!(info.data_path.display().to_string()),
    );
    map.insert(
        "index_path".to_string(),
        json!(info.index_path.display().to_string()),
    );
    map.insert("rows".to_string(), json!(info.row_count));
    map.insert("record_size".to_string(), json!(info.record_size));
    map.insert("data_bytes".to_string(), json!(info.data_len));
    map.insert("columns".to_string(), columns_json(schema.columns()));
    Value::Object(map)
}

/// Row envelope: index entry coordinates plus column name to value.
pub(crate) fn row_json(schema: &Schema, entry: Option<IndexEntry>, row: &Row) -> Value {
    let values = schema
        .columns()
        .iter()
        .zip(row)
        .map(|(column, value)| (column.name.clone(), json!(value)))
        .collect::<Map<_, _>>();
    let mut map = Map::new();
    if let Some(entry) = entry {
        map.insert("id".to_string(), json!(entry.row_id));
        map.insert("offset".to_string(), json!(entry.offset));
    }
    map.insert("values".to_string(), Value::Object(values));
    Value::Object(map)
}
