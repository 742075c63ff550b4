//! Purpose: Ordered, typed column list consumed by the codec, layout, store, and joins.
//! Exports: `ColumnType`, `Column`, `Schema`, `ID_COLUMN`.
//! Role: Concrete schema service; resolves column names to on-disk positions.
//! Invariants: Column 0 is always the implicit `_id: Int64` identifier.
//! Invariants: Names are unique and every column has a non-zero fixed width.
//! Invariants: A whole record (header plus payload) fits the header's u32 size field.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::layout::RECORD_HEADER_LEN;

pub const ID_COLUMN: &str = "_id";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnType {
    Int32,
    Int64,
    Float32,
    Float64,
    FixedText(usize),
    ForeignKey,
}

impl ColumnType {
    pub fn byte_width(&self) -> usize {
        match self {
            ColumnType::Int32 | ColumnType::Float32 => 4,
            ColumnType::Int64 | ColumnType::Float64 | ColumnType::ForeignKey => 8,
            ColumnType::FixedText(width) => *width,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int32 => "int32",
            ColumnType::Int64 => "int64",
            ColumnType::Float32 => "float32",
            ColumnType::Float64 => "float64",
            ColumnType::FixedText(_) => "text",
            ColumnType::ForeignKey => "foreign_key",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub fn byte_width(&self) -> usize {
        self.column_type.byte_width()
    }
}

#[derive(Clone, Debug)]
pub struct Schema {
    columns: Vec<Column>,
    positions: HashMap<String, usize>,
    payload_width: usize,
}

impl Schema {
    /// Builds a schema from user columns, prepending the `_id` identifier column.
    pub fn new(columns: Vec<Column>) -> Result<Self, Error> {
        let mut all = Vec::with_capacity(columns.len() + 1);
        all.push(Column::new(ID_COLUMN, ColumnType::Int64));
        let mut record_size = RECORD_HEADER_LEN + ColumnType::Int64.byte_width();
        for column in columns {
            if column.name.is_empty() {
                return Err(Error::new(ErrorKind::Usage).with_message("column name is empty"));
            }
            if column.name == ID_COLUMN {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("column name is reserved for the row identifier")
                    .with_column(column.name));
            }
            if column.byte_width() == 0 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("text column width must be at least 1")
                    .with_column(column.name));
            }
            record_size = match record_size.checked_add(column.byte_width()) {
                Some(size) if size <= u32::MAX as usize => size,
                _ => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!("record size exceeds {} bytes", u32::MAX))
                        .with_column(column.name));
                }
            };
            all.push(column);
        }
        Self::from_columns(all)
    }

    /// Builds a schema whose columns are taken as-is, without an implicit identifier.
    /// Used for derived result shapes such as joined rows.
    pub(crate) fn from_columns(columns: Vec<Column>) -> Result<Self, Error> {
        let mut positions = HashMap::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            if positions.insert(column.name.clone(), position).is_some() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("duplicate column name")
                    .with_column(column.name.clone()));
            }
        }
        let payload_width = columns.iter().map(Column::byte_width).sum();
        Ok(Self {
            columns,
            positions,
            payload_width,
        })
    }

    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Columns supplied by callers on insert (everything after `_id`).
    pub fn user_columns(&self) -> &[Column] {
        &self.columns[1..]
    }

    pub fn column(&self, position: usize) -> Option<&Column> {
        self.columns.get(position)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn payload_width(&self) -> usize {
        self.payload_width
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        let doc: SchemaDoc = serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid schema json")
                .with_source(err)
        })?;
        let columns = doc
            .columns
            .into_iter()
            .map(ColumnDoc::into_column)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(columns)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        let doc = SchemaDoc {
            columns: self.user_columns().iter().map(ColumnDoc::from_column).collect(),
        };
        serde_json::to_string_pretty(&doc).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode schema json")
                .with_source(err)
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SchemaDoc {
    columns: Vec<ColumnDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ColumnDoc {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<usize>,
}

impl ColumnDoc {
    fn from_column(column: &Column) -> Self {
        let width = match column.column_type {
            ColumnType::FixedText(width) => Some(width),
            _ => None,
        };
        Self {
            name: column.name.clone(),
            type_name: column.column_type.name().to_string(),
            width,
        }
    }

    fn into_column(self) -> Result<Column, Error> {
        let column_type = match (self.type_name.as_str(), self.width) {
            ("int32", None) => ColumnType::Int32,
            ("int64", None) => ColumnType::Int64,
            ("float32", None) => ColumnType::Float32,
            ("float64", None) => ColumnType::Float64,
            ("foreign_key", None) => ColumnType::ForeignKey,
            ("text", Some(width)) => ColumnType::FixedText(width),
            ("text", None) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("text column requires a width")
                    .with_column(self.name));
            }
            ("int32" | "int64" | "float32" | "float64" | "foreign_key", Some(_)) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("width is only valid for text columns")
                    .with_column(self.name));
            }
            (other, _) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown column type `{other}`"))
                    .with_column(self.name)
                    .with_hint("Use int32, int64, float32, float64, text, or foreign_key."));
            }
        };
        Ok(Column::new(self.name, column_type))
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, ColumnType, ID_COLUMN, Schema};
    use crate::core::error::ErrorKind;

    fn person() -> Schema {
        Schema::new(vec![
            Column::new("dre", ColumnType::Int32),
            Column::new("name", ColumnType::FixedText(16)),
        ])
        .expect("schema")
    }

    #[test]
    fn identifier_is_prepended() {
        let schema = person();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.columns()[0].name, ID_COLUMN);
        assert_eq!(schema.columns()[0].column_type, ColumnType::Int64);
        assert_eq!(schema.user_columns().len(), 2);
        assert_eq!(schema.resolve("_id"), Some(0));
        assert_eq!(schema.resolve("dre"), Some(1));
        assert_eq!(schema.resolve("name"), Some(2));
        assert_eq!(schema.resolve("missing"), None);
    }

    #[test]
    fn payload_width_sums_columns() {
        assert_eq!(person().payload_width(), 8 + 4 + 16);
    }

    #[test]
    fn invalid_columns_are_rejected() {
        let dup = Schema::new(vec![
            Column::new("a", ColumnType::Int32),
            Column::new("a", ColumnType::Int64),
        ])
        .expect_err("duplicate");
        assert_eq!(dup.kind(), ErrorKind::Usage);
        assert_eq!(dup.column(), Some("a"));

        let reserved = Schema::new(vec![Column::new("_id", ColumnType::Int64)]).expect_err("_id");
        assert_eq!(reserved.kind(), ErrorKind::Usage);

        let zero = Schema::new(vec![Column::new("t", ColumnType::FixedText(0))]).expect_err("zero");
        assert_eq!(zero.kind(), ErrorKind::Usage);
    }

    #[test]
    fn records_wider_than_the_size_field_are_rejected() {
        let huge = Schema::new(vec![Column::new("blob", ColumnType::FixedText(u32::MAX as usize))])
            .expect_err("too wide");
        assert_eq!(huge.kind(), ErrorKind::Usage);
        assert_eq!(huge.column(), Some("blob"));

        let overflow = Schema::new(vec![
            Column::new("a", ColumnType::FixedText(usize::MAX)),
            Column::new("b", ColumnType::FixedText(usize::MAX)),
        ])
        .expect_err("overflow");
        assert_eq!(overflow.column(), Some("a"));

        let fits = u32::MAX as usize - super::RECORD_HEADER_LEN - 8;
        Schema::new(vec![Column::new("blob", ColumnType::FixedText(fits))]).expect("largest");
    }

    #[test]
    fn json_document_round_trips() {
        let text = r#"{"columns":[
            {"name":"dre","type":"int32"},
            {"name":"name","type":"text","width":16},
            {"name":"boss","type":"foreign_key"}
        ]}"#;
        let schema = Schema::from_json(text).expect("parse");
        assert_eq!(schema.column(3).expect("boss").column_type, ColumnType::ForeignKey);

        let again = Schema::from_json(&schema.to_json().expect("encode")).expect("reparse");
        assert_eq!(again.columns(), schema.columns());
    }

    #[test]
    fn json_rejects_unknown_types_and_missing_width() {
        let err = Schema::from_json(r#"{"columns":[{"name":"x","type":"decimal"}]}"#)
            .expect_err("unknown");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.hint().is_some());

        let err = Schema::from_json(r#"{"columns":[{"name":"x","type":"text"}]}"#)
            .expect_err("width");
        assert_eq!(err.column(), Some("x"));

        let err = Schema::from_json("not json").expect_err("syntax");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
