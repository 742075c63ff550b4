//! Purpose: Convert single field values between text and fixed-width binary.
//! Exports: `encode`, `encode_into`, `decode`, `decode_value`, `Value`.
//! Role: Leaf codec used by record writes, reads, and join comparisons.
//! Invariants: Encoded output is exactly `column.byte_width()` bytes; numbers use native byte order.
//! Invariants: Malformed numeric text is an `Encoding` error, never a silent zero.
use std::fmt;

use crate::core::error::{Error, ErrorKind};
use crate::core::schema::{Column, ColumnType};

/// Decoded field value with its type preserved, used where text equality is too strict.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    /// Float32 fields stay narrow so they render and compare at their own precision.
    Float32(f32),
    Text(String),
}

impl Value {
    /// Type-aware join equality: numbers compare numerically, text byte-exact,
    /// and text against a number compares the number's decoded text.
    ///
    /// Integers against floats are exact; a float must be integral to match.
    /// Float32 against Float64 compares at f32 precision.
    pub fn join_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a == b,
            (Value::Float32(a), Value::Float(b)) | (Value::Float(b), Value::Float32(a)) => {
                narrow_eq(*a, *b)
            }
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                int_eq_float(*a, *b)
            }
            (Value::Int(a), Value::Float32(b)) | (Value::Float32(b), Value::Int(a)) => {
                int_eq_float(*a, f64::from(*b))
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Text(text), number) | (number, Value::Text(text)) => {
                *text == number.to_string()
            }
        }
    }
}

fn int_eq_float(int: i64, float: f64) -> bool {
    // i128 holds every i64 and every integral f64 below 2^127; larger floats saturate.
    float.is_finite() && float.fract() == 0.0 && float as i128 == i128::from(int)
}

fn narrow_eq(narrow: f32, wide: f64) -> bool {
    let rounded = wide as f32;
    rounded == narrow && rounded.is_finite() == wide.is_finite()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Float32(value) => write!(f, "{value}"),
            Value::Text(value) => f.write_str(value),
        }
    }
}

pub fn encode(text: &str, column: &Column) -> Result<Vec<u8>, Error> {
    let mut out = vec![0u8; column.byte_width()];
    encode_into(text, column, &mut out)?;
    Ok(out)
}

/// Encodes `text` into `out`, which must be exactly the column's width.
pub fn encode_into(text: &str, column: &Column, out: &mut [u8]) -> Result<(), Error> {
    let width = column.byte_width();
    if out.len() != width {
        return Err(Error::new(ErrorKind::Internal)
            .with_message(format!("field buffer is {} bytes, expected {width}", out.len()))
            .with_column(column.name.clone()));
    }
    match column.column_type {
        ColumnType::Int32 => {
            let value: i32 = parse_number(text, column, "int32")?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        ColumnType::Int64 | ColumnType::ForeignKey => {
            let value: i64 = parse_number(text, column, "int64")?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        ColumnType::Float32 => {
            let value: f32 = parse_number(text, column, "float32")?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        ColumnType::Float64 => {
            let value: f64 = parse_number(text, column, "float64")?;
            out.copy_from_slice(&value.to_ne_bytes());
        }
        ColumnType::FixedText(_) => {
            if text.contains('\0') {
                return Err(Error::new(ErrorKind::Encoding)
                    .with_message("text value contains a NUL byte")
                    .with_column(column.name.clone()));
            }
            let stored = truncate_to_boundary(text, width);
            out.fill(0);
            out[..stored.len()].copy_from_slice(stored.as_bytes());
        }
    }
    Ok(())
}

pub fn decode(bytes: &[u8], column: &Column) -> Result<String, Error> {
    decode_value(bytes, column).map(|value| match value {
        Value::Text(text) => text,
        other => other.to_string(),
    })
}

pub fn decode_value(bytes: &[u8], column: &Column) -> Result<Value, Error> {
    let width = column.byte_width();
    if bytes.len() != width {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!("field is {} bytes, expected {width}", bytes.len()))
            .with_column(column.name.clone()));
    }
    let value = match column.column_type {
        ColumnType::Int32 => Value::Int(i32::from_ne_bytes(fixed(bytes)) as i64),
        ColumnType::Int64 | ColumnType::ForeignKey => Value::Int(i64::from_ne_bytes(fixed(bytes))),
        ColumnType::Float32 => Value::Float32(f32::from_ne_bytes(fixed(bytes))),
        ColumnType::Float64 => Value::Float(f64::from_ne_bytes(fixed(bytes))),
        ColumnType::FixedText(_) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            let text = std::str::from_utf8(&bytes[..end]).map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("text field is not valid utf-8")
                    .with_column(column.name.clone())
                    .with_source(err)
            })?;
            Value::Text(text.to_string())
        }
    };
    Ok(value)
}

fn parse_number<T>(text: &str, column: &Column, type_name: &str) -> Result<T, Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse::<T>().map_err(|err| {
        Error::new(ErrorKind::Encoding)
            .with_message(format!("`{text}` is not a valid {type_name}"))
            .with_column(column.name.clone())
            .with_source(err)
    })
}

fn truncate_to_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
