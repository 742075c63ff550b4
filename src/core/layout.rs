// Record header layout and per-schema record sizing.
use std::ops::Range;

use crate::core::error::{Error, ErrorKind};
use crate::core::schema::Schema;

pub const TABLE_NAME_LEN: usize = 255;
pub const RECORD_SIZE_LEN: usize = 4;
pub const TIMESTAMP_LEN: usize = 8;
pub const RECORD_HEADER_LEN: usize = TABLE_NAME_LEN + RECORD_SIZE_LEN + TIMESTAMP_LEN;

const RECORD_SIZE_AT: usize = TABLE_NAME_LEN;
const TIMESTAMP_AT: usize = TABLE_NAME_LEN + RECORD_SIZE_LEN;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordHeader {
    pub table_name: String,
    pub record_size: u32,
    pub timestamp: i64,
}

impl RecordHeader {
    pub fn new(table_name: &str, payload_width: usize, timestamp: i64) -> Result<Self, Error> {
        let record_size = u32::try_from(RECORD_HEADER_LEN + payload_width).map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("record size exceeds u32 range")
        })?;
        Ok(Self {
            table_name: truncate_name(table_name).to_string(),
            record_size,
            timestamp,
        })
    }

    pub fn encode(&self) -> [u8; RECORD_HEADER_LEN] {
        let mut buf = [0u8; RECORD_HEADER_LEN];
        let name = truncate_name(&self.table_name).as_bytes();
        buf[..name.len()].copy_from_slice(name);
        buf[RECORD_SIZE_AT..TIMESTAMP_AT].copy_from_slice(&self.record_size.to_ne_bytes());
        buf[TIMESTAMP_AT..].copy_from_slice(&self.timestamp.to_ne_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < RECORD_HEADER_LEN {
            return Err(Error::new(ErrorKind::Corrupt).with_message("record header too small"));
        }
        let name_bytes = &buf[..TABLE_NAME_LEN];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(TABLE_NAME_LEN);
        let table_name = std::str::from_utf8(&name_bytes[..end])
            .map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("record header name is not valid utf-8")
                    .with_source(err)
            })?
            .to_string();

        let mut size = [0u8; RECORD_SIZE_LEN];
        size.copy_from_slice(&buf[RECORD_SIZE_AT..TIMESTAMP_AT]);
        let mut timestamp = [0u8; TIMESTAMP_LEN];
        timestamp.copy_from_slice(&buf[TIMESTAMP_AT..RECORD_HEADER_LEN]);

        Ok(Self {
            table_name,
            record_size: u32::from_ne_bytes(size),
            timestamp: i64::from_ne_bytes(timestamp),
        })
    }

    pub fn validate(&self, expected_size: usize) -> Result<(), Error> {
        if self.record_size as usize != expected_size {
            return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
                "record size {} does not match expected {expected_size}",
                self.record_size
            )));
        }
        Ok(())
    }
}

/// Byte geometry of one record for a given schema.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordLayout {
    field_starts: Vec<usize>,
    payload_width: usize,
}

impl RecordLayout {
    pub fn new(schema: &Schema) -> Self {
        let mut field_starts = Vec::with_capacity(schema.len());
        let mut at = 0;
        for column in schema.columns() {
            field_starts.push(at);
            at += column.byte_width();
        }
        Self {
            field_starts,
            payload_width: at,
        }
    }

    pub fn payload_width(&self) -> usize {
        self.payload_width
    }

    pub fn record_size(&self) -> usize {
        RECORD_HEADER_LEN + self.payload_width
    }

    /// Range of the column at `position` within the payload (after the header).
    pub fn column_range(&self, position: usize) -> Option<Range<usize>> {
        let start = *self.field_starts.get(position)?;
        let end = self
            .field_starts
            .get(position + 1)
            .copied()
            .unwrap_or(self.payload_width);
        Some(start..end)
    }
}

fn truncate_name(name: &str) -> &str {
    if name.len() <= TABLE_NAME_LEN {
        return name;
    }
    let mut end = TABLE_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
