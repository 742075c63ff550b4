//! Purpose: Equi-joins between two record stores, reported as pairs of byte offsets.
//! Exports: `JoinPair`, `full_join`, `seeded_join`, `materialize`.
//! Role: Nested-loop join engine; the receiving store is the inner relation.
//! Invariants: Output order is inner index order, then outer index order.
//! Invariants: Equality is type-aware (`Value::join_eq`), not raw text comparison.
use crate::core::codec::Value;
use crate::core::cursor::Cursor;
use crate::core::error::{Error, ErrorKind};
use crate::core::schema::{Column, Schema};
use crate::core::store::Store;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct JoinPair {
    pub inner_offset: i64,
    pub outer_offset: i64,
}

/// Joins every inner row against every outer row.
pub fn full_join(
    inner: &Store,
    outer: &Store,
    outer_column: &str,
    inner_column: &str,
) -> Result<Vec<JoinPair>, Error> {
    let (inner_position, outer_position) = resolve_columns(inner, outer, inner_column, outer_column)?;
    if inner.row_count() == 0 || outer.row_count() == 0 {
        return Ok(Vec::new());
    }
    let outer_keys = outer_values(outer, outer_position)?;

    let mut reader = inner.reader()?;
    let mut pairs = Vec::new();
    for entry in inner.entries() {
        let key = reader.read_value(entry.offset, inner_position)?;
        collect_matches(entry.offset, &key, &outer_keys, &mut pairs);
    }
    Ok(pairs)
}

/// Joins the single inner row at `inner_position` (index position, not row id)
/// against every outer row.
pub fn seeded_join(
    inner: &Store,
    outer: &Store,
    outer_column: &str,
    inner_column: &str,
    inner_position: usize,
) -> Result<Vec<JoinPair>, Error> {
    let (inner_column_position, outer_position) =
        resolve_columns(inner, outer, inner_column, outer_column)?;
    let entry = inner.entry_at(inner_position).ok_or_else(|| {
        Error::new(ErrorKind::Usage).with_message(format!(
            "inner position {inner_position} is outside table {} ({} rows)",
            inner.name(),
            inner.row_count()
        ))
    })?;
    if outer.row_count() == 0 {
        return Ok(Vec::new());
    }

    let key = inner.reader()?.read_value(entry.offset, inner_column_position)?;
    let outer_keys = outer_values(outer, outer_position)?;
    let mut pairs = Vec::new();
    collect_matches(entry.offset, &key, &outer_keys, &mut pairs);
    Ok(pairs)
}

/// Reads both sides of every pair into rows of `<table>.<column>` fields,
/// inner columns first.
pub fn materialize(inner: &Store, outer: &Store, pairs: &[JoinPair]) -> Result<Cursor, Error> {
    inner.ensure_open()?;
    outer.ensure_open()?;
    let columns = qualified_columns(inner)
        .chain(qualified_columns(outer))
        .collect::<Vec<_>>();
    let schema = Schema::from_columns(columns)?;
    if pairs.is_empty() {
        return Ok(Cursor::new(schema, Vec::new()));
    }

    let mut inner_reader = inner.reader()?;
    let mut outer_reader = outer.reader()?;
    let mut rows = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let mut row = inner_reader.read_row(pair.inner_offset)?;
        row.extend(outer_reader.read_row(pair.outer_offset)?);
        rows.push(row);
    }
    Ok(Cursor::new(schema, rows))
}

impl Store {
    pub fn full_join(
        &self,
        outer: &Store,
        outer_column: &str,
        inner_column: &str,
    ) -> Result<Vec<JoinPair>, Error> {
        full_join(self, outer, outer_column, inner_column)
    }

    pub fn seeded_join(
        &self,
        outer: &Store,
        outer_column: &str,
        inner_column: &str,
        inner_position: usize,
    ) -> Result<Vec<JoinPair>, Error> {
        seeded_join(self, outer, outer_column, inner_column, inner_position)
    }
}

fn resolve_columns(
    inner: &Store,
    outer: &Store,
    inner_column: &str,
    outer_column: &str,
) -> Result<(usize, usize), Error> {
    inner.ensure_open()?;
    outer.ensure_open()?;
    Ok((resolve(inner, inner_column)?, resolve(outer, outer_column)?))
}

fn resolve(store: &Store, column: &str) -> Result<usize, Error> {
    store.schema().resolve(column).ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("table {} has no such column", store.name()))
            .with_column(column)
    })
}

fn outer_values(outer: &Store, position: usize) -> Result<Vec<(i64, Value)>, Error> {
    let mut reader = outer.reader()?;
    outer
        .entries()
        .iter()
        .map(|entry| -> Result<(i64, Value), Error> {
            Ok((entry.offset, reader.read_value(entry.offset, position)?))
        })
        .collect()
}

fn collect_matches(
    inner_offset: i64,
    key: &Value,
    outer_keys: &[(i64, Value)],
    pairs: &mut Vec<JoinPair>,
) {
    pairs.extend(
        outer_keys
            .iter()
            .filter(|(_, value)| key.join_eq(value))
            .map(|(outer_offset, _)| JoinPair {
                inner_offset,
                outer_offset: *outer_offset,
            }),
    );
}

fn qualified_columns(store: &Store) -> impl Iterator<Item = Column> + '_ {
    store.schema().columns().iter().map(move |column| {
        Column::new(format!("{}.{}", store.name(), column.name), column.column_type)
    })
}
