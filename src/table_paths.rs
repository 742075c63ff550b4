//! Purpose: Shared table-directory and table-name path resolution helpers.
//! Exports: `default_table_dir`, `resolve_table_name`, `schema_path`.
//! Role: Keep CLI path semantics for data, index, and schema files in one place.
//! Invariants: Default table directory remains `~/.rowstore/tables`.
//! Invariants: Table names must not contain path separators.

use std::path::{Path, PathBuf};

pub(crate) const SCHEMA_SUFFIX: &str = ".schema.json";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum TableNameResolveError {
    Empty,
    ContainsPathSeparator,
}

pub(crate) fn default_table_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".rowstore").join("tables")
}

pub(crate) fn resolve_table_name(name: &str) -> Result<&str, TableNameResolveError> {
    if name.is_empty() {
        return Err(TableNameResolveError::Empty);
    }
    if name.contains(['/', '\\']) {
        return Err(TableNameResolveError::ContainsPathSeparator);
    }
    Ok(name)
}

pub(crate) fn schema_path(table_dir: &Path, name: &str) -> PathBuf {
    table_dir.join(format!("{name}{SCHEMA_SUFFIX}"))
}

/// Table name for a schema sidecar file name, if it is one.
pub(crate) fn table_name_from_schema_file(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(SCHEMA_SUFFIX)
        .filter(|name| !name.is_empty())
}
