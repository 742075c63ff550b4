//! Purpose: Define the stable public Rust API boundary for rowstore.
//! Exports: Core types and operations needed by the CLI and embedders.
//! Role: Public, additive-only surface over the storage core.
//! Invariants: Re-exports only; no behavior lives here.

pub use crate::core::codec::Value;
pub use crate::core::cursor::{Cursor, Row};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::index::IndexEntry;
pub use crate::core::join::{JoinPair, full_join, materialize, seeded_join};
pub use crate::core::schema::{Column, ColumnType, ID_COLUMN, Schema};
pub use crate::core::store::{
    Durability, Store, StoreInfo, StoreOptions, StorePaths, StoreState,
};
