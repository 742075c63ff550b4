//! Purpose: Shared library crate used by the `rowstore` CLI and tests.
//! Exports: `core` (codec, layout, index file, store, joins, errors) and `api`.
//! Role: Single-file relational storage engine with offset and id lookups.
//! Invariants: Stores are single-writer; callers serialize concurrent mutation.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod notice;
