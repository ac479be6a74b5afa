//! Filesystem table loader.
//!
//! Scans a directory for YAML decision tables, validates each one, and keeps
//! them in an immutable [`TableSet`] keyed by table id. Tables are read-only
//! once loaded and can be shared across threads behind an `Arc`.

mod core;
mod error;

#[cfg(test)]
mod tests;

pub use self::core::{parse_table, TableSet};
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
