//! Typed fact records fed into decision tables.
//!
//! A [`Facts`] record is assembled once per evaluation through a
//! [`FactsBuilder`] and is read-only afterwards.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Values ──────────────────────────────────────────────────────────

/// A single typed value, used both for facts and for predicate literals.
///
/// Deserialization is untagged: YAML booleans and integers map to their
/// variants, RFC 3339 strings become timestamps, and any other string is
/// kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Bool(bool),
    Int(i64),
    Timestamp(DateTime<Utc>),
    Str(String),
}

impl FactValue {
    /// The declared type this value belongs to.
    pub fn fact_type(&self) -> FactType {
        match self {
            FactValue::Bool(_) => FactType::Boolean,
            FactValue::Int(_) => FactType::Integer,
            FactValue::Timestamp(_) => FactType::Timestamp,
            FactValue::Str(_) => FactType::String,
        }
    }

    /// Borrow the inner string, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FactValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value supports `greater_than` / `less_than`.
    pub fn is_ordered(&self) -> bool {
        matches!(self, FactValue::Int(_) | FactValue::Timestamp(_))
    }

    /// Order two values of the same ordered type.
    ///
    /// Returns `None` for mismatched types and for unordered types
    /// (booleans, strings).
    pub fn compare(&self, other: &FactValue) -> Option<Ordering> {
        match (self, other) {
            (FactValue::Int(a), FactValue::Int(b)) => Some(a.cmp(b)),
            (FactValue::Timestamp(a), FactValue::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Bool(b) => write!(f, "{b}"),
            FactValue::Int(n) => write!(f, "{n}"),
            FactValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            FactValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FactValue {
    fn from(v: bool) -> Self {
        FactValue::Bool(v)
    }
}

impl From<i64> for FactValue {
    fn from(v: i64) -> Self {
        FactValue::Int(v)
    }
}

impl From<i32> for FactValue {
    fn from(v: i32) -> Self {
        FactValue::Int(i64::from(v))
    }
}

impl From<DateTime<Utc>> for FactValue {
    fn from(v: DateTime<Utc>) -> Self {
        FactValue::Timestamp(v)
    }
}

impl From<&str> for FactValue {
    fn from(v: &str) -> Self {
        FactValue::Str(v.to_string())
    }
}

impl From<String> for FactValue {
    fn from(v: String) -> Self {
        FactValue::Str(v)
    }
}

/// Declared type of a table input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactType {
    String,
    Boolean,
    Integer,
    Timestamp,
}

impl fmt::Display for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FactType::String => "string",
            FactType::Boolean => "boolean",
            FactType::Integer => "integer",
            FactType::Timestamp => "timestamp",
        };
        f.write_str(s)
    }
}

// ── Fact record ─────────────────────────────────────────────────────

/// Immutable mapping from field name to typed value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facts {
    values: HashMap<String, FactValue>,
}

impl Facts {
    /// Start building a new fact record.
    pub fn builder() -> FactsBuilder {
        FactsBuilder::default()
    }

    /// Look up a fact by field name.
    pub fn get(&self, field: &str) -> Option<&FactValue> {
        self.values.get(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builder for [`Facts`]. Later writes to the same field replace earlier ones.
#[derive(Debug, Default)]
pub struct FactsBuilder {
    values: HashMap<String, FactValue>,
}

impl FactsBuilder {
    /// Set a field.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FactValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Freeze the record.
    pub fn build(self) -> Facts {
        Facts {
            values: self.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn untagged_literals_pick_the_narrowest_type() {
        let values: Vec<FactValue> =
            serde_yaml::from_str("[true, 3, \"2025-03-03T09:00:00Z\", MULTI_APPLICATION]").unwrap();
        assert_eq!(values[0], FactValue::Bool(true));
        assert_eq!(values[1], FactValue::Int(3));
        assert_eq!(
            values[2],
            FactValue::Timestamp(Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap())
        );
        assert_eq!(values[3], FactValue::Str("MULTI_APPLICATION".to_string()));
    }

    #[test]
    fn compare_only_orders_matching_ordered_types() {
        assert_eq!(FactValue::Int(1).compare(&FactValue::Int(2)), Some(Ordering::Less));
        assert_eq!(FactValue::Int(1).compare(&FactValue::Str("1".into())), None);
        assert_eq!(FactValue::Bool(true).compare(&FactValue::Bool(false)), None);
    }

    #[test]
    fn builder_overwrites_repeated_fields() {
        let facts = Facts::builder()
            .with("stage", "INITIAL")
            .with("stage", "FOLLOW_UP_1")
            .with("count", 2)
            .build();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts.get("stage").and_then(FactValue::as_str), Some("FOLLOW_UP_1"));
        assert_eq!(facts.get("missing"), None);
    }
}
