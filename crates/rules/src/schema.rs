//! YAML decision table schema.
//!
//! A table document looks like:
//!
//! ```yaml
//! apiVersion: v1
//! kind: DecisionTable
//! metadata:
//!   id: application-validation
//!   name: Application validation
//! hitPolicy: FIRST
//! inputs:
//!   loanApplicationCount: integer
//! rules:
//!   - when:
//!       loanApplicationCount: { greater_than: 1 }
//!     then:
//!       classification: MULTI_APPLICATION
//!   - then:
//!       classification: INVALID_BAD_DATA
//! ```
//!
//! Predicates accept a bare value (equality), `any` / `-` (wildcard), or a
//! single-key condition map: `equals`, `not_equals` (value or list),
//! `greater_than`, `less_than`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::facts::{FactType, FactValue, Facts};

/// Output columns of a matched rule, in declared order.
pub type OutputRecord = IndexMap<String, FactValue>;

// ── Table ───────────────────────────────────────────────────────────

/// An ordered decision table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTable {
    pub api_version: String,
    pub kind: String,
    pub metadata: TableMetadata,
    #[serde(default)]
    pub hit_policy: HitPolicy,
    /// Declared input columns. When non-empty, every predicate must
    /// reference a declared column with a literal of the declared type.
    #[serde(default)]
    pub inputs: IndexMap<String, FactType>,
    pub rules: Vec<Rule>,
}

impl DecisionTable {
    /// Table identifier (`metadata.id`).
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Index of the catch-all rule, if the table declares one.
    pub fn catch_all_index(&self) -> Option<usize> {
        self.rules.iter().position(Rule::is_catch_all)
    }
}

/// Identifying metadata for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// How matching rules are combined. Only FIRST is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitPolicy {
    #[default]
    First,
}

// ── Rules ───────────────────────────────────────────────────────────

/// One row of a decision table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    #[serde(default)]
    pub description: Option<String>,
    /// Per-field predicates. Fields not listed are "don't care".
    #[serde(default)]
    pub when: IndexMap<String, Predicate>,
    pub then: OutputRecord,
}

impl Rule {
    /// A rule that matches every fact record.
    pub fn is_catch_all(&self) -> bool {
        self.when.values().all(Predicate::is_any)
    }

    /// Whether every predicate holds for `facts`.
    pub fn matches(&self, facts: &Facts) -> bool {
        self.when
            .iter()
            .all(|(field, predicate)| predicate.test(facts.get(field)))
    }
}

// ── Predicates ──────────────────────────────────────────────────────

/// A condition over a single fact field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawPredicate")]
pub enum Predicate {
    /// Always true, even when the fact is missing.
    Any,
    Equals(FactValue),
    /// Negated set membership; `not_equals: x` is the one-element form.
    NotIn(Vec<FactValue>),
    GreaterThan(FactValue),
    LessThan(FactValue),
}

impl Predicate {
    pub fn is_any(&self) -> bool {
        matches!(self, Predicate::Any)
    }

    /// Evaluate against a fact value. Missing facts fail every
    /// non-wildcard predicate.
    pub fn test(&self, fact: Option<&FactValue>) -> bool {
        let fact = match (self, fact) {
            (Predicate::Any, _) => return true,
            (_, None) => return false,
            (_, Some(v)) => v,
        };

        match self {
            Predicate::Any => true,
            Predicate::Equals(v) => fact == v,
            Predicate::NotIn(set) => !set.contains(fact),
            Predicate::GreaterThan(v) => fact.compare(v).is_some_and(|o| o.is_gt()),
            Predicate::LessThan(v) => fact.compare(v).is_some_and(|o| o.is_lt()),
        }
    }

    /// Literal values referenced by this predicate.
    pub fn literals(&self) -> Vec<&FactValue> {
        match self {
            Predicate::Any => Vec::new(),
            Predicate::Equals(v) | Predicate::GreaterThan(v) | Predicate::LessThan(v) => vec![v],
            Predicate::NotIn(set) => set.iter().collect(),
        }
    }
}

/// Serialized shape of a predicate before normalization.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPredicate {
    Condition(ConditionSpec),
    Value(FactValue),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionSpec {
    #[serde(default)]
    equals: Option<FactValue>,
    #[serde(default)]
    not_equals: Option<OneOrMany>,
    #[serde(default)]
    greater_than: Option<FactValue>,
    #[serde(default)]
    less_than: Option<FactValue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<FactValue>),
    One(FactValue),
}

impl TryFrom<RawPredicate> for Predicate {
    type Error = String;

    fn try_from(raw: RawPredicate) -> Result<Self, Self::Error> {
        let spec = match raw {
            RawPredicate::Value(FactValue::Str(s)) if s == "any" || s == "-" => {
                return Ok(Predicate::Any)
            }
            RawPredicate::Value(v) => return Ok(Predicate::Equals(v)),
            RawPredicate::Condition(spec) => spec,
        };

        let mut found = Vec::with_capacity(1);
        if let Some(v) = spec.equals {
            found.push(Predicate::Equals(v));
        }
        if let Some(v) = spec.not_equals {
            found.push(match v {
                OneOrMany::Many(set) => Predicate::NotIn(set),
                OneOrMany::One(v) => Predicate::NotIn(vec![v]),
            });
        }
        if let Some(v) = spec.greater_than {
            found.push(Predicate::GreaterThan(v));
        }
        if let Some(v) = spec.less_than {
            found.push(Predicate::LessThan(v));
        }

        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err("predicate condition must set one of equals, not_equals, greater_than, less_than".to_string()),
            n => Err(format!("predicate condition sets {n} operators; use exactly one")),
        }
    }
}
