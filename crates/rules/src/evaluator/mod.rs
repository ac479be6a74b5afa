//! FIRST-hit decision table evaluator.
//!
//! Rules are tried strictly in declared order and the first match wins.
//! Declared order is part of a table's contract, so the evaluator never
//! reorders or indexes rules.

use tracing::{trace, warn};

use crate::facts::Facts;
use crate::loader::{Result, RuleError};
use crate::schema::{DecisionTable, OutputRecord, Predicate};


// ── Outcome ─────────────────────────────────────────────────────────

/// Result of evaluating a table against a fact record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<'t> {
    /// A regular rule matched.
    Matched {
        /// Zero-based position of the rule in the table.
        index: usize,
        output: &'t OutputRecord,
    },
    /// Nothing matched before the trailing catch-all.
    CatchAll { output: &'t OutputRecord },
    /// No rule matched and the table has no catch-all.
    NoMatch,
}

impl<'t> Outcome<'t> {
    /// The output record, unless nothing matched.
    pub fn output(&self) -> Option<&'t OutputRecord> {
        match self {
            Outcome::Matched { output, .. } | Outcome::CatchAll { output } => Some(output),
            Outcome::NoMatch => None,
        }
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self, Outcome::NoMatch)
    }
}

// ── Evaluation ──────────────────────────────────────────────────────

/// Evaluate `table` against `facts`.
///
/// The table is checked first; a malformed table fails the call with
/// [`RuleError::MalformedTable`] instead of producing a result. Unreachable
/// duplicates are only reported by [`validate`], which loading runs once.
pub fn evaluate<'t>(table: &'t DecisionTable, facts: &Facts) -> Result<Outcome<'t>> {
    check(table, false)?;

    for (index, rule) in table.rules.iter().enumerate() {
        if !rule.matches(facts) {
            continue;
        }
        trace!(table_id = %table.id(), rule = index, "rule matched");
        return Ok(if rule.is_catch_all() {
            Outcome::CatchAll {
                output: &rule.then,
            }
        } else {
            Outcome::Matched {
                index,
                output: &rule.then,
            }
        });
    }

    trace!(table_id = %table.id(), "no rule matched");
    Ok(Outcome::NoMatch)
}

/// Check that a table can be evaluated deterministically.
///
/// Rejects:
/// - tables without rules
/// - a catch-all rule anywhere but last
/// - structurally identical rules with different outputs
/// - empty `not_equals` sets and ordering predicates on unordered literals
/// - predicates over undeclared inputs or with literals of the wrong type,
///   when the table declares `inputs`
///
/// Identical rules with identical outputs are accepted; the later copy is
/// unreachable and only logged.
pub fn validate(table: &DecisionTable) -> Result<()> {
    check(table, true)
}

fn check(table: &DecisionTable, report_duplicates: bool) -> Result<()> {
    let id = table.id();

    if table.rules.is_empty() {
        return Err(RuleError::malformed(id, "table has no rules"));
    }

    let last = table.rules.len() - 1;
    if let Some(pos) = table.catch_all_index() {
        if pos != last {
            return Err(RuleError::malformed(
                id,
                format!("catch-all rule at position {pos} must be the last rule"),
            ));
        }
    }

    for (index, rule) in table.rules.iter().enumerate() {
        for (field, predicate) in &rule.when {
            check_predicate(table, index, field, predicate)?;
        }

        for (earlier_index, earlier) in table.rules[..index].iter().enumerate() {
            if earlier.when != rule.when {
                continue;
            }
            if earlier.then != rule.then {
                return Err(RuleError::malformed(
                    id,
                    format!("rules {earlier_index} and {index} have identical conditions but different outputs"),
                ));
            }
            if report_duplicates {
                warn!(table_id = %id, rule = index, duplicate_of = earlier_index, "unreachable duplicate rule");
            }
        }
    }

    Ok(())
}

fn check_predicate(table: &DecisionTable, index: usize, field: &str, predicate: &Predicate) -> Result<()> {
    let id = table.id();

    match predicate {
        Predicate::NotIn(set) if set.is_empty() => {
            return Err(RuleError::malformed(
                id,
                format!("rule {index}: `not_equals` on '{field}' has an empty set"),
            ));
        }
        Predicate::GreaterThan(v) | Predicate::LessThan(v) if !v.is_ordered() => {
            return Err(RuleError::malformed(
                id,
                format!("rule {index}: ordering comparison on '{field}' needs an integer or timestamp, got {}", v.fact_type()),
            ));
        }
        _ => {}
    }

    if table.inputs.is_empty() {
        return Ok(());
    }

    let declared = table.inputs.get(field).ok_or_else(|| {
        RuleError::malformed(id, format!("rule {index}: '{field}' is not a declared input"))
    })?;

    for literal in predicate.literals() {
        if literal.fact_type() != *declared {
            return Err(RuleError::malformed(
                id,
                format!(
                    "rule {index}: '{field}' is declared {declared} but compared with {} literal '{literal}'",
                    literal.fact_type()
                ),
            ));
        }
    }

    Ok(())
}
