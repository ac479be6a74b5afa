//! Decision-table rule engine.
//!
//! This crate provides:
//! - Typed fact records built per evaluation
//! - YAML decision tables with per-field predicates and FIRST hit policy
//! - A pure evaluator with catch-all semantics and table shape validation
//! - A filesystem loader plus the built-in escalation tables

pub mod builtin;
pub mod evaluator;
pub mod facts;
pub mod loader;
pub mod schema;

pub use evaluator::{evaluate, validate, Outcome};
pub use facts::{FactType, FactValue, Facts, FactsBuilder};
pub use loader::{LoadResult, LoadStatus, Result, RuleError, TableSet};
pub use schema::{DecisionTable, HitPolicy, OutputRecord, Predicate, Rule, TableMetadata};
