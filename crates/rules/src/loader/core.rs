//! [`TableSet`]: filesystem-backed decision table loading.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::evaluator::validate;
use crate::schema::DecisionTable;

use super::error::{LoadResult, LoadStatus, Result, RuleError};

const TABLE_KIND: &str = "DecisionTable";

/// Parse and validate a single decision table document.
pub fn parse_table(yaml: &str) -> Result<DecisionTable> {
    let table: DecisionTable = serde_yaml::from_str(yaml)?;

    if table.kind != TABLE_KIND {
        return Err(RuleError::Validation(format!(
            "unsupported kind '{}', expected '{TABLE_KIND}'",
            table.kind
        )));
    }
    if table.metadata.id.trim().is_empty() {
        return Err(RuleError::Validation(
            "table metadata.id must not be empty".to_string(),
        ));
    }

    validate(&table)?;
    Ok(table)
}

/// Validated decision tables keyed by `metadata.id`.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: HashMap<String, Arc<DecisionTable>>,
}

impl TableSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a table, replacing any table with the same id.
    ///
    /// The table is validated before insertion.
    pub fn insert(&mut self, table: DecisionTable) -> Result<()> {
        validate(&table)?;
        if let Some(previous) = self.tables.insert(table.id().to_string(), Arc::new(table)) {
            info!(table_id = %previous.id(), "replaced decision table");
        }
        Ok(())
    }

    /// Parse a single YAML file and insert it.
    pub fn load_file(&mut self, path: &Path) -> Result<String> {
        let contents = fs::read_to_string(path)?;
        let table = parse_table(&contents)?;
        let id = table.id().to_string();
        self.insert(table)?;
        Ok(id)
    }

    /// Recursively scan `dir` and load every YAML table.
    ///
    /// Dotfiles and non-YAML files are skipped. Parse and validation errors
    /// are reported per file and do not abort the scan.
    pub fn load_dir(&mut self, dir: &Path) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        self.scan_dir_recursive(dir, &mut results)?;
        Ok(results)
    }

    fn scan_dir_recursive(&mut self, dir: &Path, results: &mut Vec<LoadResult>) -> Result<()> {
        let mut entries = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        // Directory order is platform dependent; later files override earlier ones.
        entries.sort();

        for path in entries {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, results)?;
                continue;
            }

            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yml" || e == "yaml")
                .unwrap_or(false);

            if !is_yaml {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            match self.load_file(&path) {
                Ok(table_id) => {
                    info!(table_id = %table_id, path = %path.display(), "loaded decision table");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded { table_id },
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load decision table");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    /// Look up a table by id.
    pub fn get(&self, id: &str) -> Option<Arc<DecisionTable>> {
        self.tables.get(id).cloned()
    }

    /// Look up a table by id, failing with a validation error when absent.
    pub fn require(&self, id: &str) -> Result<Arc<DecisionTable>> {
        self.get(id)
            .ok_or_else(|| RuleError::Validation(format!("decision table '{id}' is not loaded")))
    }

    /// Sorted ids of all loaded tables.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
