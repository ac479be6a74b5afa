//! Tests for the table loader module.

use std::fs;

use tempfile::TempDir;

use super::*;

const VALID_TABLE_YAML: &str = r#"
apiVersion: v1
kind: DecisionTable
metadata:
  id: test-table
  name: Test Table
hitPolicy: FIRST
inputs:
  count: integer
rules:
  - when:
      count: 0
    then:
      result: NONE
  - then:
      result: SOME
"#;

const MISPLACED_CATCH_ALL_YAML: &str = r#"
apiVersion: v1
kind: DecisionTable
metadata:
  id: broken
  name: Broken
rules:
  - then:
      result: SOME
  - when:
      count: 0
    then:
      result: NONE
"#;

#[test]
fn parse_valid_table() {
    let table = parse_table(VALID_TABLE_YAML).unwrap();
    assert_eq!(table.id(), "test-table");
    assert_eq!(table.metadata.name, "Test Table");
    assert_eq!(table.rules.len(), 2);
}

#[test]
fn parse_rejects_other_kinds() {
    let yaml = VALID_TABLE_YAML.replace("kind: DecisionTable", "kind: AnomalyRule");
    assert!(matches!(parse_table(&yaml), Err(RuleError::Validation(_))));
}

#[test]
fn parse_rejects_empty_id() {
    let yaml = VALID_TABLE_YAML.replace("id: test-table", "id: \"\"");
    assert!(matches!(parse_table(&yaml), Err(RuleError::Validation(_))));
}

#[test]
fn parse_rejects_unknown_hit_policy() {
    let yaml = VALID_TABLE_YAML.replace("hitPolicy: FIRST", "hitPolicy: COLLECT");
    assert!(matches!(parse_table(&yaml), Err(RuleError::Parse(_))));
}

#[test]
fn parse_rejects_malformed_layout() {
    assert!(matches!(
        parse_table(MISPLACED_CATCH_ALL_YAML),
        Err(RuleError::MalformedTable { .. })
    ));
}

#[test]
fn load_dir_skips_dotfiles_and_non_yaml() {
    let dir = TempDir::new().expect("create tempdir");
    fs::write(dir.path().join("table.yml"), VALID_TABLE_YAML).unwrap();
    fs::write(dir.path().join(".hidden.yml"), VALID_TABLE_YAML).unwrap();
    fs::write(dir.path().join("readme.txt"), "not a table").unwrap();

    let mut set = TableSet::new();
    let results = set.load_dir(dir.path()).unwrap();

    let loaded = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Loaded { .. }))
        .count();
    let skipped = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
        .count();
    assert_eq!(loaded, 1);
    assert_eq!(skipped, 2);
    assert_eq!(set.ids(), vec!["test-table"]);
}

#[test]
fn load_dir_reports_failures_without_aborting() {
    let dir = TempDir::new().expect("create tempdir");
    fs::write(dir.path().join("a-broken.yml"), MISPLACED_CATCH_ALL_YAML).unwrap();
    fs::write(dir.path().join("b-garbage.yaml"), "rules: [unterminated").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested/table.yaml"), VALID_TABLE_YAML).unwrap();

    let mut set = TableSet::new();
    let results = set.load_dir(dir.path()).unwrap();

    let failed = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Failed { .. }))
        .count();
    assert_eq!(failed, 2);
    assert!(set.get("test-table").is_some());
    assert!(set.get("broken").is_none());
}

#[test]
fn load_dir_missing_directory_is_io_error() {
    let dir = TempDir::new().expect("create tempdir");
    let mut set = TableSet::new();
    let result = set.load_dir(&dir.path().join("does-not-exist"));
    assert!(matches!(result, Err(RuleError::Io(_))));
}

#[test]
fn insert_replaces_same_id() {
    let mut set = TableSet::new();
    set.insert(parse_table(VALID_TABLE_YAML).unwrap()).unwrap();

    let renamed = VALID_TABLE_YAML.replace("name: Test Table", "name: Replacement");
    set.insert(parse_table(&renamed).unwrap()).unwrap();

    assert_eq!(set.len(), 1);
    assert_eq!(set.require("test-table").unwrap().metadata.name, "Replacement");
    assert!(matches!(set.require("nope"), Err(RuleError::Validation(_))));
}
