//! Decision tables shipped with the crate.
//!
//! - `notification-action`: stage and business-hours state to the action the
//!   escalation scheduler takes (send now, defer, or close).
//! - `application-validation`: classifies an intake by application count and
//!   document completeness; non-`SUCCESS` classes are escalation triggers.

use crate::loader::{parse_table, Result, TableSet};
use crate::schema::DecisionTable;

pub const NOTIFICATION_ACTION_ID: &str = "notification-action";
pub const APPLICATION_VALIDATION_ID: &str = "application-validation";

/// Input and output column names used by the built-in tables.
pub mod fields {
    pub const TRIGGER_REASON: &str = "triggerReason";
    pub const STAGE: &str = "stage";
    pub const IS_BUSINESS_HOURS: &str = "isBusinessHours";
    pub const RESPONSE_RECEIVED: &str = "responseReceived";
    pub const ACTION: &str = "action";
    pub const NOTIFICATION_KIND: &str = "notificationKind";

    pub const LOAN_APPLICATION_COUNT: &str = "loanApplicationCount";
    pub const REQUIREMENTS_PRESENT: &str = "requirementsPresent";
    pub const CLASSIFICATION: &str = "classification";
}

const NOTIFICATION_ACTION_YAML: &str = include_str!("../tables/notification-action.yml");
const APPLICATION_VALIDATION_YAML: &str = include_str!("../tables/application-validation.yml");

pub fn notification_action() -> Result<DecisionTable> {
    parse_table(NOTIFICATION_ACTION_YAML)
}

pub fn application_validation() -> Result<DecisionTable> {
    parse_table(APPLICATION_VALIDATION_YAML)
}

/// A [`TableSet`] pre-populated with every built-in table.
pub fn table_set() -> Result<TableSet> {
    let mut set = TableSet::new();
    set.insert(notification_action()?)?;
    set.insert(application_validation()?)?;
    Ok(set)
}
