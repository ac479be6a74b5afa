//! Stage evaluation against the `notification-action` table.

use escalator_rules::builtin::fields;
use escalator_rules::{evaluate, DecisionTable, Facts, OutputRecord, Outcome, RuleError};

use crate::stage::{Action, NotificationKind, Stage};

/// What the table decided for one stage evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDecision {
    pub action: Action,
    pub notification_kind: Option<NotificationKind>,
    /// Index of the matched rule; `None` when the catch-all answered.
    pub rule: Option<usize>,
}

/// The fact record a stage is evaluated with. A response always ends the
/// escalation before evaluation, so `responseReceived` is false here.
pub fn stage_facts(trigger_reason: &str, stage: Stage, is_business_hours: bool) -> Facts {
    Facts::builder()
        .with(fields::TRIGGER_REASON, trigger_reason)
        .with(fields::STAGE, stage.as_str())
        .with(fields::IS_BUSINESS_HOURS, is_business_hours)
        .with(fields::RESPONSE_RECEIVED, false)
        .build()
}

/// Evaluate `facts` and read the action columns. `Ok(None)` means no rule
/// matched. Output that does not name a known action, or a sending action
/// without a notification kind, is reported as a malformed table.
pub fn decide(table: &DecisionTable, facts: &Facts) -> Result<Option<StageDecision>, RuleError> {
    let (rule, output) = match evaluate(table, facts)? {
        Outcome::Matched { index, output } => (Some(index), output),
        Outcome::CatchAll { output } => (None, output),
        Outcome::NoMatch => return Ok(None),
    };

    let malformed = |reason: String| RuleError::MalformedTable {
        table: table.id().to_string(),
        reason,
    };

    let action: Action = output_str(output, fields::ACTION)
        .ok_or_else(|| malformed(format!("output has no string '{}' column", fields::ACTION)))?
        .parse()
        .map_err(|e| malformed(format!("{e}")))?;

    let notification_kind = match output.get(fields::NOTIFICATION_KIND) {
        None => None,
        Some(value) => Some(
            value
                .as_str()
                .ok_or_else(|| malformed(format!("'{}' must be a string, got {value}", fields::NOTIFICATION_KIND)))?
                .parse::<NotificationKind>()
                .map_err(|e| malformed(format!("{e}")))?,
        ),
    };

    if !action.is_terminal() && notification_kind.is_none() {
        return Err(malformed(format!("{action} requires a '{}' column", fields::NOTIFICATION_KIND)));
    }

    Ok(Some(StageDecision {
        action,
        notification_kind,
        rule,
    }))
}

/// Classify an intake with the `application-validation` table. Returns the
/// `classification` column, or `None` when no rule matched.
pub fn classify_application(
    table: &DecisionTable,
    loan_application_count: i64,
    requirements_present: bool,
) -> Result<Option<String>, RuleError> {
    let facts = Facts::builder()
        .with(fields::LOAN_APPLICATION_COUNT, loan_application_count)
        .with(fields::REQUIREMENTS_PRESENT, requirements_present)
        .build();

    let Some(output) = evaluate(table, &facts)?.output() else {
        return Ok(None);
    };
    output_str(output, fields::CLASSIFICATION)
        .map(|c| Some(c.to_string()))
        .ok_or_else(|| RuleError::MalformedTable {
            table: table.id().to_string(),
            reason: format!("output has no string '{}' column", fields::CLASSIFICATION),
        })
}

fn output_str<'a>(output: &'a OutputRecord, field: &str) -> Option<&'a str> {
    output.get(field).and_then(|v| v.as_str())
}
