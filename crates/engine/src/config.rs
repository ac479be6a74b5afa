//! Engine configuration from environment variables.
//!
//! Every key may be prefixed with a profile (`ESCALATOR_PROFILE=STAGING`
//! reads `STAGING_BUSINESS_START` before `BUSINESS_START`).

use std::env;
use std::path::PathBuf;

use chrono::Duration;
use indexmap::IndexMap;

use crate::business_hours::BusinessHours;
use crate::error::{EngineError, Result};
use crate::stage::Stage;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        if let Some(v) = env_opt(&format!("{profile}_{key}")) {
            return Some(v);
        }
    }
    env_opt(key)
}

const DEFAULT_DAYS: &str = "mon-fri";
const DEFAULT_START: &str = "06:00";
const DEFAULT_END: &str = "22:00";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_STAGE_WAITS: &str = "follow_up_1=1h,follow_up_2=3h";
const DEFAULT_DEADLINE_HOURS: i64 = 16;
const DEFAULT_RESOLVED_RETENTION: &str = "1h";

/// Stages that carry a configurable wait. INITIAL sends on start and the
/// deadline is measured from the first send.
const WAITED_STAGES: [Stage; 2] = [Stage::FollowUp1, Stage::FollowUp2];

// ── EngineConfig ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub business_hours: BusinessHours,
    /// Business time to wait before entering each follow-up stage, measured
    /// from the previous stage's send.
    pub stage_waits: IndexMap<Stage, Duration>,
    /// Business time from the first send until the deadline stage.
    pub deadline: Duration,
    /// Directory of YAML tables overriding the built-in ones.
    pub tables_dir: Option<PathBuf>,
    /// How long a resolved instance stays queryable before it is evicted.
    pub resolved_retention: Duration,
}

impl EngineConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self> {
        let profile = env_opt("ESCALATOR_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self> {
        let p = profile.to_uppercase();
        let mut config = Self::from_lookup(|key| profiled_env_opt(&p, key))?;
        config.profile = p;
        Ok(config)
    }

    /// Build config from an arbitrary key lookup. Missing keys use defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let business_hours = BusinessHours::parse(
            &get("BUSINESS_DAYS", DEFAULT_DAYS),
            &get("BUSINESS_START", DEFAULT_START),
            &get("BUSINESS_END", DEFAULT_END),
            &get("BUSINESS_TIMEZONE", DEFAULT_TIMEZONE),
        )?;

        let stage_waits = parse_stage_waits(&get("STAGE_WAITS", DEFAULT_STAGE_WAITS))?;

        let deadline_hours = match lookup("DEADLINE_BUSINESS_HOURS") {
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                EngineError::Config(format!("DEADLINE_BUSINESS_HOURS must be an integer, got '{raw}'"))
            })?,
            None => DEFAULT_DEADLINE_HOURS,
        };

        let retention = get("RESOLVED_RETENTION", DEFAULT_RESOLVED_RETENTION);
        let resolved_retention = parse_duration(&retention)
            .ok_or_else(|| EngineError::Config(format!("invalid RESOLVED_RETENTION '{}'", retention.trim())))?;

        let config = Self {
            profile: String::new(),
            business_hours,
            stage_waits,
            deadline: Duration::hours(deadline_hours),
            tables_dir: lookup("TABLES_DIR").map(PathBuf::from),
            resolved_retention,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check waits and deadline against each other.
    pub fn validate(&self) -> Result<()> {
        if self.deadline <= Duration::zero() {
            return Err(EngineError::Config("deadline must be positive".into()));
        }

        let mut total = Duration::zero();
        for stage in WAITED_STAGES {
            let wait = self
                .stage_waits
                .get(&stage)
                .ok_or_else(|| EngineError::Config(format!("missing stage wait for {stage}")))?;
            if *wait <= Duration::zero() {
                return Err(EngineError::Config(format!("stage wait for {stage} must be positive")));
            }
            total = total + *wait;
        }

        if let Some(stage) = self.stage_waits.keys().find(|s| !WAITED_STAGES.contains(s)) {
            return Err(EngineError::Config(format!("stage {stage} does not take a wait")));
        }

        if total >= self.deadline {
            return Err(EngineError::Config(format!(
                "follow-up waits ({}h) must finish before the deadline ({}h)",
                total.num_hours(),
                self.deadline.num_hours()
            )));
        }
        Ok(())
    }

    /// Wait before entering `stage`, if it has one.
    pub fn wait_before(&self, stage: Stage) -> Option<Duration> {
        self.stage_waits.get(&stage).copied()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        let hours = &self.business_hours;
        let days: Vec<String> = hours.days().iter().map(|d| d.to_string()).collect();
        let waits: Vec<String> = self
            .stage_waits
            .iter()
            .map(|(stage, wait)| format!("{stage}={}m", wait.num_minutes()))
            .collect();

        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  business hours: {} {}-{} ({})",
            days.join(","),
            hours.start(),
            hours.end(),
            hours.timezone()
        );
        tracing::info!("  stage waits:    {}", waits.join(", "));
        tracing::info!("  deadline:       {}h", self.deadline.num_hours());
        tracing::info!("  retention:      {}m", self.resolved_retention.num_minutes());
        tracing::info!(
            "  tables dir:     {}",
            self.tables_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(built-in only)".into())
        );
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            business_hours: BusinessHours::default(),
            stage_waits: IndexMap::from([
                (Stage::FollowUp1, Duration::hours(1)),
                (Stage::FollowUp2, Duration::hours(3)),
            ]),
            deadline: Duration::hours(DEFAULT_DEADLINE_HOURS),
            tables_dir: None,
            resolved_retention: Duration::hours(1),
        }
    }
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Parse `follow_up_1=1h,follow_up_2=3h` into an ordered stage map.
pub fn parse_stage_waits(s: &str) -> Result<IndexMap<Stage, Duration>> {
    let mut waits = IndexMap::new();
    for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (stage, duration) = entry
            .split_once('=')
            .ok_or_else(|| EngineError::Config(format!("stage wait '{entry}' must be STAGE=DURATION")))?;
        let stage: Stage = stage
            .parse()
            .map_err(|e: EngineError| EngineError::Config(e.to_string()))?;
        let duration = parse_duration(duration)
            .ok_or_else(|| EngineError::Config(format!("invalid duration '{}' for {stage}", duration.trim())))?;
        if waits.insert(stage, duration).is_some() {
            return Err(EngineError::Config(format!("duplicate stage wait for {stage}")));
        }
    }
    Ok(waits)
}

/// Parse a human-readable duration string.
///
/// Supports components: `Xd` (days), `Xh` (hours), `Xm` (minutes), `Xs` (seconds).
/// Components can be combined: "2h30m", "1d12h", "90s". A bare number is
/// seconds. Returns `None` if the string is empty or unparseable.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total_secs: i64 = 0;
    let mut num_buf = String::new();
    let mut found_unit = false;

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            num_buf.push(ch);
        } else {
            let n: i64 = num_buf.parse().ok()?;
            num_buf.clear();
            let secs = match ch {
                'd' => n.checked_mul(86_400)?,
                'h' => n.checked_mul(3_600)?,
                'm' => n.checked_mul(60)?,
                's' => n,
                _ => return None,
            };
            total_secs = total_secs.checked_add(secs)?;
            found_unit = true;
        }
    }

    if !num_buf.is_empty() {
        if found_unit {
            // "1h30" is ambiguous.
            return None;
        }
        total_secs = num_buf.parse().ok()?;
    }

    Some(Duration::seconds(total_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.business_hours, BusinessHours::default());
        assert_eq!(config.wait_before(Stage::FollowUp1), Some(Duration::hours(1)));
        assert_eq!(config.wait_before(Stage::FollowUp2), Some(Duration::hours(3)));
        assert_eq!(config.wait_before(Stage::Deadline), None);
        assert_eq!(config.deadline, Duration::hours(16));
        assert!(config.tables_dir.is_none());
        assert_eq!(config.resolved_retention, Duration::hours(1));
        assert_eq!(config.profile_label(), "default");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("BUSINESS_DAYS", "mon-sat"),
            ("BUSINESS_START", "08:30"),
            ("BUSINESS_TIMEZONE", "+02:00"),
            ("STAGE_WAITS", "FOLLOW_UP_1=30m, follow_up_2=2h"),
            ("DEADLINE_BUSINESS_HOURS", "8"),
            ("TABLES_DIR", "/etc/escalator/tables"),
            ("RESOLVED_RETENTION", "15m"),
        ]))
        .unwrap();

        assert_eq!(config.business_hours.days().len(), 6);
        assert_eq!(config.business_hours.timezone().to_string(), "+02:00");
        assert_eq!(config.wait_before(Stage::FollowUp1), Some(Duration::minutes(30)));
        assert_eq!(config.deadline, Duration::hours(8));
        assert_eq!(config.tables_dir, Some(PathBuf::from("/etc/escalator/tables")));
        assert_eq!(config.resolved_retention, Duration::minutes(15));
    }

    #[test]
    fn named_timezones_are_accepted() {
        let config = EngineConfig::from_lookup(lookup(&[("BUSINESS_TIMEZONE", "Europe/Berlin")])).unwrap();
        assert_eq!(config.business_hours.timezone().to_string(), "Europe/Berlin");
        assert!(EngineConfig::from_lookup(lookup(&[("BUSINESS_TIMEZONE", "Nowhere/Land")])).is_err());
    }

    #[test]
    fn waits_must_fit_before_deadline() {
        let err = EngineConfig::from_lookup(lookup(&[("DEADLINE_BUSINESS_HOURS", "4")])).unwrap_err();
        assert!(err.to_string().contains("before the deadline"));
    }

    #[test]
    fn invalid_stage_waits_are_rejected() {
        for raw in [
            "follow_up_1=1h",
            "follow_up_1=1h,follow_up_2=0s",
            "follow_up_1=1h,follow_up_2=2h,deadline=3h",
            "follow_up_1=1h,follow_up_1=2h",
            "follow_up_1:1h",
            "follow_up_3=1h",
        ] {
            assert!(
                EngineConfig::from_lookup(lookup(&[("STAGE_WAITS", raw)])).is_err(),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn invalid_deadline_is_rejected() {
        assert!(EngineConfig::from_lookup(lookup(&[("DEADLINE_BUSINESS_HOURS", "sixteen")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("DEADLINE_BUSINESS_HOURS", "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("RESOLVED_RETENTION", "soon")])).is_err());
    }

    #[test]
    fn parse_duration_formats() {
        assert_eq!(parse_duration("1h"), Some(Duration::hours(1)));
        assert_eq!(parse_duration("2h30m"), Some(Duration::minutes(150)));
        assert_eq!(parse_duration("1d12h"), Some(Duration::hours(36)));
        assert_eq!(parse_duration("90"), Some(Duration::seconds(90)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("1h30"), None);
        assert_eq!(parse_duration("1w"), None);
    }

    #[test]
    fn profile_prefix_wins_over_plain_key() {
        std::env::set_var("ESCTEST_BUSINESS_START", "09:00");
        let config = EngineConfig::for_profile("esctest").unwrap();
        std::env::remove_var("ESCTEST_BUSINESS_START");

        assert_eq!(config.profile, "ESCTEST");
        assert_eq!(config.business_hours.start(), chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    }
}
