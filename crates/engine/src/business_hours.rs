//! Business-hours window arithmetic.
//!
//! A window is `[start, end)` local time on each configured weekday. Local
//! time is an IANA zone (`Europe/Berlin`) or a fixed UTC offset; all inputs
//! and outputs are UTC instants. Business durations only count time inside
//! windows.
//!
//! Window bounds that fall into a daylight-saving gap move forward by the
//! length of the gap. Bounds inside a repeated hour take the earlier instant.

use std::fmt;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Utc, Weekday,
};
use chrono_tz::Tz;

use crate::error::{EngineError, Result};

// ── Timezone ────────────────────────────────────────────────────────

/// Zone the business-hours window is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessTimezone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl BusinessTimezone {
    /// Local wall-clock time of `at`.
    pub fn local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Self::Fixed(offset) => at.with_timezone(offset).naive_local(),
            Self::Named(tz) => at.with_timezone(tz).naive_local(),
        }
    }

    /// UTC instant of a local wall-clock time.
    pub fn resolve(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self {
            Self::Fixed(offset) => resolve_in(offset, local),
            Self::Named(tz) => resolve_in(tz, local),
        }
    }
}

impl Default for BusinessTimezone {
    fn default() -> Self {
        Self::Fixed(Utc.fix())
    }
}

impl fmt::Display for BusinessTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(offset) if offset.local_minus_utc() == 0 => f.write_str("UTC"),
            Self::Fixed(offset) => write!(f, "{offset}"),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

fn resolve_in<Z: TimeZone>(zone: &Z, local: NaiveDateTime) -> DateTime<Utc> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(at) => at.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Gap: keep the offset in force before the transition.
            let before = zone.offset_from_utc_datetime(&(local - Duration::days(1))).fix();
            Utc.from_utc_datetime(&(local - Duration::seconds(i64::from(before.local_minus_utc()))))
        }
    }
}

// ── Window ──────────────────────────────────────────────────────────

/// Recurring weekly business-hours window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessHours {
    days: Vec<Weekday>,
    start: NaiveTime,
    end: NaiveTime,
    timezone: BusinessTimezone,
}

impl BusinessHours {
    /// Build a window. `days` must be non-empty and `start` before `end`.
    pub fn new(days: Vec<Weekday>, start: NaiveTime, end: NaiveTime, timezone: BusinessTimezone) -> Result<Self> {
        let mut days = days;
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();

        if days.is_empty() {
            return Err(EngineError::Config("business hours need at least one weekday".into()));
        }
        if start >= end {
            return Err(EngineError::Config(format!(
                "business hours start {start} must be before end {end}"
            )));
        }

        Ok(Self {
            days,
            start,
            end,
            timezone,
        })
    }

    /// Parse the textual config form: `mon-fri`, `06:00`, `22:00`,
    /// `Europe/Berlin` (or `+01:00`).
    pub fn parse(days: &str, start: &str, end: &str, timezone: &str) -> Result<Self> {
        Self::new(
            parse_weekdays(days)?,
            parse_time(start)?,
            parse_time(end)?,
            parse_timezone(timezone)?,
        )
    }

    pub fn days(&self) -> &[Weekday] {
        &self.days
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn timezone(&self) -> BusinessTimezone {
        self.timezone
    }

    /// Whether `at` falls inside a business window.
    pub fn is_business_hours(&self, at: DateTime<Utc>) -> bool {
        let date = self.local_date(at);
        self.is_business_day(date) && self.to_utc(date, self.start) <= at && at < self.to_utc(date, self.end)
    }

    /// Earliest window start at or after `at`.
    pub fn next_window_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = self.local_date(at);
        // Terminates within eight days: `days` is never empty.
        loop {
            if self.is_business_day(date) {
                let start = self.to_utc(date, self.start);
                if start >= at {
                    return start;
                }
            }
            date = date + Duration::days(1);
        }
    }

    /// `at` itself when inside a window, otherwise the next window start.
    pub fn first_business_instant(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_business_hours(at) {
            at
        } else {
            self.next_window_start(at)
        }
    }

    /// The first business instant at or after `amount` of business time has
    /// elapsed from `from`. Time outside windows does not count.
    pub fn add_business_time(&self, from: DateTime<Utc>, amount: Duration) -> DateTime<Utc> {
        let mut cursor = self.first_business_instant(from);
        let mut remaining = amount;

        while remaining > Duration::zero() {
            let window_end = self.window_end(cursor);
            let available = window_end - cursor;
            if remaining < available {
                return cursor + remaining;
            }
            remaining = remaining - available;
            cursor = self.next_window_start(window_end);
        }

        cursor
    }

    /// Business time inside `[from, to)`. Zero when `to <= from`.
    pub fn business_time_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
        let mut total = Duration::zero();
        if to <= from {
            return total;
        }

        let mut date = self.local_date(from);
        let last = self.local_date(to);
        while date <= last {
            if self.is_business_day(date) {
                let lo = self.to_utc(date, self.start).max(from);
                let hi = self.to_utc(date, self.end).min(to);
                if hi > lo {
                    total = total + (hi - lo);
                }
            }
            date = date + Duration::days(1);
        }
        total
    }

    fn is_business_day(&self, date: NaiveDate) -> bool {
        self.days.contains(&date.weekday())
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        self.timezone.local(at).date()
    }

    /// End of the window containing `at`. `at` must be in business hours.
    fn window_end(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.to_utc(self.local_date(at), self.end)
    }

    fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        self.timezone.resolve(date.and_time(time))
    }
}

impl Default for BusinessHours {
    /// Monday to Friday, 06:00 to 22:00 UTC.
    fn default() -> Self {
        Self {
            days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            start: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            timezone: BusinessTimezone::default(),
        }
    }
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Parse `mon-fri`, `sat,sun`, or `mon-wed,fri`. Ranges may wrap (`fri-mon`).
pub fn parse_weekdays(s: &str) -> Result<Vec<Weekday>> {
    let mut days = Vec::new();

    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((from, to)) => {
                let from = parse_weekday(from)?;
                let to = parse_weekday(to)?;
                let mut day = from;
                days.push(day);
                while day != to {
                    day = day.succ();
                    days.push(day);
                }
            }
            None => days.push(parse_weekday(part)?),
        }
    }

    if days.is_empty() {
        return Err(EngineError::Config(format!("no weekdays in '{s}'")));
    }
    Ok(days)
}

fn parse_weekday(s: &str) -> Result<Weekday> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| EngineError::Config(format!("unknown weekday '{}'", s.trim())))
}

/// Parse `HH:MM` (or `HH:MM:SS`).
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| EngineError::Config(format!("invalid time of day '{s}', expected HH:MM")))
}

/// Parse an IANA zone name (`Europe/Berlin`), `UTC`, `Z`, or `±HH:MM`.
pub fn parse_timezone(s: &str) -> Result<BusinessTimezone> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s == "Z" || s.starts_with(['+', '-']) {
        return parse_offset(s).map(BusinessTimezone::Fixed);
    }
    s.parse::<Tz>()
        .map(BusinessTimezone::Named)
        .map_err(|_| EngineError::Config(format!("unknown timezone '{s}'")))
}

/// Parse `UTC`, `Z`, or `±HH:MM`.
pub fn parse_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    let invalid = || EngineError::Config(format!("invalid timezone offset '{s}', expected UTC or ±HH:MM"));

    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return Ok(Utc.fix());
    }

    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..60).contains(&minutes) {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3_600 + minutes * 60)).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2026-10-19 is a Monday.
    fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn window_membership() {
        let hours = BusinessHours::default();
        assert!(hours.is_business_hours(utc(19, 6, 0)));
        assert!(hours.is_business_hours(utc(19, 21, 59)));
        assert!(!hours.is_business_hours(utc(19, 5, 59)));
        assert!(!hours.is_business_hours(utc(19, 22, 0)));
        assert!(!hours.is_business_hours(utc(24, 12, 0)), "saturday");
    }

    #[test]
    fn next_window_skips_weekend() {
        let hours = BusinessHours::default();
        assert_eq!(hours.next_window_start(utc(23, 23, 0)), utc(26, 6, 0));
        assert_eq!(hours.next_window_start(utc(20, 3, 0)), utc(20, 6, 0));
        assert_eq!(hours.next_window_start(utc(20, 6, 0)), utc(20, 6, 0));
        assert_eq!(hours.next_window_start(utc(20, 6, 1)), utc(21, 6, 0));
    }

    #[test]
    fn business_time_skips_nights_and_weekends() {
        let hours = BusinessHours::default();
        assert_eq!(hours.add_business_time(utc(19, 10, 0), Duration::hours(1)), utc(19, 11, 0));
        assert_eq!(hours.add_business_time(utc(19, 21, 30), Duration::hours(1)), utc(20, 6, 30));
        assert_eq!(hours.add_business_time(utc(23, 21, 0), Duration::hours(3)), utc(26, 8, 0));
        // Starting outside hours counts from the next window.
        assert_eq!(hours.add_business_time(utc(24, 9, 0), Duration::hours(2)), utc(26, 8, 0));
    }

    #[test]
    fn target_on_window_end_lands_on_next_window() {
        let hours = BusinessHours::default();
        assert_eq!(hours.add_business_time(utc(19, 6, 0), Duration::hours(16)), utc(20, 6, 0));
        assert_eq!(hours.add_business_time(utc(19, 23, 0), Duration::zero()), utc(20, 6, 0));
    }

    #[test]
    fn elapsed_business_time() {
        let hours = BusinessHours::default();
        assert_eq!(hours.business_time_between(utc(23, 21, 0), utc(26, 7, 0)), Duration::hours(2));
        assert_eq!(hours.business_time_between(utc(19, 10, 0), utc(19, 10, 0)), Duration::zero());
        assert_eq!(hours.business_time_between(utc(19, 12, 0), utc(19, 10, 0)), Duration::zero());
        assert_eq!(hours.business_time_between(utc(19, 0, 0), utc(21, 0, 0)), Duration::hours(32));
    }

    #[test]
    fn offset_shifts_the_window() {
        let hours = BusinessHours::parse("mon-fri", "06:00", "22:00", "+08:00").unwrap();
        // Monday 06:00 at +08:00 is Sunday 22:00 UTC.
        assert!(hours.is_business_hours(utc(18, 22, 30)));
        assert!(!hours.is_business_hours(utc(19, 14, 0)));
        assert_eq!(hours.next_window_start(utc(19, 15, 0)), utc(19, 22, 0));
    }

    #[test]
    fn parse_weekday_lists_and_ranges() {
        assert_eq!(parse_weekdays("mon-fri").unwrap().len(), 5);
        assert_eq!(parse_weekdays("sat, sun").unwrap(), vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!(
            parse_weekdays("fri-mon").unwrap(),
            vec![Weekday::Fri, Weekday::Sat, Weekday::Sun, Weekday::Mon]
        );
        assert!(parse_weekdays("").is_err());
        assert!(parse_weekdays("mon-funday").is_err());
    }

    #[test]
    fn parse_times_and_offsets() {
        assert_eq!(parse_time("06:30").unwrap(), NaiveTime::from_hms_opt(6, 30, 0).unwrap());
        assert!(parse_time("25:00").is_err());
        assert_eq!(parse_offset("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_offset("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert!(parse_offset("Europe/Berlin").is_err());
        assert!(parse_offset("+01:75").is_err());
    }

    #[test]
    fn parse_timezone_forms() {
        assert_eq!(parse_timezone("UTC").unwrap(), BusinessTimezone::default());
        assert_eq!(
            parse_timezone("+05:30").unwrap(),
            BusinessTimezone::Fixed(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert_eq!(
            parse_timezone("Europe/Berlin").unwrap(),
            BusinessTimezone::Named(chrono_tz::Europe::Berlin)
        );
        assert_eq!(parse_timezone("Europe/Berlin").unwrap().to_string(), "Europe/Berlin");
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    fn berlin() -> BusinessHours {
        BusinessHours::parse("mon-fri", "06:00", "22:00", "Europe/Berlin").unwrap()
    }

    fn at(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, month, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn named_zone_follows_summer_time() {
        let hours = berlin();
        // 07:30 CEST.
        assert!(hours.is_business_hours(at(7, 6, 5, 30)));
        // 05:30 CEST.
        assert!(!hours.is_business_hours(at(7, 6, 3, 30)));
        // 07:30 CET.
        assert!(hours.is_business_hours(at(1, 12, 6, 30)));
        assert!(!hours.is_business_hours(at(1, 12, 4, 30)));
    }

    #[test]
    fn window_start_moves_across_the_autumn_change() {
        let hours = berlin();
        // Friday 23 Oct is CEST (+02:00), Monday 26 Oct is CET (+01:00).
        assert_eq!(hours.next_window_start(at(10, 22, 21, 0)), at(10, 23, 4, 0));
        assert_eq!(hours.next_window_start(at(10, 23, 21, 0)), at(10, 26, 5, 0));
        // One hour left on Friday, one more on Monday.
        assert_eq!(hours.add_business_time(at(10, 23, 19, 0), Duration::hours(2)), at(10, 26, 6, 0));
        assert_eq!(
            hours.business_time_between(at(10, 23, 19, 0), at(10, 26, 6, 0)),
            Duration::hours(2)
        );
    }

    #[test]
    fn window_bounds_in_gap_and_overlap() {
        let sunday = |start: &str, end: &str| BusinessHours::parse("sun", start, end, "Europe/Berlin").unwrap();

        // 29 Mar 2026: 02:00-03:00 does not exist; 02:30 becomes 03:30 CEST.
        let spring = sunday("02:30", "04:00");
        assert_eq!(spring.next_window_start(at(3, 29, 0, 0)), at(3, 29, 1, 30));
        assert!(!spring.is_business_hours(at(3, 29, 1, 10)));
        assert!(spring.is_business_hours(at(3, 29, 1, 45)));
        assert_eq!(
            spring.business_time_between(at(3, 29, 0, 0), at(3, 30, 0, 0)),
            Duration::minutes(30)
        );

        // 25 Oct 2026: 02:00-03:00 happens twice; the first 02:30 is CEST.
        let autumn = sunday("02:30", "04:00");
        assert_eq!(autumn.next_window_start(at(10, 25, 0, 0)), at(10, 25, 0, 30));
        assert_eq!(
            autumn.business_time_between(at(10, 25, 0, 0), at(10, 26, 0, 0)),
            Duration::minutes(150)
        );
    }

    #[test]
    fn invalid_windows_are_rejected() {
        assert!(BusinessHours::parse("mon-fri", "22:00", "06:00", "UTC").is_err());
        assert!(BusinessHours::new(Vec::new(), NaiveTime::MIN, NaiveTime::MIN, BusinessTimezone::default()).is_err());
    }
}
