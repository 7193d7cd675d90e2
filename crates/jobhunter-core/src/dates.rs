//! Best-effort parsing of "posted" values as job boards print them.
//!
//! Handles relative phrases ("3 days ago", "2h", "yesterday"), unix
//! timestamps and a list of absolute formats. Anything else is `None`:
//! an unknown posting date is not the same as an old one.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;

const NOW_PHRASES: &[&str] = &[
    "today",
    "just now",
    "now",
    "few minutes ago",
    "a few minutes ago",
    "moments ago",
    "just posted",
    "posted today",
];

const PREFIXES: &[&str] = &["posted on ", "posted ", "updated ", "active "];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%a %b %d %H:%M:%S UTC %Y",
];

// Day-first before month-first: the boards this targets print 22/04/2023.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d %b, %Y",
];

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d+|an?)\s*\+?\s*(minutes?|mins?|m|hours?|hrs?|h|days?|d|weeks?|wks?|w|months?|mos?)\.?(\s+ago)?$",
    )
    .expect("relative date pattern is valid")
});

/// Parse a posted-date string relative to `now`.
pub fn parse_posted(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let trimmed = strip_prefixes(raw.trim());
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();

    if NOW_PHRASES.contains(&lower.as_str()) {
        return Some(now);
    }
    if lower == "yesterday" {
        return Some(now - TimeDelta::days(1));
    }
    if let Some(ts) = parse_relative(&lower, now) {
        return Some(ts);
    }
    if lower.bytes().all(|b| b.is_ascii_digit()) {
        return lower.parse::<i64>().ok().and_then(from_unix);
    }
    parse_absolute(trimmed)
}

/// Interpret a unix timestamp, in seconds or milliseconds.
pub fn from_unix(value: i64) -> Option<DateTime<Utc>> {
    // Anything past 10^11 seconds is year 5138; treat it as millis.
    if value.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

fn strip_prefixes(s: &str) -> &str {
    for prefix in PREFIXES {
        if s.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            return s[prefix.len()..].trim_start();
        }
    }
    s
}

fn parse_relative(lower: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RELATIVE.captures(lower)?;
    let amount: i64 = match &caps[1] {
        "a" | "an" => 1,
        n => n.parse().ok()?,
    };
    let delta = match &caps[2] {
        "m" | "min" | "mins" | "minute" | "minutes" => TimeDelta::try_minutes(amount)?,
        "h" | "hr" | "hrs" | "hour" | "hours" => TimeDelta::try_hours(amount)?,
        "d" | "day" | "days" => TimeDelta::try_days(amount)?,
        "w" | "wk" | "wks" | "week" | "weeks" => TimeDelta::try_weeks(amount)?,
        // A month is approximated as 30 days.
        _ => TimeDelta::try_days(amount.checked_mul(30)?)?,
    };
    now.checked_sub_signed(delta)
}

fn parse_absolute(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_now_phrases() {
        assert_eq!(parse_posted("Just posted", now()), Some(now()));
        assert_eq!(parse_posted("  today ", now()), Some(now()));
        assert_eq!(parse_posted("Posted Today", now()), Some(now()));
        assert_eq!(
            parse_posted("Yesterday", now()),
            Some(now() - TimeDelta::days(1))
        );
    }

    #[test]
    fn parses_relative_phrases() {
        assert_eq!(
            parse_posted("3 hours ago", now()),
            Some(now() - TimeDelta::hours(3))
        );
        assert_eq!(parse_posted("2h", now()), Some(now() - TimeDelta::hours(2)));
        assert_eq!(
            parse_posted("Posted 5 days ago", now()),
            Some(now() - TimeDelta::days(5))
        );
        assert_eq!(
            parse_posted("30+ days ago", now()),
            Some(now() - TimeDelta::days(30))
        );
        assert_eq!(
            parse_posted("an hour ago", now()),
            Some(now() - TimeDelta::hours(1))
        );
        assert_eq!(
            parse_posted("1 week ago", now()),
            Some(now() - TimeDelta::weeks(1))
        );
        assert_eq!(
            parse_posted("2 months ago", now()),
            Some(now() - TimeDelta::days(60))
        );
        assert_eq!(
            parse_posted("15 mins ago", now()),
            Some(now() - TimeDelta::minutes(15))
        );
    }

    #[test]
    fn parses_absolute_formats() {
        let midnight = Utc.with_ymd_and_hms(2023, 4, 22, 0, 0, 0).unwrap();
        assert_eq!(parse_posted("2023-04-22", now()), Some(midnight));
        assert_eq!(parse_posted("22/04/2023", now()), Some(midnight));
        assert_eq!(parse_posted("04/22/2023", now()), Some(midnight));
        assert_eq!(parse_posted("Apr 22, 2023", now()), Some(midnight));
        assert_eq!(parse_posted("22 April 2023", now()), Some(midnight));
        assert_eq!(parse_posted("Posted on 2023/04/22", now()), Some(midnight));
        assert_eq!(
            parse_posted("2023-04-22T10:30:00Z", now()),
            Some(Utc.with_ymd_and_hms(2023, 4, 22, 10, 30, 0).unwrap())
        );
        assert_eq!(
            parse_posted("2023-04-22T10:30:00+05:30", now()),
            Some(Utc.with_ymd_and_hms(2023, 4, 22, 5, 0, 0).unwrap())
        );
        assert_eq!(
            parse_posted("Sat Apr 22 10:30:00 UTC 2023", now()),
            Some(Utc.with_ymd_and_hms(2023, 4, 22, 10, 30, 0).unwrap())
        );
    }

    #[test]
    fn parses_unix_timestamps() {
        let expected = Utc.with_ymd_and_hms(2023, 4, 22, 0, 0, 0).unwrap();
        assert_eq!(parse_posted("1682121600", now()), Some(expected));
        assert_eq!(parse_posted("1682121600000", now()), Some(expected));
    }

    #[test]
    fn vague_or_garbage_is_absent() {
        assert_eq!(parse_posted("Recent", now()), None);
        assert_eq!(parse_posted("Active", now()), None);
        assert_eq!(parse_posted("within last 7 days", now()), None);
        assert_eq!(parse_posted("", now()), None);
        assert_eq!(parse_posted("next tuesday-ish", now()), None);
    }
}
