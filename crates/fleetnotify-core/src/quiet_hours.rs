//! Quiet hours evaluation in the recipient's local time

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::constants::DEFAULT_TIMEZONE;
use crate::types::QuietHours;

/// Parse "HH:MM" into minutes since midnight
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()?;
    Some(time.hour() * 60 + time.minute())
}

/// Whether `now` (minutes since midnight) falls in `[start, end)`.
/// `start > end` wraps past midnight; `start == end` is an empty window.
pub fn window_contains(start: u32, end: u32, now: u32) -> bool {
    if start == end {
        false
    } else if start < end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

impl QuietHours {
    /// Check a local wall-clock time. Unparseable bounds disable the window.
    pub fn contains_local(&self, local: NaiveTime) -> bool {
        match (parse_hhmm(&self.start), parse_hhmm(&self.end)) {
            (Some(start), Some(end)) => {
                window_contains(start, end, local.hour() * 60 + local.minute())
            }
            _ => false,
        }
    }

    /// Check an instant in the given IANA timezone (default zone if unknown)
    pub fn contains(&self, now: DateTime<Utc>, timezone: Option<&str>) -> bool {
        let tz = resolve_timezone(timezone);
        self.contains_local(now.with_timezone(&tz).time())
    }
}

/// Parse a timezone name, falling back to the default zone
pub fn resolve_timezone(timezone: Option<&str>) -> Tz {
    timezone
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or_else(|| DEFAULT_TIMEZONE.parse().unwrap_or(chrono_tz::Asia::Ho_Chi_Minh))
}
