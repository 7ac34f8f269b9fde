use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use tracing::debug;

/// Source of "now" for relative-date resolution.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

const ABSOLUTE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Resolves a provider date string ("2 days ago", "yesterday", "2024-05-01", ...)
/// to a calendar date. Unparseable input and the "unknown" sentinel yield `None`.
pub fn parse_posted_date(raw: &str, clock: &dyn Clock) -> Option<NaiveDate> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() || text == "unknown" {
        return None;
    }

    let now = clock.now();
    let parsed = match text.as_str() {
        "today" | "now" | "just now" | "just posted" => Some(now.date_naive()),
        "yesterday" => now.date_naive().pred_opt(),
        _ => parse_relative(&text, now).or_else(|| parse_absolute(raw.trim())),
    };

    if parsed.is_none() {
        debug!(raw, "unparseable posted date");
    }
    parsed
}

fn parse_relative(text: &str, now: DateTime<Utc>) -> Option<NaiveDate> {
    let rest = text.strip_suffix("ago")?.trim_end();
    let mut parts = rest.split_whitespace();
    let amount = parts.next()?;
    let unit = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let amount: u32 = match amount.trim_end_matches('+') {
        "a" | "an" => 1,
        digits => digits.parse().ok()?,
    };

    let at = match unit.trim_end_matches('s') {
        "" | "second" | "sec" => now.checked_sub_signed(Duration::seconds(amount.into()))?,
        "m" | "min" | "minute" => now.checked_sub_signed(Duration::minutes(amount.into()))?,
        "h" | "hr" | "hour" => now.checked_sub_signed(Duration::hours(amount.into()))?,
        "d" | "day" => now.checked_sub_signed(Duration::days(amount.into()))?,
        "w" | "week" => now.checked_sub_signed(Duration::weeks(amount.into()))?,
        "mo" | "month" => now.checked_sub_months(Months::new(amount))?,
        "y" | "yr" | "year" => now.checked_sub_months(Months::new(amount.checked_mul(12)?))?,
        _ => return None,
    };
    Some(at.date_naive())
}

fn parse_absolute(text: &str) -> Option<NaiveDate> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    ABSOLUTE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}
