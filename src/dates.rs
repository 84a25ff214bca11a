//! Normalization of the site's timestamp spellings ("Now", "5 minutes ago",
//! "Yesterday, 3:12 PM", "Mar 4, 2019", "1994", ...) into absolute values.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;

static RELATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}) (minute|hour)").unwrap());
static DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Today|Yesterday), (.+)$").unwrap());

/// Year assumed for birthdays that only list a month (and maybe a day).
/// A leap year, so `Feb 29` survives.
const PLACEHOLDER_YEAR: i32 = 2000;

const LAST_ONLINE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Absolute spellings in the order they are tried.
#[derive(Debug, Clone, Copy)]
enum Absolute {
    /// `Mar 4, 2019 3:12 PM`
    Full,
    /// `Mar 4, 3:12 PM`, year is the current one
    CurrentYear,
    /// `Mar 4, 2019`
    MonthDayYear,
    /// `Mar 4`
    MonthDay,
    /// `Mar`
    Month,
    /// `2019`
    Year,
}

const ABSOLUTE_FORMATS: &[Absolute] = &[
    Absolute::Full,
    Absolute::CurrentYear,
    Absolute::MonthDayYear,
    Absolute::MonthDay,
    Absolute::Month,
    Absolute::Year,
];

impl Absolute {
    fn parse(self, text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Absolute::Full => NaiveDateTime::parse_from_str(text, "%b %d, %Y %I:%M %p").ok(),
            Absolute::CurrentYear => NaiveDateTime::parse_from_str(
                &format!("{} {}", text, now.year()),
                "%b %d, %I:%M %p %Y",
            )
            .ok(),
            Absolute::MonthDayYear => midnight(NaiveDate::parse_from_str(text, "%b %d, %Y").ok()),
            // Year goes first: a trailing year would be read as the day of
            // a month-only spelling ("Dec 2000" -> day 20).
            Absolute::MonthDay => midnight(
                NaiveDate::parse_from_str(&format!("{} {}", PLACEHOLDER_YEAR, text), "%Y %b %d")
                    .ok(),
            ),
            Absolute::Month => midnight(
                NaiveDate::parse_from_str(&format!("{} {} 1", PLACEHOLDER_YEAR, text), "%Y %b %d")
                    .ok(),
            ),
            Absolute::Year => {
                if text.len() != 4 || !text.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                midnight(NaiveDate::parse_from_str(&format!("Jan 1 {}", text), "%b %d %Y").ok())
            }
        }
    }
}

fn midnight(date: Option<NaiveDate>) -> Option<NaiveDateTime> {
    date.and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Normalize against the local clock.
pub fn normalize(text: &str) -> Option<NaiveDateTime> {
    normalize_at(text, Local::now().naive_local())
}

/// Normalize `text` with `now` as the reference point for relative spellings.
///
/// Relative phrasings are checked before any absolute format so that a
/// leading number ("5 minutes ago") never reaches the absolute parsers.
pub fn normalize_at(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text == "Now" || text.contains("second") {
        return Some(now);
    }

    if let Some(caps) = RELATIVE_RE.captures(text) {
        let n: i64 = caps[1].parse().ok()?;
        let delta = match &caps[2] {
            "minute" => Duration::minutes(n),
            _ => Duration::hours(n),
        };
        return Some(now - delta);
    }

    if let Some(caps) = DAY_RE.captures(text) {
        let day = match &caps[1] {
            "Yesterday" => now.date() - Duration::days(1),
            _ => now.date(),
        };
        let time = NaiveTime::parse_from_str(caps[2].trim(), "%I:%M %p").ok()?;
        return Some(day.and_time(time));
    }

    ABSOLUTE_FORMATS.iter().find_map(|f| f.parse(text, now))
}

/// Sortable last-online text, truncated to whole seconds.
pub fn last_online_text(value: Option<NaiveDateTime>) -> Option<String> {
    value.map(|dt| truncate_seconds(dt).format(LAST_ONLINE_FORMAT).to_string())
}

/// Plain calendar date text (birthday, joined).
pub fn date_text(value: Option<NaiveDate>) -> Option<String> {
    value.map(|d| d.format(DATE_FORMAT).to_string())
}

pub fn truncate_seconds(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_nanosecond(0).unwrap_or(dt)
}
