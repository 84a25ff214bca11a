use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::fields::{all_captures, first_capture, parse_float, parse_int};
use crate::dates;
use crate::db::{Favorites, UserRow};
use crate::error::ScrapeError;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<span.*?>\s*(.*?)'s Profile").unwrap());
static LAST_ONLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Last Online</span>.*?>(.*?)</span>").unwrap());
static GENDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Gender</span>.*?>(.*?)</span>").unwrap());
static BIRTHDAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Birthday</span>.*?>(.*?)</span>").unwrap());
static LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Location</span>.*?>(.*?)</span>").unwrap());
static JOINED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Joined</span><span class="user-status-data di-ib fl-r">(.*?)<"#).unwrap()
});
static SHARED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"class="fs11">([\d,]+) Shared"#).unwrap());
static FRIENDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"All \(([\d,]+?)\)</a>Friends</h4>").unwrap());
static DAYS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Anime Stats</h5>\s*<.*?>\s*<.*?><.*?>Days: </span>([\d,]+\.?\d*)</div>").unwrap()
});
static MEAN_SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Mean Score: </span>([\d,]+\.?\d*)").unwrap());
static COMPLETED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Completed</a><span class="di-ib fl-r lh10">([\d,]+)"#).unwrap()
});
static AFFINITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"<div class="bar-outer-negative ar"><.*?>-?(\d+\.?\d*)%.*?</span></div>\s*"#,
        r#"<div class="bar-outer-positive al"><.*?>.*?(\d+\.?\d*)%"#,
    ))
    .unwrap()
});

static FAV_ANIME_RE: LazyLock<Regex> = LazyLock::new(|| favorite_pattern("anime"));
static FAV_MANGA_RE: LazyLock<Regex> = LazyLock::new(|| favorite_pattern("manga"));
static FAV_CHARACTER_RE: LazyLock<Regex> = LazyLock::new(|| favorite_pattern("character"));
static FAV_PEOPLE_RE: LazyLock<Regex> = LazyLock::new(|| favorite_pattern("people"));

fn favorite_pattern(segment: &str) -> Regex {
    Regex::new(&format!(
        r#"<div class="di-tc va-t pl8 data">\s*<a href="[^"]*/{}/[^"]*"[^>]*>(.+?)</a>"#,
        segment
    ))
    .unwrap()
}

/// Build a record from one profile page. Every field is best-effort; only a
/// blank body fails.
pub fn parse_profile(url: &str, page: &str) -> Result<UserRow, ScrapeError> {
    if page.trim().is_empty() {
        return Err(ScrapeError::Extraction {
            url: url.to_string(),
            reason: "empty page body".to_string(),
        });
    }

    Ok(UserRow {
        name: first_capture(&NAME_RE, page),
        last_online: first_capture(&LAST_ONLINE_RE, page)
            .and_then(|t| dates::normalize(&t))
            .map(dates::truncate_seconds),
        gender: first_capture(&GENDER_RE, page),
        birthday: date_field(&BIRTHDAY_RE, page),
        joined: date_field(&JOINED_RE, page),
        location: first_capture(&LOCATION_RE, page),
        shared: parse_int(first_capture(&SHARED_RE, page)),
        affinity: affinity(page),
        friend_count: parse_int(first_capture(&FRIENDS_RE, page)),
        days: parse_float(first_capture(&DAYS_RE, page)),
        mean_score: parse_float(first_capture(&MEAN_SCORE_RE, page)),
        completed: parse_int(first_capture(&COMPLETED_RE, page)),
        favorites: Favorites {
            anime: all_captures(&FAV_ANIME_RE, page),
            manga: all_captures(&FAV_MANGA_RE, page),
            character: all_captures(&FAV_CHARACTER_RE, page),
            people: all_captures(&FAV_PEOPLE_RE, page),
        },
    })
}

fn date_field(re: &Regex, page: &str) -> Option<NaiveDate> {
    first_capture(re, page)
        .and_then(|t| dates::normalize(&t))
        .map(|dt| dt.date())
}

/// Signed affinity from the two mutually exclusive bar widgets. The negative
/// bar only wins when it is non-zero.
pub fn affinity(page: &str) -> Option<f64> {
    let caps = AFFINITY_RE.captures(page)?;
    let negative = parse_float(caps.get(1).map(|m| m.as_str().to_string())).map(|v| -v);
    let positive = parse_float(caps.get(2).map(|m| m.as_str().to_string()));
    match (negative, positive) {
        (Some(n), _) if n != 0.0 => Some(n),
        (_, Some(p)) => Some(p),
        (n, None) => n,
    }
}
