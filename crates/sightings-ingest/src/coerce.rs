//! Lenient value coercion for raw source text.
//!
//! Every parser returns `None` for input it cannot read. Callers decide
//! whether that drops the row (coordinates, dates, counts) or stores an
//! absent value (times of day).

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use sightings_core::model::Tally;

// ─── Numbers ─────────────────────────────────────────────────────────────────

/// A finite decimal number.
pub fn parse_number(s: &str) -> Option<f64> {
  s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// An integer, also accepting integral decimals such as `"6.0"`.
pub fn parse_int(s: &str) -> Option<i64> {
  let s = s.trim();
  if let Ok(n) = s.parse::<i64>() {
    return Some(n);
  }
  let n = parse_number(s)?;
  (n.fract() == 0.0 && n.abs() < 9.0e15).then_some(n as i64)
}

/// A count of individuals, or [`Tally::Present`] for one of `present_markers`
/// (compared case-insensitively). Negative and fractional counts are rejected.
pub fn parse_tally(s: &str, present_markers: &[String]) -> Option<Tally> {
  let s = s.trim();
  if present_markers.iter().any(|m| m.trim().eq_ignore_ascii_case(s)) {
    return Some(Tally::Present);
  }
  parse_int(s).and_then(|n| u32::try_from(n).ok()).map(Tally::Counted)
}

// ─── Dates ───────────────────────────────────────────────────────────────────

/// Parse with the first matching format. A format may also describe a full
/// date-time, in which case the time part is discarded.
pub fn parse_date(s: &str, formats: &[String]) -> Option<NaiveDate> {
  let s = s.trim();
  formats.iter().find_map(|fmt| {
    NaiveDate::parse_from_str(s, fmt)
      .ok()
      .or_else(|| NaiveDateTime::parse_from_str(s, fmt).ok().map(|dt| dt.date()))
  })
}

/// A date assembled from separate year, month, and day fields.
pub fn date_from_parts(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
  let year = i32::try_from(parse_int(year)?).ok()?;
  let month = u32::try_from(parse_int(month)?).ok()?;
  let day = u32::try_from(parse_int(day)?).ok()?;
  NaiveDate::from_ymd_opt(year, month, day)
}

/// Calendar year and 1-based day of year.
pub fn year_and_day(date: NaiveDate) -> (i32, u32) { (date.year(), date.ordinal()) }

// ─── Times of day ────────────────────────────────────────────────────────────

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p", "%I:%M%p"];

const DATETIME_FORMATS: &[&str] = &[
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M",
  "%Y-%m-%dT%H:%M:%S",
  "%m/%d/%Y %H:%M:%S",
  "%m/%d/%Y %H:%M",
  "%m/%d/%Y %I:%M:%S %p",
  "%m/%d/%Y %I:%M %p",
];

/// Canonicalise a time of day to minute precision.
///
/// Accepts bare `hMM`/`HHMM` digits (left-padded to four), `HH:MM[:SS]`,
/// 12-hour forms, and common date-time strings. Empty or unreadable input
/// yields `None`; no default time is substituted.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
  let s = s.trim();
  if s.is_empty() {
    return None;
  }

  let parsed = if s.len() <= 4 && s.bytes().all(|b| b.is_ascii_digit()) {
    let padded = format!("{s:0>4}");
    let hour = padded[..2].parse().ok()?;
    let minute = padded[2..].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
  } else {
    TIME_FORMATS
      .iter()
      .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
      .or_else(|| {
        DATETIME_FORMATS
          .iter()
          .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok().map(|dt| dt.time()))
      })
  }?;

  NaiveTime::from_hms_opt(parsed.hour(), parsed.minute(), 0)
}

/// `start` plus a duration in minutes, wrapping past midnight.
pub fn add_minutes(start: NaiveTime, minutes: f64) -> Option<NaiveTime> {
  if !minutes.is_finite() || minutes < 0.0 {
    return None;
  }
  let delta = TimeDelta::try_minutes(minutes.round() as i64)?;
  Some(start.overflowing_add_signed(delta).0)
}

// ─── Text ────────────────────────────────────────────────────────────────────

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn normalize_whitespace(s: &str) -> String { s.split_whitespace().collect::<Vec<_>>().join(" ") }

#[cfg(test)]
mod tests {
  use super::*;

  fn hm(h: u32, m: u32) -> NaiveTime { NaiveTime::from_hms_opt(h, m, 0).unwrap() }

  #[test]
  fn numbers_reject_garbage() {
    assert_eq!(parse_number(" -85.25 "), Some(-85.25));
    assert_eq!(parse_number("NaN"), None);
    assert_eq!(parse_number("inf"), None);
    assert_eq!(parse_number("north"), None);
    assert_eq!(parse_int("6.0"), Some(6));
    assert_eq!(parse_int("6.5"), None);
  }

  #[test]
  fn tallies() {
    let markers = vec!["X".to_string()];
    assert_eq!(parse_tally("12", &markers), Some(Tally::Counted(12)));
    assert_eq!(parse_tally("x", &markers), Some(Tally::Present));
    assert_eq!(parse_tally("-1", &markers), None);
    assert_eq!(parse_tally("2.5", &markers), None);
    assert_eq!(parse_tally("", &markers), None);
  }

  #[test]
  fn dates_from_formats_and_parts() {
    let iso = vec!["%Y-%m-%d".to_string()];
    let d = parse_date("2020-06-01", &iso).unwrap();
    assert_eq!(year_and_day(d), (2020, 153));
    assert_eq!(parse_date("06/01/2020", &iso), None);

    let with_time = vec!["%Y-%m-%d".to_string(), "%m/%d/%Y %H:%M:%S".to_string()];
    assert_eq!(parse_date("06/01/2020 07:15:00", &with_time), Some(d));

    assert_eq!(date_from_parts("2020", "6", "1"), Some(d));
    assert_eq!(date_from_parts("2019", "2", "29"), None);
  }

  #[test]
  fn digit_times_are_left_padded() {
    assert_eq!(parse_time("930"), Some(hm(9, 30)));
    assert_eq!(parse_time("0545"), Some(hm(5, 45)));
    assert_eq!(parse_time("5"), Some(hm(0, 5)));
    assert_eq!(parse_time("2460"), None);
  }

  #[test]
  fn clock_and_datetime_times() {
    assert_eq!(parse_time("06:30:59"), Some(hm(6, 30)));
    assert_eq!(parse_time("6:30 PM"), Some(hm(18, 30)));
    assert_eq!(parse_time("2018-05-01 07:05:00"), Some(hm(7, 5)));
    assert_eq!(parse_time("05/01/2018 07:05:00 AM"), Some(hm(7, 5)));
  }

  #[test]
  fn missing_times_stay_absent() {
    assert_eq!(parse_time(""), None);
    assert_eq!(parse_time("   "), None);
    assert_eq!(parse_time("dawn"), None);
  }

  #[test]
  fn durations_wrap_midnight() {
    assert_eq!(add_minutes(hm(6, 30), 75.0), Some(hm(7, 45)));
    assert_eq!(add_minutes(hm(23, 30), 45.0), Some(hm(0, 15)));
    assert_eq!(add_minutes(hm(6, 30), -5.0), None);
  }

  #[test]
  fn whitespace_is_collapsed() {
    assert_eq!(normalize_whitespace("  Setophaga \t petechia "), "Setophaga petechia");
  }
}
