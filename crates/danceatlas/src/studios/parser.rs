use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use chrono_tz::Tz;
use regex::Regex;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FieldParseError {
    #[error("Failed to parse time: {0}")]
    Time(String),
    #[error("Failed to parse date: {0}")]
    Date(String),
    #[error("Unknown time zone label: {0}")]
    Zone(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

static RE_CLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\.?(?:\s+((?-i:[A-Z]{1,3}T))\b)?")
        .expect("invalid regex: clock")
});
static RE_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\((\d+)\s*min(?:ute)?s?\)").expect("invalid regex: duration")
});

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

/// Civil zone behind a US zone abbreviation as printed by booking widgets.
pub fn zone_for_abbreviation(label: &str) -> Option<Tz> {
    match label.to_uppercase().as_str() {
        "EST" | "EDT" | "ET" => Some(chrono_tz::America::New_York),
        "CST" | "CDT" | "CT" => Some(chrono_tz::America::Chicago),
        "MST" | "MDT" | "MT" => Some(chrono_tz::America::Denver),
        "PST" | "PDT" | "PT" => Some(chrono_tz::America::Los_Angeles),
        "UTC" | "GMT" => Some(chrono_tz::UTC),
        _ => None,
    }
}

/// Attaches `zone` to a wall-clock time. Ambiguous times take the earlier instant; times
/// skipped by a DST jump are moved forward by an hour.
pub fn localize(zone: Tz, naive: NaiveDateTime) -> Result<DateTime<Tz>, FieldParseError> {
    zone.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            zone.from_local_datetime(&(naive + TimeDelta::hours(1)))
                .earliest()
        })
        .ok_or_else(|| FieldParseError::Time(format!("{naive} does not exist in {zone}")))
}

/// Parses an ISO-8601 timestamp from a `datetime` attribute. Offset-bearing values are
/// converted into `zone`; naive values are read as `zone` wall-clock time.
pub fn parse_iso_datetime(value: &str, zone: Tz) -> Result<DateTime<Tz>, FieldParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(FieldParseError::MissingField("datetime".to_string()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&zone));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Ok(dt.with_timezone(&zone));
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .ok_or_else(|| FieldParseError::Time(format!("Invalid timestamp: {}", value)))?;
    localize(zone, naive)
}

pub fn parse_iso_date(value: &str) -> Result<NaiveDate, FieldParseError> {
    let value = value.trim();
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| FieldParseError::Date(format!("Invalid date: {}", value)))
}

fn to_24h(hour: u32, meridiem: &str) -> Result<u32, FieldParseError> {
    if hour == 0 || hour > 12 {
        return Err(FieldParseError::Time(format!("Invalid hour: {}", hour)));
    }
    match meridiem.to_lowercase().as_str() {
        "a" => Ok(if hour == 12 { 0 } else { hour }),
        "p" => Ok(if hour == 12 { 12 } else { hour + 12 }),
        _ => Err(FieldParseError::Time(format!("Invalid AM/PM: {}", meridiem))),
    }
}

/// Finds the first 12-hour clock time in `text`, with its zone label if one follows.
pub fn parse_clock(text: &str) -> Result<(NaiveTime, Option<String>), FieldParseError> {
    let caps = RE_CLOCK
        .captures(text)
        .ok_or_else(|| FieldParseError::Time(format!("No clock time in: {}", text)))?;

    let hour: u32 = caps[1]
        .parse()
        .map_err(|_| FieldParseError::Time(format!("Invalid hour: {}", &caps[1])))?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| FieldParseError::Time(format!("Invalid minute: {}", m.as_str())))?,
        None => 0,
    };
    let hour_24 = to_24h(hour, &caps[3])?;
    let time = NaiveTime::from_hms_opt(hour_24, minute, 0)
        .ok_or_else(|| FieldParseError::Time(format!("Invalid time: {}:{}", hour_24, minute)))?;

    Ok((time, caps.get(4).map(|m| m.as_str().to_uppercase())))
}

/// Reads a clock time shown for `date` and returns it in the studio's `zone`. When the
/// widget labels the time with another zone, the time is read in that zone first.
pub fn parse_clock_on_date(
    text: &str,
    date: NaiveDate,
    zone: Tz,
) -> Result<DateTime<Tz>, FieldParseError> {
    let (time, label) = parse_clock(text)?;
    let shown_in = match label {
        Some(label) => zone_for_abbreviation(&label).ok_or(FieldParseError::Zone(label))?,
        None => zone,
    };
    Ok(localize(shown_in, date.and_time(time))?.with_timezone(&zone))
}

/// Extracts a "(60 min)" style duration. `None` when no positive duration is printed; a
/// duration too large to represent is an error.
pub fn parse_duration(text: &str) -> Result<Option<TimeDelta>, FieldParseError> {
    let Some(caps) = RE_DURATION.captures(text) else {
        return Ok(None);
    };
    let invalid = || FieldParseError::Time(format!("Invalid duration: {}", &caps[0]));
    let minutes: i64 = caps[1].parse().map_err(|_| invalid())?;
    if minutes == 0 {
        return Ok(None);
    }
    TimeDelta::try_minutes(minutes).map(Some).ok_or_else(invalid)
}
