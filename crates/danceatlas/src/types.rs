use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_INSTRUCTOR: &str = "unknown";

static RE_NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w]").expect("invalid regex: non word"));

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Session name is empty")]
    EmptyName,
    #[error("Session '{name}' ends at {end} which is not after its start {start}")]
    NonPositiveDuration {
        name: String,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    },
}

/// One scheduled class occurrence, normalized to the studio's civil zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub session_name: String,
    pub instructor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub url: String,
}

impl SessionRecord {
    /// Builds a record, converting both instants into `zone` before checking that the
    /// session has a positive length.
    pub fn new<A: TimeZone, B: TimeZone>(
        zone: Tz,
        start: DateTime<A>,
        end: DateTime<B>,
        session_name: &str,
        url: &str,
    ) -> Result<Self, RecordError> {
        let session_name = normalize_label(session_name);
        if session_name.is_empty() {
            return Err(RecordError::EmptyName);
        }

        let start_time = start.with_timezone(&zone).fixed_offset();
        let end_time = end.with_timezone(&zone).fixed_offset();
        if end_time <= start_time {
            return Err(RecordError::NonPositiveDuration {
                name: session_name,
                start: start_time,
                end: end_time,
            });
        }

        Ok(Self {
            start_time,
            end_time,
            session_name,
            instructor: UNKNOWN_INSTRUCTOR.to_string(),
            location: None,
            level: None,
            url: url.to_string(),
        })
    }

    pub fn with_instructor(mut self, instructor: Option<String>) -> Self {
        self.instructor = instructor
            .map(|s| normalize_label(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_INSTRUCTOR.to_string());
        self
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location.map(|s| normalize_label(&s)).filter(|s| !s.is_empty());
        self
    }

    pub fn with_level(mut self, level: Option<String>) -> Self {
        self.level = level.map(|s| normalize_label(&s)).filter(|s| !s.is_empty());
        self
    }

    /// Civil date of the session start in the studio's zone.
    pub fn date(&self) -> NaiveDate {
        self.start_time.date_naive()
    }

    pub fn composite_key(&self) -> String {
        composite_key(self.date(), &self.session_name)
    }
}

impl Display for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}–{} {} ({})",
            self.date(),
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M"),
            self.session_name,
            self.instructor
        )?;
        if let Some(level) = &self.level {
            write!(f, " [{}]", level)?;
        }
        if let Some(location) = &self.location {
            write!(f, " @ {}", location)?;
        }
        Ok(())
    }
}

/// Document id used for idempotent upserts. Two sessions with the same name on the same
/// day collide.
pub fn composite_key(date: NaiveDate, session_name: &str) -> String {
    format!(
        "{}{}",
        date.format("%Y-%m-%d"),
        RE_NON_WORD.replace_all(session_name, "_")
    )
}

fn normalize_label(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sessions gathered in one run, keyed by studio id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrawlResult {
    studios: BTreeMap<String, Vec<SessionRecord>>,
}

impl CrawlResult {
    pub fn with_studios<I, S>(studios: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            studios: studios
                .into_iter()
                .map(|s| (s.into(), Vec::new()))
                .collect(),
        }
    }

    pub fn append(&mut self, studio: &str, records: Vec<SessionRecord>) {
        self.studios
            .entry(studio.to_string())
            .or_default()
            .extend(records);
    }

    pub fn sessions(&self, studio: &str) -> &[SessionRecord] {
        self.studios.get(studio).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SessionRecord])> {
        self.studios
            .iter()
            .map(|(studio, records)| (studio.as_str(), records.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.studios.values().map(Vec::len).sum()
    }

    pub fn len(&self) -> usize {
        self.studios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.studios.is_empty()
    }
}

impl Display for CrawlResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nSessions per studio:")?;
        for (studio, records) in &self.studios {
            writeln!(f, "  {:<22} {}", studio, records.len())?;
        }
        writeln!(f, "  {:<22} {}", "Total", self.total())
    }
}
