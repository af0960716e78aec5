//! Read side used by the weekly digest: loads stored sessions from a start date onwards and
//! narrows them down per subscriber preference.

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::persistence::CLASSES_COLLECTION;
use crate::store::{DocumentStore, StoreError};
use crate::studios::Studio;
use crate::studios::parser::parse_iso_date;
use crate::types::SessionRecord;

/// Stored sessions grouped studio → date, each day ordered by start time.
#[derive(Debug, Default, Clone)]
pub struct UpcomingClasses {
    studios: BTreeMap<String, BTreeMap<NaiveDate, Vec<SessionRecord>>>,
}

impl UpcomingClasses {
    /// Loads every date collection on or after `start` for each of `studios`. Documents that
    /// do not decode as sessions are logged and skipped.
    pub fn load(
        store: &dyn DocumentStore,
        studios: &[&str],
        start: NaiveDate,
    ) -> Result<Self, StoreError> {
        let mut upcoming = Self::default();
        for &studio in studios {
            let zone = studio.parse::<Studio>().ok().map(|s| s.zone());
            let dates = upcoming.studios.entry(studio.to_string()).or_default();

            for date_id in store.collection_ids(&[CLASSES_COLLECTION, studio])? {
                let date = match parse_iso_date(&date_id) {
                    Ok(date) => date,
                    Err(e) => {
                        log::debug!("{}: ignoring collection {}: {}", studio, date_id, e);
                        continue;
                    }
                };
                if date < start {
                    continue;
                }

                let path = [CLASSES_COLLECTION, studio, date_id.as_str()];
                let mut sessions = Vec::new();
                for (id, document) in store.documents(&path)? {
                    match serde_json::from_value::<SessionRecord>(document) {
                        Ok(mut record) => {
                            // the store hands instants back in UTC
                            if let Some(zone) = zone {
                                record.start_time =
                                    record.start_time.with_timezone(&zone).fixed_offset();
                                record.end_time =
                                    record.end_time.with_timezone(&zone).fixed_offset();
                            }
                            sessions.push(record);
                        }
                        Err(e) => {
                            log::warn!("{}/{}/{} is not a session: {}", studio, date_id, id, e)
                        }
                    }
                }
                sessions.sort_by_key(|s| s.start_time);
                dates.insert(date, sessions);
            }
            log::info!("{}: {} upcoming day(s) loaded", studio, dates.len());
        }
        Ok(upcoming)
    }

    pub fn dates(&self, studio: &str) -> Option<&BTreeMap<NaiveDate, Vec<SessionRecord>>> {
        self.studios.get(studio)
    }

    /// Every session, studio by studio, in date order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SessionRecord)> {
        self.studios.iter().flat_map(|(studio, dates)| {
            dates
                .values()
                .flatten()
                .map(move |record| (studio.as_str(), record))
        })
    }

    pub fn total(&self) -> usize {
        self.studios.values().flat_map(BTreeMap::values).map(Vec::len).sum()
    }
}

#[derive(Debug, Default)]
pub struct ClassFilter {
    pub end_date: Option<NaiveDate>,
    pub studios: Vec<String>,
    pub weekdays: Vec<Weekday>,
    pub instructor: Option<String>,
    pub limit: Option<usize>,
}

impl ClassFilter {
    pub fn validate(self) -> Result<Self, String> {
        if self.limit.is_some_and(|l| l == 0) {
            return Err("Limit must be greater than 0".to_string());
        }
        if self.instructor.as_ref().is_some_and(|i| i.trim().is_empty()) {
            return Err("Instructor must not be blank".to_string());
        }
        Ok(self)
    }

    pub fn matches(&self, studio: &str, record: &SessionRecord) -> bool {
        if let Some(end) = self.end_date
            && record.date() > end
        {
            return false;
        }
        if !self.studios.is_empty() && !self.studios.iter().any(|s| s.eq_ignore_ascii_case(studio))
        {
            return false;
        }
        if !self.weekdays.is_empty() && !self.weekdays.contains(&record.date().weekday()) {
            return false;
        }
        if let Some(instructor) = &self.instructor
            && !record
                .instructor
                .to_lowercase()
                .contains(&instructor.trim().to_lowercase())
        {
            return false;
        }
        true
    }

    /// Matching sessions across studios, earliest first. `limit` keeps the earliest ones.
    pub fn apply<'a>(&self, upcoming: &'a UpcomingClasses) -> Vec<(&'a str, &'a SessionRecord)> {
        let mut matched: Vec<_> = upcoming
            .iter()
            .filter(|(studio, record)| self.matches(studio, record))
            .collect();
        matched.sort_by(|a, b| a.1.start_time.cmp(&b.1.start_time));
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

#[derive(Debug)]
pub struct DigestStats {
    pub per_studio: BTreeMap<String, usize>,
    pub instructors: usize,
    pub total: usize,
}

impl DigestStats {
    pub fn from_matches(matches: &[(&str, &SessionRecord)]) -> DigestStats {
        let mut per_studio = BTreeMap::new();
        let mut instructors: Vec<&str> = Vec::new();
        for (studio, record) in matches {
            *per_studio.entry(studio.to_string()).or_insert(0) += 1;
            instructors.push(&record.instructor);
        }
        instructors.sort_unstable();
        instructors.dedup();

        DigestStats {
            per_studio,
            instructors: instructors.len(),
            total: matches.len(),
        }
    }
}

impl Display for DigestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nStatistics:")?;
        for (studio, count) in &self.per_studio {
            writeln!(f, "  {:<22} {}", studio, count)?;
        }
        writeln!(f, "  {:<22} {}", "Instructors", self.instructors)?;
        writeln!(f, "  {:<22} {}", "Total", self.total)
    }
}
