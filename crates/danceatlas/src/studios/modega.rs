//! Modega: a week strip of day buttons; picking a day swaps in that day's class cards. Cards
//! print the start as `7:00 PM PDT (60 min)` and carry no end time.

use chrono::{Days, NaiveDate, TimeDelta};
use chrono_tz::Tz;

use super::parser::{FieldParseError, parse_clock_on_date, parse_duration, parse_iso_date};
use super::{CrawlError, Navigator, Studio, StudioHandler};
use crate::driver::{Element, Locator};
use crate::types::SessionRecord;

const ZONE: Tz = chrono_tz::America::New_York;

const DAY_CELLS: &str = ".week-range__day.d-flex.flex-column:not(.week-range--disabled)";
const SESSIONS: &str = "div.card-body.p-1";
const DATE_TIME: &str = "p.dateTimeText.card-text";
const TITLE: &str = ".card-title";
const CARD_TEXT: &str = "p.card-text";

const DEFAULT_DURATION_MINUTES: i64 = 60;

pub struct ModegaHandler<'d> {
    nav: Navigator<'d>,
    today: NaiveDate,
}

impl<'d> ModegaHandler<'d> {
    /// `today` is the studio-local date of the first enabled day, used when a day button
    /// does not carry its own date.
    pub fn new(nav: Navigator<'d>, today: NaiveDate) -> Self {
        Self { nav, today }
    }

    /// Reads the date of the `index`-th day button. Must run before the click since the
    /// strip re-renders afterwards.
    fn day_date(&mut self, cells: &Locator, index: usize) -> NaiveDate {
        let fallback = self.today + Days::new(index as u64);
        let timeout = self.nav.timeouts().wait;
        let Ok(live) = self.nav.wait_for_visible(cells, timeout) else {
            return fallback;
        };

        live.get(index)
            .and_then(|cell| self.nav.attribute(cell, "data-date").ok().flatten())
            .and_then(|value| {
                parse_iso_date(&value)
                    .inspect_err(|e| log::debug!("Ignoring day {} date: {}", index, e))
                    .ok()
            })
            .unwrap_or(fallback)
    }

    fn crawl_day(&mut self, index: usize) -> Result<Vec<SessionRecord>, CrawlError> {
        let cells = Locator::css(DAY_CELLS);
        let date = self.day_date(&cells, index);
        self.nav.click_fresh(&cells, index)?;
        log::debug!("Modega: day {} ({}) selected", index, date);

        let timeout = self.nav.timeouts().wait;
        let sessions = match self.nav.wait_for_visible(&Locator::css(SESSIONS), timeout) {
            Ok(sessions) => sessions,
            Err(CrawlError::ElementNotFound { .. }) => {
                log::info!("No classes found on day {} ({})", index, date);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut records = Vec::with_capacity(sessions.len());
        for (i, session) in sessions.iter().enumerate() {
            match self.read_session(session, date) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping session {} of {}: {}", i, date, e),
            }
        }
        Ok(records)
    }

    fn read_session(
        &mut self,
        session: &Element,
        date: NaiveDate,
    ) -> Result<SessionRecord, CrawlError> {
        let clock = self.nav.text_in(session, &Locator::css(DATE_TIME))?;
        let start = parse_clock_on_date(&clock, date, ZONE)?;
        let duration = parse_duration(&clock)?.unwrap_or_else(|| {
            log::info!(
                "No duration in '{}', assuming {} minutes",
                clock,
                DEFAULT_DURATION_MINUTES
            );
            TimeDelta::minutes(DEFAULT_DURATION_MINUTES)
        });
        let end = start.checked_add_signed(duration).ok_or_else(|| {
            FieldParseError::Time(format!("End of '{}' is out of range", clock))
        })?;
        let name = self.nav.text_in(session, &Locator::css(TITLE))?;
        let url = self.nav.current_url();

        // the first card-text paragraph is the clock line
        let misc = self.nav.texts_in(session, &Locator::css(CARD_TEXT))?;
        let instructor = misc.get(1).cloned();
        let location = misc.get(2).cloned();

        Ok(SessionRecord::new(ZONE, start, end, &name, &url)?
            .with_instructor(instructor)
            .with_location(location))
    }
}

impl StudioHandler for ModegaHandler<'_> {
    fn studio(&self) -> Studio {
        Studio::Modega
    }

    fn crawl(&mut self) -> Vec<SessionRecord> {
        let mut sessions = Vec::new();
        if let Err(e) = self.nav.visit_page() {
            log::error!("Could not open {}: {}", self.nav.url(), e);
            return sessions;
        }

        let days = match self
            .nav
            .locate_calendar(&Locator::css(DAY_CELLS), None, |_| Ok(()))
        {
            Ok(days) => days.len(),
            Err(e) => {
                log::error!("Modega calendar unavailable: {}", e);
                return sessions;
            }
        };
        log::info!("Modega: {} bookable day(s) starting {}", days, self.today);

        for index in 0..days {
            match self.crawl_day(index) {
                Ok(found) => sessions.extend(found),
                Err(e) => log::warn!("Errored parsing day {}: {}", index, e),
            }
        }

        log::info!("Modega: {} session(s)", sessions.len());
        sessions
    }
}
