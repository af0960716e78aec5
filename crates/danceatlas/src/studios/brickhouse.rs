//! Brickhouse: the Healcode week view is rendered directly in the page, one column per day.

use chrono_tz::Tz;

use super::{Navigator, Studio, StudioHandler, healcode};
use crate::driver::Locator;
use crate::types::SessionRecord;

const ZONE: Tz = chrono_tz::America::New_York;

const DAYS: &str = "div.bw-widget__day";
const SESSIONS: &str = "div.bw-session";

pub struct BrickhouseHandler<'d> {
    nav: Navigator<'d>,
}

impl<'d> BrickhouseHandler<'d> {
    pub fn new(nav: Navigator<'d>) -> Self {
        Self { nav }
    }
}

impl StudioHandler for BrickhouseHandler<'_> {
    fn studio(&self) -> Studio {
        Studio::Brickhouse
    }

    fn crawl(&mut self) -> Vec<SessionRecord> {
        let mut sessions = Vec::new();
        if let Err(e) = self.nav.visit_page() {
            log::error!("Could not open {}: {}", self.nav.url(), e);
            return sessions;
        }

        let days = match self.nav.locate_calendar(&Locator::css(DAYS), None, |_| Ok(())) {
            Ok(days) => days,
            Err(e) => {
                log::error!("Brickhouse schedule unavailable: {}", e);
                return sessions;
            }
        };

        let cards = Locator::css(SESSIONS);
        for (index, day) in days.iter().enumerate() {
            match self.nav.find_in(day, &cards) {
                Ok(found) if found.is_empty() => log::info!("No classes found on day {}", index),
                Ok(found) => sessions.extend(healcode::read_sessions(
                    &mut self.nav,
                    &found,
                    ZONE,
                    &format!("day {}", index),
                )),
                Err(e) => log::warn!("Errored parsing day {}: {}", index, e),
            }
        }

        log::info!("Brickhouse: {} session(s)", sessions.len());
        sessions
    }
}
