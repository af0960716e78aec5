//! Peridance: a Wix page that shows a sign-up lightbox shortly after load and embeds the
//! Healcode monthly calendar in an iframe. Clicking a day re-renders the widget with that
//! day's classes only.

use chrono_tz::Tz;

use super::{CrawlError, Navigator, Studio, StudioHandler, healcode};
use crate::driver::Locator;
use crate::types::SessionRecord;

const ZONE: Tz = chrono_tz::America::New_York;

const POPUP_CLOSE: &str = "div.wixui-lightbox__close-button";
const WIDGET_FRAME: &str = "iframe";
const DAY_CELLS: &str = "td.bw-calendar__day:not(.bw-calendar__day--past)";
const SESSIONS: &str = "div.bw-session";

pub struct PeridanceHandler<'d> {
    nav: Navigator<'d>,
}

impl<'d> PeridanceHandler<'d> {
    pub fn new(nav: Navigator<'d>) -> Self {
        Self { nav }
    }

    fn crawl_day(&mut self, index: usize) -> Result<Vec<SessionRecord>, CrawlError> {
        let cells = Locator::css(DAY_CELLS);
        if let Err(e) = self.nav.click_fresh(&cells, index) {
            log::warn!("Clicking day {} failed: {}, recovering", index, e);
            enter_widget(&mut self.nav)?;
            self.nav.click_fresh(&cells, index)?;
        }

        let timeout = self.nav.timeouts().wait;
        let sessions = match self.nav.wait_for_visible(&Locator::css(SESSIONS), timeout) {
            Ok(sessions) => sessions,
            Err(CrawlError::ElementNotFound { .. }) => {
                log::info!("No classes found on day {}", index);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        Ok(healcode::read_sessions(
            &mut self.nav,
            &sessions,
            ZONE,
            &format!("day {}", index),
        ))
    }
}

/// Closes the lightbox if it is up, then enters the widget iframe.
fn enter_widget(nav: &mut Navigator) -> Result<(), CrawlError> {
    let timeout = nav.timeouts().overlay;
    nav.dismiss_overlay(&Locator::css(POPUP_CLOSE), timeout);
    nav.switch_to_frame(&Locator::css(WIDGET_FRAME))
}

impl StudioHandler for PeridanceHandler<'_> {
    fn studio(&self) -> Studio {
        Studio::Peridance
    }

    fn crawl(&mut self) -> Vec<SessionRecord> {
        let mut sessions = Vec::new();
        if let Err(e) = self.nav.visit_page() {
            log::error!("Could not open {}: {}", self.nav.url(), e);
            return sessions;
        }

        let days = match self
            .nav
            .locate_calendar(&Locator::css(DAY_CELLS), None, enter_widget)
        {
            Ok(days) => days.len(),
            Err(e) => {
                log::error!("Peridance calendar unavailable: {}", e);
                return sessions;
            }
        };
        log::info!("Peridance: {} upcoming day(s) in calendar", days);

        for index in 0..days {
            match self.crawl_day(index) {
                Ok(found) => sessions.extend(found),
                Err(e) => log::warn!("Errored parsing day {}: {}", index, e),
            }
        }

        if let Err(e) = self.nav.switch_to_parent() {
            log::debug!("Could not leave widget frame: {}", e);
        }
        log::info!("Peridance: {} session(s)", sessions.len());
        sessions
    }
}
