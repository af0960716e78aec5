//! Broadway Dance Center: the whole week's schedule is rendered at once inside an embedded
//! Healcode iframe, behind a page-level promo popup.

use chrono_tz::Tz;

use super::{CrawlError, Navigator, Studio, StudioHandler, healcode};
use crate::driver::Locator;
use crate::types::SessionRecord;

const ZONE: Tz = chrono_tz::America::New_York;

const POPUP_CLOSE: &str = ".pum-close";
const WIDGET_FRAME: &str = "iframe";
const SESSIONS: &str = "div.bw-session";

pub struct BdcHandler<'d> {
    nav: Navigator<'d>,
}

impl<'d> BdcHandler<'d> {
    pub fn new(nav: Navigator<'d>) -> Self {
        Self { nav }
    }
}

fn enter_widget(nav: &mut Navigator) -> Result<(), CrawlError> {
    let timeout = nav.timeouts().overlay;
    nav.dismiss_overlay(&Locator::css(POPUP_CLOSE), timeout);
    nav.switch_to_frame(&Locator::css(WIDGET_FRAME))
}

impl StudioHandler for BdcHandler<'_> {
    fn studio(&self) -> Studio {
        Studio::Bdc
    }

    fn crawl(&mut self) -> Vec<SessionRecord> {
        if let Err(e) = self.nav.visit_page() {
            log::error!("Could not open {}: {}", self.nav.url(), e);
            return Vec::new();
        }

        let cards = match self
            .nav
            .locate_calendar(&Locator::css(SESSIONS), None, enter_widget)
        {
            Ok(cards) => cards,
            Err(e) => {
                log::error!("BDC schedule unavailable: {}", e);
                return Vec::new();
            }
        };

        let sessions = healcode::read_sessions(&mut self.nav, &cards, ZONE, "schedule");
        if let Err(e) = self.nav.switch_to_parent() {
            log::debug!("Could not leave widget frame: {}", e);
        }
        log::info!("BDC: {} of {} session(s) read", sessions.len(), cards.len());
        sessions
    }
}
