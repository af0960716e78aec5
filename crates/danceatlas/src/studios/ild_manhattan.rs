//! I Love Dance Manhattan: a Squarespace page with the Healcode schedule inline. A newsletter
//! popup covers the schedule until it is closed.

use chrono_tz::Tz;

use super::{Navigator, Studio, StudioHandler, healcode};
use crate::driver::Locator;
use crate::types::SessionRecord;

const ZONE: Tz = chrono_tz::America::New_York;

const POPUP_CLOSE: &str = "a.sqs-popup-overlay-close";
const SESSIONS: &str = "div.bw-session";

pub struct IldManhattanHandler<'d> {
    nav: Navigator<'d>,
}

impl<'d> IldManhattanHandler<'d> {
    pub fn new(nav: Navigator<'d>) -> Self {
        Self { nav }
    }
}

impl StudioHandler for IldManhattanHandler<'_> {
    fn studio(&self) -> Studio {
        Studio::IldManhattan
    }

    fn crawl(&mut self) -> Vec<SessionRecord> {
        if let Err(e) = self.nav.visit_page() {
            log::error!("Could not open {}: {}", self.nav.url(), e);
            return Vec::new();
        }

        let popup = Locator::css(POPUP_CLOSE);
        let cards = match self
            .nav
            .locate_calendar(&Locator::css(SESSIONS), Some(&popup), |_| Ok(()))
        {
            Ok(cards) => cards,
            Err(e) => {
                log::error!("ILoveDanceManhattan schedule unavailable: {}", e);
                return Vec::new();
            }
        };

        let sessions = healcode::read_sessions(&mut self.nav, &cards, ZONE, "schedule");
        log::info!("ILoveDanceManhattan: {} session(s)", sessions.len());
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fixture::{FixtureDriver, FixturePage};
    use crate::studios::healcode::tests::session_card;
    use crate::studios::tests::fast_timeouts;

    const URL: &str = "https://ilovedancemanhattan.test/classes";

    fn schedule(hidden: bool) -> String {
        format!(
            r#"<div class="bw-widget"{}>{}{}</div>"#,
            if hidden { " hidden" } else { "" },
            session_card("2024-06-02T12:00", "2024-06-02T13:00", "Salsa On1", "Rosa"),
            session_card("2024-06-02T13:00", "2024-06-02T14:00", "Bachata", ""),
        )
    }

    fn crawl(driver: &mut FixtureDriver) -> Vec<SessionRecord> {
        let nav = Navigator::new(driver, URL, fast_timeouts());
        IldManhattanHandler::new(nav).crawl()
    }

    #[test]
    fn test_crawl_after_closing_popup() {
        let with_popup = format!(
            r#"<div class="sqs-popup-overlay">
                <a class="sqs-popup-overlay-close" data-goto="1">Close</a>
            </div>{}"#,
            schedule(true)
        );
        let page = FixturePage::new([with_popup, schedule(false)]);
        let mut driver = FixtureDriver::new().with_page(URL, page);
        let sessions = crawl(&mut driver);

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_name, "Salsa On1");
        assert_eq!(sessions[1].instructor, crate::types::UNKNOWN_INSTRUCTOR);
        assert!(sessions.iter().all(|s| s.url == URL));
        assert_eq!(driver.clicked(), ["Close"]);
    }

    #[test]
    fn test_crawl_without_popup() {
        let mut driver =
            FixtureDriver::new().with_page(URL, FixturePage::new([schedule(false)]));
        let sessions = crawl(&mut driver);

        assert_eq!(sessions.len(), 2);
        assert!(driver.clicked().is_empty());
    }

    #[test]
    fn test_schedule_never_shown_returns_empty() {
        let mut driver = FixtureDriver::new().with_page(URL, FixturePage::new([schedule(true)]));
        assert!(crawl(&mut driver).is_empty());
    }
}
