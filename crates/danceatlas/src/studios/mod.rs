pub mod bdc;
pub mod brickhouse;
pub(crate) mod healcode;
pub mod ild_manhattan;
pub mod modega;
pub mod parser;
pub mod peridance;

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::driver::{Driver, DriverError, Element, FrameTarget, Locator};
use crate::types::{RecordError, SessionRecord};
use parser::FieldParseError;

pub use bdc::BdcHandler;
pub use brickhouse::BrickhouseHandler;
pub use ild_manhattan::IldManhattanHandler;
pub use modega::ModegaHandler;
pub use peridance::PeridanceHandler;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("No popup matched '{0}'")]
    PopupNotFound(Locator),
    #[error("No visible element matched '{locator}' within {timeout:?}")]
    ElementNotFound { locator: Locator, timeout: Duration },
    #[error("Element handle went stale")]
    StaleElement,
    #[error("Page was queried before it was visited")]
    NotVisited,
    #[error("Field parse error: {0}")]
    FieldParse(#[from] FieldParseError),
    #[error("Invalid session: {0}")]
    Record(#[from] RecordError),
    #[error("Driver error: {0}")]
    Driver(DriverError),
}

impl From<DriverError> for CrawlError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::StaleElement => CrawlError::StaleElement,
            other => CrawlError::Driver(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown studio '{0}'. Known studios: Peri, Modega, BDC, Brickhouse, ILoveDanceManhattan")]
pub struct StudioParseError(String);

/// Studios with a handler, by the id used in the site configuration and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Studio {
    Peridance,
    Modega,
    Bdc,
    Brickhouse,
    IldManhattan,
}

impl Studio {
    pub const ALL: [Studio; 5] = [
        Studio::Peridance,
        Studio::Modega,
        Studio::Bdc,
        Studio::Brickhouse,
        Studio::IldManhattan,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Studio::Peridance => "Peri",
            Studio::Modega => "Modega",
            Studio::Bdc => "BDC",
            Studio::Brickhouse => "Brickhouse",
            Studio::IldManhattan => "ILoveDanceManhattan",
        }
    }

    /// Civil zone of the studio's physical location.
    pub fn zone(&self) -> Tz {
        chrono_tz::America::New_York
    }

    /// The studio's calendar date at `now`.
    pub fn date_at(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.zone()).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.date_at(Utc::now())
    }

    /// Builds this studio's handler around a navigator that borrows the shared session.
    pub fn handler<'d>(
        &self,
        nav: Navigator<'d>,
        today: NaiveDate,
    ) -> Box<dyn StudioHandler + 'd> {
        match self {
            Studio::Peridance => Box::new(PeridanceHandler::new(nav)),
            Studio::Modega => Box::new(ModegaHandler::new(nav, today)),
            Studio::Bdc => Box::new(BdcHandler::new(nav)),
            Studio::Brickhouse => Box::new(BrickhouseHandler::new(nav)),
            Studio::IldManhattan => Box::new(IldManhattanHandler::new(nav)),
        }
    }
}

impl FromStr for Studio {
    type Err = StudioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Studio::ALL
            .into_iter()
            .find(|studio| studio.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StudioParseError(s.to_string()))
    }
}

impl Display for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Studio::Peridance => write!(f, "Peridance"),
            Studio::Modega => write!(f, "Modega"),
            Studio::Bdc => write!(f, "Broadway Dance Center"),
            Studio::Brickhouse => write!(f, "Brickhouse"),
            Studio::IldManhattan => write!(f, "I Love Dance Manhattan"),
        }
    }
}

/// Per-site extraction unit. `crawl` never fails: whatever could be extracted is returned.
pub trait StudioHandler {
    fn studio(&self) -> Studio;

    fn crawl(&mut self) -> Vec<SessionRecord>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub wait: Duration,
    pub overlay: Duration,
    pub poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(20),
            overlay: Duration::from_secs(10),
            poll: Duration::from_millis(250),
        }
    }
}

/// Navigation helpers shared by every handler. Holds a mutable borrow of the session for
/// the lifetime of one handler.
pub struct Navigator<'d> {
    driver: &'d mut dyn Driver,
    url: String,
    timeouts: Timeouts,
    visited: bool,
}

impl<'d> Navigator<'d> {
    pub fn new(driver: &'d mut dyn Driver, url: &str, timeouts: Timeouts) -> Self {
        Self {
            driver,
            url: url.to_string(),
            timeouts,
            visited: false,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn visit_page(&mut self) -> Result<(), CrawlError> {
        if self.visited {
            log::warn!("{} already visited, not navigating again", self.url);
            return Ok(());
        }
        self.driver.navigate(&self.url)?;
        self.visited = true;
        Ok(())
    }

    fn ensure_visited(&self) -> Result<(), CrawlError> {
        if self.visited {
            Ok(())
        } else {
            Err(CrawlError::NotVisited)
        }
    }

    pub fn wait_for_visible(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Vec<Element>, CrawlError> {
        self.ensure_visited()?;
        let found = self
            .driver
            .query_visible(locator, timeout, self.timeouts.poll)?;
        if found.is_empty() {
            return Err(CrawlError::ElementNotFound {
                locator: locator.clone(),
                timeout,
            });
        }
        Ok(found)
    }

    pub fn wait_for_present(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Vec<Element>, CrawlError> {
        self.ensure_visited()?;
        let found = self
            .driver
            .query_present(locator, timeout, self.timeouts.poll)?;
        if found.is_empty() {
            return Err(CrawlError::ElementNotFound {
                locator: locator.clone(),
                timeout,
            });
        }
        Ok(found)
    }

    /// Closes a popup rendered at page level. A missing popup is a normal outcome.
    pub fn dismiss_overlay(&mut self, locator: &Locator, timeout: Duration) -> bool {
        match self.try_dismiss(locator, timeout) {
            Ok(()) => {
                log::info!("Popup '{}' closed", locator);
                true
            }
            Err(CrawlError::PopupNotFound(_)) => {
                log::debug!("Popup '{}' did not appear", locator);
                false
            }
            Err(e) => {
                log::warn!("Failed to close popup '{}': {}", locator, e);
                false
            }
        }
    }

    fn try_dismiss(&mut self, locator: &Locator, timeout: Duration) -> Result<(), CrawlError> {
        self.switch_to_parent()?;
        let buttons = match self.wait_for_visible(locator, timeout) {
            Ok(buttons) => buttons,
            Err(CrawlError::ElementNotFound { .. }) => {
                return Err(CrawlError::PopupNotFound(locator.clone()));
            }
            Err(e) => return Err(e),
        };
        self.driver.click(&buttons[0])?;
        Ok(())
    }

    /// Waits for the calendar root. On failure the overlay is dismissed and the wait is
    /// retried once; a second failure is returned to the caller. `prepare` runs before each
    /// attempt (e.g. to enter the widget's iframe).
    pub fn locate_calendar<F>(
        &mut self,
        root: &Locator,
        overlay: Option<&Locator>,
        mut prepare: F,
    ) -> Result<Vec<Element>, CrawlError>
    where
        F: FnMut(&mut Self) -> Result<(), CrawlError>,
    {
        let timeout = self.timeouts.wait;
        let first = prepare(&mut *self).and_then(|_| self.wait_for_visible(root, timeout));
        match first {
            Ok(found) => Ok(found),
            Err(e) => {
                log::warn!("Calendar '{}' not found on {}: {}, retrying", root, self.url, e);
                if let Some(overlay) = overlay {
                    self.dismiss_overlay(overlay, self.timeouts.overlay);
                }
                prepare(&mut *self)?;
                self.wait_for_visible(root, timeout)
            }
        }
    }

    /// Clicks the `index`-th element matching `locator`, re-resolving the list from the live
    /// DOM first and once more if the handle goes stale. Returns how many elements matched
    /// before the click.
    pub fn click_fresh(&mut self, locator: &Locator, index: usize) -> Result<usize, CrawlError> {
        let timeout = self.timeouts.wait;
        let mut attempts = 0;
        loop {
            let live = self.wait_for_visible(locator, timeout)?;
            let Some(target) = live.get(index) else {
                return Err(CrawlError::ElementNotFound {
                    locator: locator.clone(),
                    timeout,
                });
            };
            match self.driver.click(target) {
                Ok(()) => return Ok(live.len()),
                Err(DriverError::StaleElement) if attempts == 0 => {
                    log::debug!("Element {} of '{}' went stale, re-acquiring", index, locator);
                    attempts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn switch_to_frame(&mut self, locator: &Locator) -> Result<(), CrawlError> {
        let timeout = self.timeouts.wait;
        let frames = self.wait_for_present(locator, timeout)?;
        self.driver
            .switch_frame(FrameTarget::Element(frames[0].clone()))?;
        Ok(())
    }

    pub fn switch_to_parent(&mut self) -> Result<(), CrawlError> {
        Ok(self.driver.switch_frame(FrameTarget::Parent)?)
    }

    pub fn current_url(&mut self) -> String {
        self.driver
            .current_url()
            .inspect_err(|e| log::warn!("Could not read current URL: {}", e))
            .unwrap_or_else(|_| self.url.clone())
    }

    pub fn find_in(
        &mut self,
        parent: &Element,
        locator: &Locator,
    ) -> Result<Vec<Element>, CrawlError> {
        Ok(self.driver.find_within(parent, locator)?)
    }

    pub fn attribute(
        &mut self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, CrawlError> {
        Ok(self.driver.attribute(element, name)?)
    }

    pub fn text(&mut self, element: &Element) -> Result<String, CrawlError> {
        Ok(self.driver.text(element)?.trim().to_string())
    }

    /// Text of the first descendant matching `locator`.
    pub fn text_in(&mut self, parent: &Element, locator: &Locator) -> Result<String, CrawlError> {
        let found = self.find_in(parent, locator)?;
        let first = found
            .first()
            .ok_or_else(|| FieldParseError::MissingField(locator.to_string()))?;
        self.text(first)
    }

    /// Text of every descendant matching `locator`.
    pub fn texts_in(
        &mut self,
        parent: &Element,
        locator: &Locator,
    ) -> Result<Vec<String>, CrawlError> {
        let found = self.find_in(parent, locator)?;
        found.iter().map(|e| self.text(e)).collect()
    }

    /// Attribute `name` of the first descendant matching `locator`.
    pub fn attr_in(
        &mut self,
        parent: &Element,
        locator: &Locator,
        name: &str,
    ) -> Result<String, CrawlError> {
        let found = self.find_in(parent, locator)?;
        let first = found
            .first()
            .ok_or_else(|| FieldParseError::MissingField(locator.to_string()))?;
        self.attribute(first, name)?
            .ok_or_else(|| FieldParseError::MissingField(format!("{}[{}]", locator, name)).into())
    }

    /// Like [`Navigator::text_in`] but a failure becomes `None`.
    pub fn optional_text_in(&mut self, parent: &Element, locator: &Locator) -> Option<String> {
        self.text_in(parent, locator)
            .inspect_err(|e| log::debug!("Optional field '{}' unavailable: {}", locator, e))
            .ok()
            .filter(|s| !s.is_empty())
    }
}
