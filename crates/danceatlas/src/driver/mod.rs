pub mod webdriver;

#[cfg(test)]
pub(crate) mod fixture;

use std::fmt::Display;
use std::thread;
use std::time::{Duration, Instant};

pub use webdriver::{BrowserProfile, WebDriverSession};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Element handle is stale")]
    StaleElement,
    #[error("No such element: {0}")]
    NoSuchElement(String),
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),
    #[error("WebDriver request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebDriver error '{error}': {message}")]
    Protocol { error: String, message: String },
    #[error("Unexpected WebDriver response: {0}")]
    UnexpectedResponse(String),
}

/// CSS selector used to find elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(String);

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to an element in the live DOM. It can go stale whenever the page mutates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Element(pub(crate) String);

impl Element {
    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameTarget {
    Element(Element),
    Parent,
}

/// The browser automation session. All waits built on top of it are bounded.
pub trait Driver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    fn current_url(&mut self) -> Result<String, DriverError>;

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<Element>, DriverError>;

    fn find_within(
        &mut self,
        parent: &Element,
        locator: &Locator,
    ) -> Result<Vec<Element>, DriverError>;

    fn is_displayed(&mut self, element: &Element) -> Result<bool, DriverError>;

    fn text(&mut self, element: &Element) -> Result<String, DriverError>;

    fn attribute(&mut self, element: &Element, name: &str) -> Result<Option<String>, DriverError>;

    fn click(&mut self, element: &Element) -> Result<(), DriverError>;

    fn switch_frame(&mut self, target: FrameTarget) -> Result<(), DriverError>;

    /// Polls until at least one element matching `locator` is displayed, returning the
    /// displayed ones. Returns `Ok(vec![])` on timeout.
    fn query_visible(
        &mut self,
        locator: &Locator,
        timeout: Duration,
        poll: Duration,
    ) -> Result<Vec<Element>, DriverError> {
        poll_until(timeout, poll, || {
            let mut visible = Vec::new();
            for element in self.find_all(locator)? {
                if self.is_displayed(&element)? {
                    visible.push(element);
                }
            }
            Ok(visible)
        })
    }

    /// Polls until at least one element matching `locator` is attached to the DOM.
    fn query_present(
        &mut self,
        locator: &Locator,
        timeout: Duration,
        poll: Duration,
    ) -> Result<Vec<Element>, DriverError> {
        poll_until(timeout, poll, || self.find_all(locator))
    }
}

fn poll_until<F>(
    timeout: Duration,
    poll: Duration,
    mut probe: F,
) -> Result<Vec<Element>, DriverError>
where
    F: FnMut() -> Result<Vec<Element>, DriverError>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match probe() {
            Ok(found) if !found.is_empty() => return Ok(found),
            Ok(_) | Err(DriverError::StaleElement) | Err(DriverError::NoSuchElement(_)) => {}
            Err(e) => return Err(e),
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(Vec::new());
        }
        thread::sleep(poll.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::{FixtureDriver, FixturePage};
    use super::*;

    const PAGE: &str = r#"
        <div class="calendar">
            <span class="day">Mon</span>
            <span class="day" hidden>Tue</span>
            <div hidden><span class="day">Wed</span></div>
        </div>
    "#;

    fn driver() -> FixtureDriver {
        let mut driver = FixtureDriver::new();
        driver.add_page("https://studio.test/", FixturePage::new([PAGE]));
        driver.navigate("https://studio.test/").unwrap();
        driver
    }

    #[test]
    fn test_query_visible_skips_hidden_elements() {
        let mut driver = driver();
        let days = Locator::css("span.day");

        let present = driver
            .query_present(&days, Duration::from_millis(5), Duration::from_millis(1))
            .unwrap();
        let visible = driver
            .query_visible(&days, Duration::from_millis(5), Duration::from_millis(1))
            .unwrap();

        assert_eq!(present.len(), 3);
        assert_eq!(visible.len(), 1);
        assert_eq!(driver.text(&visible[0]).unwrap(), "Mon");
    }

    #[test]
    fn test_query_visible_times_out_with_empty_list() {
        let mut driver = driver();
        let started = Instant::now();
        let found = driver
            .query_visible(
                &Locator::css("div.missing"),
                Duration::from_millis(30),
                Duration::from_millis(5),
            )
            .unwrap();

        assert!(found.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
