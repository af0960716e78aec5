//! In-memory DOM driver for handler tests.
//!
//! A page is a list of HTML snapshots. Clicking an element carrying `data-goto="N"` (or
//! nested inside one) swaps the active context to snapshot `N` and invalidates every
//! handle issued so far, like a widget re-rendering its subtree. `<iframe data-frame="x">`
//! elements can be entered with [`Driver::switch_frame`] when the page registers a frame
//! named `x`. Elements with a `hidden` attribute or `display:none` style (on themselves or
//! an ancestor) are present but not displayed.

use std::collections::HashMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::{Driver, DriverError, Element, FrameTarget, Locator};

static ALL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("*").expect("invalid selector: all"));

#[derive(Debug, Clone, Default)]
pub(crate) struct FixturePage {
    documents: Vec<String>,
    frames: HashMap<String, FixturePage>,
}

impl FixturePage {
    pub(crate) fn new<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            documents: documents.into_iter().map(Into::into).collect(),
            frames: HashMap::new(),
        }
    }

    pub(crate) fn with_frame(mut self, name: &str, frame: FixturePage) -> Self {
        self.frames.insert(name.to_string(), frame);
        self
    }
}

#[derive(Debug, Default)]
pub(crate) struct FixtureDriver {
    pages: HashMap<String, FixturePage>,
    current: Option<String>,
    top_state: usize,
    frame: Option<String>,
    frame_states: HashMap<String, usize>,
    generation: u64,
    stale_clicks: usize,
    clicked: Vec<String>,
    navigations: usize,
}

impl FixtureDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_page(&mut self, url: &str, page: FixturePage) {
        self.pages.insert(url.to_string(), page);
    }

    pub(crate) fn with_page(mut self, url: &str, page: FixturePage) -> Self {
        self.add_page(url, page);
        self
    }

    /// The next `count` clicks fail as stale and re-render the page first.
    pub(crate) fn fail_next_clicks(&mut self, count: usize) {
        self.stale_clicks = count;
    }

    /// Text of every element clicked successfully, in order.
    pub(crate) fn clicked(&self) -> &[String] {
        &self.clicked
    }

    pub(crate) fn navigations(&self) -> usize {
        self.navigations
    }

    pub(crate) fn in_frame(&self) -> bool {
        self.frame.is_some()
    }

    fn context_name(&self) -> &str {
        self.frame.as_deref().unwrap_or("top")
    }

    fn page(&self) -> Result<&FixturePage, DriverError> {
        let url = self
            .current
            .as_ref()
            .ok_or_else(|| DriverError::UnexpectedResponse("no page loaded".to_string()))?;
        let page = &self.pages[url];
        match &self.frame {
            None => Ok(page),
            Some(name) => page
                .frames
                .get(name)
                .ok_or_else(|| DriverError::NoSuchElement(format!("frame {name}"))),
        }
    }

    fn state(&self) -> usize {
        match &self.frame {
            None => self.top_state,
            Some(name) => self.frame_states.get(name).copied().unwrap_or(0),
        }
    }

    fn document(&self) -> Result<Html, DriverError> {
        let page = self.page()?;
        let html = page.documents.get(self.state()).ok_or_else(|| {
            DriverError::UnexpectedResponse(format!("missing snapshot {}", self.state()))
        })?;
        Ok(Html::parse_document(html))
    }

    fn handle(&self, ordinal: usize) -> Element {
        Element(format!("{}:{}:{}", self.generation, self.context_name(), ordinal))
    }

    fn ordinal(&self, element: &Element) -> Result<usize, DriverError> {
        let mut parts = element.0.splitn(3, ':');
        let generation = parts.next().and_then(|g| g.parse::<u64>().ok());
        let context = parts.next();
        let ordinal = parts.next().and_then(|o| o.parse::<usize>().ok());

        match (generation, context, ordinal) {
            (Some(g), Some(c), Some(o)) if g == self.generation && c == self.context_name() => {
                Ok(o)
            }
            (Some(_), Some(_), Some(_)) => Err(DriverError::StaleElement),
            _ => Err(DriverError::NoSuchElement(element.0.clone())),
        }
    }

    fn select_ordinals<'a, I>(&self, document: &Html, matches: I) -> Vec<Element>
    where
        I: Iterator<Item = ElementRef<'a>>,
    {
        let all: Vec<ElementRef> = document.select(&ALL).collect();
        matches
            .filter_map(|m| all.iter().position(|e| e.id() == m.id()))
            .map(|ordinal| self.handle(ordinal))
            .collect()
    }

    fn with_element<T, F>(&self, element: &Element, f: F) -> Result<T, DriverError>
    where
        F: FnOnce(&Html, ElementRef) -> Result<T, DriverError>,
    {
        let ordinal = self.ordinal(element)?;
        let document = self.document()?;
        let found = document
            .select(&ALL)
            .nth(ordinal)
            .ok_or(DriverError::StaleElement)?;
        f(&document, found)
    }
}

fn parse_selector(locator: &Locator) -> Result<Selector, DriverError> {
    Selector::parse(locator.as_str())
        .map_err(|e| DriverError::InvalidLocator(format!("{}: {:?}", locator, e)))
}

fn is_hidden(element: ElementRef) -> bool {
    let value = element.value();
    value.attr("hidden").is_some()
        || value
            .attr("style")
            .is_some_and(|s| s.replace(' ', "").contains("display:none"))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Driver for FixtureDriver {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        if !self.pages.contains_key(url) {
            return Err(DriverError::Protocol {
                error: "unknown error".to_string(),
                message: format!("net::ERR_NAME_NOT_RESOLVED {url}"),
            });
        }
        self.current = Some(url.to_string());
        self.top_state = 0;
        self.frame = None;
        self.frame_states.clear();
        self.generation += 1;
        self.navigations += 1;
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        self.current
            .clone()
            .ok_or_else(|| DriverError::UnexpectedResponse("no page loaded".to_string()))
    }

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<Element>, DriverError> {
        let selector = parse_selector(locator)?;
        let document = self.document()?;
        Ok(self.select_ordinals(&document, document.select(&selector)))
    }

    fn find_within(
        &mut self,
        parent: &Element,
        locator: &Locator,
    ) -> Result<Vec<Element>, DriverError> {
        let selector = parse_selector(locator)?;
        self.with_element(parent, |document, found| {
            Ok(self.select_ordinals(document, found.select(&selector)))
        })
    }

    fn is_displayed(&mut self, element: &Element) -> Result<bool, DriverError> {
        self.with_element(element, |_, found| {
            let hidden = is_hidden(found)
                || found
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(is_hidden);
            Ok(!hidden)
        })
    }

    fn text(&mut self, element: &Element) -> Result<String, DriverError> {
        self.with_element(element, |_, found| {
            Ok(normalize_whitespace(&found.text().collect::<String>()))
        })
    }

    fn attribute(&mut self, element: &Element, name: &str) -> Result<Option<String>, DriverError> {
        self.with_element(element, |_, found| {
            Ok(found.value().attr(name).map(str::to_string))
        })
    }

    fn click(&mut self, element: &Element) -> Result<(), DriverError> {
        let (text, goto) = self.with_element(element, |_, found| {
            let goto = std::iter::once(found)
                .chain(found.ancestors().filter_map(ElementRef::wrap))
                .find_map(|e| e.value().attr("data-goto"))
                .and_then(|g| g.parse::<usize>().ok());
            Ok((normalize_whitespace(&found.text().collect::<String>()), goto))
        })?;

        if self.stale_clicks > 0 {
            self.stale_clicks -= 1;
            self.generation += 1;
            return Err(DriverError::StaleElement);
        }

        self.clicked.push(text);
        if let Some(state) = goto {
            match self.frame.clone() {
                None => self.top_state = state,
                Some(name) => {
                    self.frame_states.insert(name, state);
                }
            }
            self.generation += 1;
        }
        Ok(())
    }

    fn switch_frame(&mut self, target: FrameTarget) -> Result<(), DriverError> {
        match target {
            FrameTarget::Parent => {
                self.frame = None;
                Ok(())
            }
            FrameTarget::Element(element) => {
                let name = self.with_element(&element, |_, found| {
                    found
                        .value()
                        .attr("data-frame")
                        .map(str::to_string)
                        .ok_or_else(|| DriverError::NoSuchElement("frame".to_string()))
                })?;
                if !self.page()?.frames.contains_key(&name) {
                    return Err(DriverError::NoSuchElement(format!("frame {name}")));
                }
                self.frame = Some(name);
                Ok(())
            }
        }
    }
}
