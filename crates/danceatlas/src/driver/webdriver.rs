use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Driver, DriverError, Element, FrameTarget, Locator};

/// W3C identifier for element references in JSON payloads.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36";

/// Fixed browser configuration so that runs are reproducible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    pub headless: bool,
    pub user_agent: String,
    pub accept_insecure_certs: bool,
    pub sandbox: bool,
}

impl Default for BrowserProfile {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_insecure_certs: true,
            sandbox: false,
        }
    }
}

impl BrowserProfile {
    pub fn capabilities(&self) -> Value {
        let mut args = vec!["--disable-dev-shm-usage".to_string()];
        if !self.sandbox {
            args.push("--no-sandbox".to_string());
        }
        if self.headless {
            args.push("--headless=new".to_string());
        }
        if self.accept_insecure_certs {
            args.push("--ignore-certificate-errors".to_string());
            args.push("--ignore-ssl-errors".to_string());
        }
        args.push(format!("user-agent={}", self.user_agent));

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "acceptInsecureCerts": self.accept_insecure_certs,
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

/// A browser session driven over the W3C WebDriver protocol (e.g. chromedriver).
/// The session is deleted when this value is dropped.
#[derive(Debug)]
pub struct WebDriverSession {
    client: Client,
    endpoint: String,
    session_id: String,
}

impl WebDriverSession {
    pub fn launch(endpoint: &str, profile: &BrowserProfile) -> Result<Self, DriverError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        let endpoint = endpoint.trim_end_matches('/').to_string();

        log::info!("Starting browser session via {}", endpoint);
        let response = client
            .post(format!("{}/session", endpoint))
            .json(&profile.capabilities())
            .send()
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?;
        let value = unwrap_response(response)?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::UnexpectedResponse(value.to_string()))?
            .to_string();
        log::debug!("Browser session {} started", session_id);

        Ok(Self {
            client,
            endpoint,
            session_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.endpoint, self.session_id, path)
    }

    fn get(&self, path: &str) -> Result<Value, DriverError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?;
        unwrap_response(response)
    }

    fn post(&self, path: &str, body: Value) -> Result<Value, DriverError> {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?;
        unwrap_response(response)
    }

    fn find(&self, path: &str, locator: &Locator) -> Result<Vec<Element>, DriverError> {
        let value = self.post(
            path,
            json!({ "using": "css selector", "value": locator.as_str() }),
        )?;
        parse_elements(value)
    }
}

fn unwrap_response(response: Response) -> Result<Value, DriverError> {
    let status = response.status();
    let body: WireResponse = response
        .json()
        .inspect_err(|e| log::error!("Decode error: {e:?}"))?;
    if status.is_success() {
        return Ok(body.value);
    }
    let error: WireError = serde_json::from_value(body.value)
        .map_err(|e| DriverError::UnexpectedResponse(format!("{status}: {e}")))?;
    Err(map_wire_error(error))
}

fn map_wire_error(error: WireError) -> DriverError {
    match error.error.as_str() {
        "stale element reference" => DriverError::StaleElement,
        "no such element" | "no such frame" => DriverError::NoSuchElement(error.message),
        "invalid selector" => DriverError::InvalidLocator(error.message),
        _ => DriverError::Protocol {
            error: error.error,
            message: error.message,
        },
    }
}

fn parse_elements(value: Value) -> Result<Vec<Element>, DriverError> {
    let items = value
        .as_array()
        .ok_or_else(|| DriverError::UnexpectedResponse(value.to_string()))?;
    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| Element(id.to_string()))
                .ok_or_else(|| DriverError::UnexpectedResponse(item.to_string()))
        })
        .collect()
}

impl Driver for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        log::info!("Navigating to {}", url);
        self.post("/url", json!({ "url": url }))?;
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        let value = self.get("/url")?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::UnexpectedResponse(value.to_string()))
    }

    fn find_all(&mut self, locator: &Locator) -> Result<Vec<Element>, DriverError> {
        self.find("/elements", locator)
    }

    fn find_within(
        &mut self,
        parent: &Element,
        locator: &Locator,
    ) -> Result<Vec<Element>, DriverError> {
        self.find(&format!("/element/{}/elements", parent.id()), locator)
    }

    fn is_displayed(&mut self, element: &Element) -> Result<bool, DriverError> {
        let value = self.get(&format!("/element/{}/displayed", element.id()))?;
        value
            .as_bool()
            .ok_or_else(|| DriverError::UnexpectedResponse(value.to_string()))
    }

    fn text(&mut self, element: &Element) -> Result<String, DriverError> {
        let value = self.get(&format!("/element/{}/text", element.id()))?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::UnexpectedResponse(value.to_string()))
    }

    fn attribute(&mut self, element: &Element, name: &str) -> Result<Option<String>, DriverError> {
        let value = self.get(&format!("/element/{}/attribute/{}", element.id(), name))?;
        Ok(value.as_str().map(str::to_string))
    }

    fn click(&mut self, element: &Element) -> Result<(), DriverError> {
        self.post(&format!("/element/{}/click", element.id()), json!({}))?;
        Ok(())
    }

    fn switch_frame(&mut self, target: FrameTarget) -> Result<(), DriverError> {
        match target {
            FrameTarget::Element(element) => {
                self.post("/frame", json!({ "id": { ELEMENT_KEY: element.id() } }))?
            }
            FrameTarget::Parent => self.post("/frame/parent", json!({}))?,
        };
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        log::debug!("Closing browser session {}", self.session_id);
        if let Err(e) = self.client.delete(self.url("")).send() {
            log::warn!("Failed to close browser session {}: {}", self.session_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_capabilities() {
        let caps = BrowserProfile::default().capabilities();
        let always = &caps["capabilities"]["alwaysMatch"];
        let args: Vec<&str> = always["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();

        assert_eq!(always["acceptInsecureCerts"], true);
        assert!(args.contains(&"--no-sandbox"));
        assert!(args.contains(&"--ignore-certificate-errors"));
        assert!(
            args.iter()
                .any(|a| *a == format!("user-agent={}", DEFAULT_USER_AGENT))
        );
    }

    #[test]
    fn test_parse_elements() {
        let value = json!([{ ELEMENT_KEY: "a-1" }, { ELEMENT_KEY: "b-2" }]);
        let elements = parse_elements(value).unwrap();
        assert_eq!(elements, vec![Element("a-1".into()), Element("b-2".into())]);

        assert!(parse_elements(json!({ "oops": true })).is_err());
    }

    #[test]
    fn test_map_wire_error() {
        let stale = map_wire_error(WireError {
            error: "stale element reference".into(),
            message: "gone".into(),
        });
        assert!(matches!(stale, DriverError::StaleElement));

        let missing = map_wire_error(WireError {
            error: "no such element".into(),
            message: "td.day".into(),
        });
        assert!(matches!(missing, DriverError::NoSuchElement(m) if m == "td.day"));

        let other = map_wire_error(WireError {
            error: "timeout".into(),
            message: "slow".into(),
        });
        assert!(matches!(other, DriverError::Protocol { .. }));
    }
}
