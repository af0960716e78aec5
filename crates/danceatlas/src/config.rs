use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::store::firestore::DEFAULT_BASE_URL;
use crate::studios::{Studio, StudioParseError};

pub const DEFAULT_SITE_CONFIG: &str = "site_data.json";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid site configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Site configuration lists no studios")]
    NoStudios,
    #[error(transparent)]
    UnknownStudio(#[from] StudioParseError),
    #[error("Invalid URL for {studio} '{url}': {reason}")]
    InvalidUrl {
        studio: String,
        url: String,
        reason: String,
    },
    #[error("Failed to load env variables into config struct: {0}")]
    Env(#[from] envy::Error),
    #[error("Firestore is not configured: {0} is missing")]
    MissingFirestore(&'static str),
}

#[derive(Debug, Deserialize)]
struct RawSiteConfig {
    urls: BTreeMap<String, String>,
}

/// A studio and the page its handler starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub studio: Studio,
    pub url: String,
}

/// Studios to crawl, loaded once from `{"urls": {studioId: url}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    sites: Vec<Site>,
}

impl SiteConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded {} studio(s) from {}", config.sites.len(), path.display());
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawSiteConfig = serde_json::from_str(json)?;
        if raw.urls.is_empty() {
            return Err(ConfigError::NoStudios);
        }

        let sites = raw
            .urls
            .into_iter()
            .map(|(id, url)| -> Result<Site, ConfigError> {
                let studio = id.parse::<Studio>()?;
                check_url(&id, &url)?;
                Ok(Site { studio, url })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sites })
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn studio_ids(&self) -> Vec<&'static str> {
        self.sites.iter().map(|s| s.studio.id()).collect()
    }
}

fn check_url(studio: &str, url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        studio: studio.to_string(),
        url: url.to_string(),
        reason,
    };
    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> Result<Self, ConfigError> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        Ok(envy::from_env::<Self>()?)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}

fn default_webdriver_url() -> String {
    DEFAULT_WEBDRIVER_URL.to_string()
}

fn default_firestore_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Process environment (and `.env`) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeEnv {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    pub firestore_project_id: Option<String>,
    pub firestore_token: Option<String>,
    #[serde(default = "default_firestore_base_url")]
    pub firestore_base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreSettings {
    pub base_url: String,
    pub project_id: String,
    pub token: String,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl RuntimeEnv {
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter(vars)?)
    }

    /// Store settings required in prod mode.
    pub fn firestore(&self) -> Result<FirestoreSettings, ConfigError> {
        let project_id = present(&self.firestore_project_id)
            .ok_or(ConfigError::MissingFirestore("FIRESTORE_PROJECT_ID"))?;
        let token = present(&self.firestore_token)
            .ok_or(ConfigError::MissingFirestore("FIRESTORE_TOKEN"))?;

        Ok(FirestoreSettings {
            base_url: self.firestore_base_url.clone(),
            project_id: project_id.to_string(),
            token: token.to_string(),
        })
    }
}
