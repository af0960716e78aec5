use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::SiteConfig;
use crate::driver::Driver;
use crate::persistence::{PersistReport, persist};
use crate::store::DocumentStore;
use crate::studios::{Navigator, Timeouts};
use crate::types::CrawlResult;

pub const DEFAULT_DEV_OUTPUT: &str = "dev_output.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Dev,
    Prod,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dev" => Ok(RunMode::Dev),
            "prod" => Ok(RunMode::Prod),
            _ => Err(format!("Invalid mode: {}. Use 'dev' or 'prod'", s)),
        }
    }
}

impl Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Dev => write!(f, "dev"),
            RunMode::Prod => write!(f, "prod"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Could not write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not serialize sessions: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where a run's sessions end up.
pub enum Output<'a> {
    /// Local JSON artifact.
    Dev { path: &'a Path },
    /// Document store upserts.
    Prod { store: &'a mut dyn DocumentStore },
}

impl Output<'_> {
    pub fn mode(&self) -> RunMode {
        match self {
            Output::Dev { .. } => RunMode::Dev,
            Output::Prod { .. } => RunMode::Prod,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    Written { path: PathBuf, sessions: usize },
    Persisted(PersistReport),
}

impl Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunReport::Written { path, sessions } => {
                writeln!(f, "\n{} session(s) written to {}", sessions, path.display())
            }
            RunReport::Persisted(report) => write!(f, "{}", report),
        }
    }
}

/// Writes `result` as a pretty JSON object keyed by studio.
pub fn write_artifact(result: &CrawlResult, path: &Path) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Dev outputs written to: {}", path.display());
    Ok(())
}

/// Runs every configured studio's handler, one after another, on a single browser session.
pub struct Orchestrator<D: Driver> {
    driver: D,
    config: SiteConfig,
    timeouts: Timeouts,
}

impl<D: Driver> Orchestrator<D> {
    pub fn new(driver: D, config: SiteConfig) -> Self {
        Self {
            driver,
            config,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Crawls each configured studio. Every studio gets an entry, even when nothing was
    /// extracted.
    pub fn crawl(&mut self) -> CrawlResult {
        let mut result = CrawlResult::with_studios(self.config.studio_ids());

        for site in self.config.sites() {
            let today = site.studio.today();
            log::info!("Crawling {} ({})...", site.studio, site.url);

            let nav = Navigator::new(&mut self.driver, &site.url, self.timeouts);
            let mut handler = site.studio.handler(nav, today);
            let sessions = handler.crawl();

            log::info!("{}: {} session(s) extracted", handler.studio(), sessions.len());
            result.append(site.studio.id(), sessions);
        }
        result
    }

    pub fn run(&mut self, output: Output<'_>) -> Result<RunReport, OutputError> {
        log::info!("Running in {} mode", output.mode());
        let result = self.crawl();
        match output {
            Output::Dev { path } => {
                write_artifact(&result, path)?;
                Ok(RunReport::Written {
                    path: path.to_path_buf(),
                    sessions: result.total(),
                })
            }
            Output::Prod { store } => Ok(RunReport::Persisted(persist(&result, store))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fixture::{FixtureDriver, FixturePage};
    use crate::store::MemoryStore;
    use crate::studios::healcode::tests::session_card;
    use crate::studios::tests::fast_timeouts;
    use serde_json::Value;

    const BRICKHOUSE: &str = "https://brickhouse.test/schedule";
    const ILD: &str = "https://ild.test/classes";

    fn orchestrator() -> Orchestrator<FixtureDriver> {
        let week = format!(
            r#"<div class="bw-widget__day">{}{}</div>"#,
            session_card("2024-06-01T18:00", "2024-06-01T19:00", "Heels", "Dre"),
            session_card("2024-06-01T19:00", "2024-06-01T20:00", "Vogue", "Kai"),
        );
        let driver = FixtureDriver::new()
            .with_page(BRICKHOUSE, FixturePage::new([week]))
            .with_page(ILD, FixturePage::new(["<p>No classes this week</p>"]));
        let config = SiteConfig::from_json(&format!(
            r#"{{"urls": {{"Brickhouse": "{BRICKHOUSE}", "ILoveDanceManhattan": "{ILD}"}}}}"#
        ))
        .unwrap();
        Orchestrator::new(driver, config).with_timeouts(fast_timeouts())
    }

    #[test]
    fn test_run_mode_parsing() {
        assert_eq!("dev".parse::<RunMode>().unwrap(), RunMode::Dev);
        assert_eq!(" PROD ".parse::<RunMode>().unwrap(), RunMode::Prod);
        assert!("staging".parse::<RunMode>().is_err());
        assert_eq!(RunMode::default(), RunMode::Dev);
    }

    #[test]
    fn test_crawl_keeps_empty_studios() {
        let mut orchestrator = orchestrator();
        let result = orchestrator.crawl();

        assert_eq!(result.len(), 2);
        assert_eq!(result.sessions("Brickhouse").len(), 2);
        assert!(result.sessions("ILoveDanceManhattan").is_empty());
        assert_eq!(orchestrator.driver().navigations(), 2);
    }

    #[test]
    fn test_dev_run_writes_artifact() {
        let path = std::env::temp_dir().join(format!(
            "danceatlas-dev-output-{}.json",
            std::process::id()
        ));
        let mut orchestrator = orchestrator();
        let report = orchestrator.run(Output::Dev { path: &path }).unwrap();
        assert_eq!(
            report,
            RunReport::Written {
                path: path.clone(),
                sessions: 2
            }
        );

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        fs::remove_file(&path).unwrap();

        let studios = written.as_object().unwrap();
        assert_eq!(studios.len(), 2);
        assert_eq!(studios["ILoveDanceManhattan"], Value::Array(vec![]));
        let heels = &studios["Brickhouse"][0];
        assert_eq!(heels["session_name"], "Heels");
        assert_eq!(heels["start_time"], "2024-06-01T18:00:00-04:00");
        assert_eq!(heels["url"], BRICKHOUSE);
    }

    #[test]
    fn test_prod_run_persists_sessions() {
        let mut store = MemoryStore::new();
        let mut orchestrator = orchestrator();
        let report = orchestrator
            .run(Output::Prod { store: &mut store })
            .unwrap();

        assert_eq!(
            report,
            RunReport::Persisted(PersistReport {
                written: 2,
                failed: 0,
                collisions: 0
            })
        );
        assert!(
            store
                .get(&["classes", "Brickhouse", "2024-06-01", "2024-06-01Vogue"])
                .is_some()
        );
    }

    #[test]
    fn test_write_artifact_to_missing_directory_fails() {
        let path = std::env::temp_dir()
            .join("danceatlas-no-such-dir")
            .join("nested")
            .join("out.json");
        let err = write_artifact(&CrawlResult::default(), &path).unwrap_err();
        assert!(matches!(err, OutputError::Io { .. }));
    }
}
