pub mod config;
pub mod digest;
pub mod driver;
pub mod orchestrator;
pub mod persistence;
pub mod store;
pub mod studios;
pub mod types;

pub use config::{RuntimeEnv, SiteConfig};
pub use orchestrator::{Orchestrator, Output, RunMode};
