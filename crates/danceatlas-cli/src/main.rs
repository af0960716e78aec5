use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use clap::{Parser, Subcommand, ValueEnum};
use danceatlas::config::{DEFAULT_SITE_CONFIG, LoadFromEnv, RuntimeEnv, SiteConfig};
use danceatlas::digest::{ClassFilter, DigestStats, UpcomingClasses};
use danceatlas::driver::{BrowserProfile, WebDriverSession};
use danceatlas::orchestrator::{DEFAULT_DEV_OUTPUT, Orchestrator, Output, RunMode};
use danceatlas::store::FirestoreStore;
use danceatlas::studios::Studio;
use danceatlas::types::SessionRecord;
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "danceatlas")]
#[command(about = "Crawls NYC dance studio schedules into one class format", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(
        long,
        value_parser = parse_mode,
        default_value = "dev",
        help = "dev writes a local JSON file, prod stores sessions in Firestore"
    )]
    mode: RunMode,

    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_SITE_CONFIG,
        help = "Site configuration listing the studios to crawl"
    )]
    config: PathBuf,

    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_DEV_OUTPUT,
        help = "Where dev mode writes its JSON output"
    )]
    output: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored classes from a date onwards, as the weekly digest reads them
    Upcoming {
        #[arg(
            long,
            value_name = "YYYY-MM-DD",
            help = "First day to include (defaults to today)",
            value_parser = parse_date,
        )]
        from: Option<NaiveDate>,

        #[arg(
            long,
            value_name = "YYYY-MM-DD",
            help = "Last day to include",
            value_parser = parse_date,
        )]
        until: Option<NaiveDate>,

        #[arg(
            long = "studio",
            value_parser = parse_studio,
            help = "Only this studio (repeatable)"
        )]
        studios: Vec<Studio>,

        #[arg(
            long = "weekday",
            value_parser = parse_weekday,
            help = "Only classes on this day of the week (repeatable)"
        )]
        weekdays: Vec<Weekday>,

        #[arg(long, help = "Only classes whose instructor contains this text")]
        instructor: Option<String>,

        #[arg(
            long,
            help = "Maximum number of classes to list",
            value_parser = clap::value_parser!(u16).range(1..)
        )]
        limit: Option<u16>,

        #[arg(
            short = 'f',
            long = "format",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
}

fn parse_mode(s: &str) -> Result<RunMode, String> {
    RunMode::from_str(s)
}

fn parse_studio(s: &str) -> Result<Studio, String> {
    Studio::from_str(s).map_err(|e| e.to_string())
}

fn parse_weekday(s: &str) -> Result<Weekday, String> {
    Weekday::from_str(s).map_err(|_| format!("Invalid weekday: {}", s))
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| e.to_string())
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn open_store(env: &RuntimeEnv) -> FirestoreStore {
    let settings = env.firestore().unwrap_or_else(|e| {
        log::error!("{}", e);
        process::exit(1);
    });
    FirestoreStore::new(&settings.base_url, &settings.project_id, &settings.token).unwrap_or_else(
        |e| {
            log::error!("Error creating Firestore client: {}", e);
            process::exit(1);
        },
    )
}

fn crawl(env: &RuntimeEnv, mode: RunMode, config: &Path, output: &Path) {
    let config = SiteConfig::load(config).unwrap_or_else(|e| {
        log::error!("Error loading site configuration: {}", e);
        process::exit(1);
    });

    // prod misconfiguration is reported before a browser is started
    let mut store = match mode {
        RunMode::Prod => Some(open_store(env)),
        RunMode::Dev => None,
    };

    let session = WebDriverSession::launch(&env.webdriver_url, &BrowserProfile::default())
        .unwrap_or_else(|e| {
            log::error!("Error starting browser session: {}", e);
            process::exit(1);
        });

    let mut orchestrator = Orchestrator::new(session, config);
    let output = match store.as_mut() {
        Some(store) => Output::Prod { store },
        None => Output::Dev { path: output },
    };
    let outcome = orchestrator.run(output);
    drop(orchestrator);

    match outcome {
        Ok(report) => print!("{}", report),
        Err(e) => {
            log::error!("Error saving dev outputs: {}", e);
            process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let env = RuntimeEnv::load_from_env().unwrap_or_else(|e| {
        log::error!("{}", e);
        process::exit(1);
    });

    match cli.command {
        None => crawl(&env, cli.mode, &cli.config, &cli.output),

        Some(Commands::Upcoming {
            from,
            until,
            studios,
            weekdays,
            instructor,
            limit,
            format,
        }) => {
            let filter = ClassFilter {
                end_date: until,
                studios: Vec::new(),
                weekdays,
                instructor,
                limit: limit.map(usize::from),
            };
            let filter = filter.validate().unwrap_or_else(|e| {
                log::error!("Invalid args: {e}");
                process::exit(1);
            });

            let studios = if studios.is_empty() {
                Studio::ALL.to_vec()
            } else {
                studios
            };
            let start = from
                .or_else(|| studios.iter().map(Studio::today).min())
                .unwrap_or_else(|| Studio::Peridance.today());
            let studio_ids: Vec<&str> = studios.iter().map(Studio::id).collect();

            let store = open_store(&env);
            log::info!("Loading classes from {} onwards...", start);
            let upcoming = UpcomingClasses::load(&store, &studio_ids, start).unwrap_or_else(|e| {
                log::error!("Error loading upcoming classes: {}", e);
                process::exit(1);
            });

            let matches = filter.apply(&upcoming);
            match format {
                OutputFormat::Json => {
                    let mut grouped: BTreeMap<&str, Vec<&SessionRecord>> = BTreeMap::new();
                    for (studio, record) in &matches {
                        grouped.entry(studio).or_default().push(record);
                    }
                    serialize_json(&grouped);
                }
                OutputFormat::Text => {
                    if matches.is_empty() {
                        println!("No classes to display.");
                    } else {
                        for (i, (studio, record)) in matches.iter().enumerate() {
                            println!("{:>3}. {:<20} {}", i + 1, studio, record);
                        }
                        print!("{}", DigestStats::from_matches(&matches));
                    }
                }
            }
        }
    }
}
