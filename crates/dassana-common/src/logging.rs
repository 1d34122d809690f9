//! Logging configuration and initialization
//!
//! Embedding processes (collectors, schedulers, one-off jobs) call
//! [`init_logging`] once at startup so every component of the ingestion
//! client reports through the same `tracing` subscriber.
//!
//! Library code logs through `trace!`/`debug!`/`info!`/`warn!`/`error!`
//! with structured fields (`job_id`, `bytes`, `key`), never `println!`.
//!
//! | Variable | Values | Default |
//! |---|---|---|
//! | `DASSANA_LOG_LEVEL` | trace, debug, info, warn, error, off | info |
//! | `DASSANA_DEBUG` | truthy selects debug when no level is set | |
//! | `DASSANA_LOG_OUTPUT` | console, file, both | console (stderr) |
//! | `DASSANA_LOG_FORMAT` | text, json | text |
//! | `DASSANA_LOG_DIR` | directory for daily files | `./logs` |
//! | `DASSANA_LOG_FILE_PREFIX` | file name prefix | `dassana-ingest` |
//! | `DASSANA_LOG_FILTER` | extra directives, e.g. `aws_smithy_runtime=warn` | |
//!
//! # Example
//!
//! ```no_run
//! use dassana_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     info!(connector = "aws_cloudtrail", "collector started");
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const DEFAULT_LOG_DIR: &str = "./logs";
const DEFAULT_FILE_PREFIX: &str = "dassana-ingest";

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Standard error, so collectors that emit records on stdout stay clean
    #[default]
    Console,
    /// Daily rotated files under `log_dir`
    File,
    Both,
}

impl LogOutput {
    pub fn to_console(self) -> bool {
        self != LogOutput::File
    }

    pub fn to_file(self) -> bool {
        self != LogOutput::Console
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line, for log shippers
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub output: LogOutput,
    pub format: LogFormat,
    pub log_dir: PathBuf,
    /// Daily files are named `<prefix>.<yyyy-mm-dd>`
    pub log_file_prefix: String,
    pub filter_directives: Option<String>,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            output: LogOutput::default(),
            format: LogFormat::default(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            log_file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            filter_directives: None,
            include_targets: true,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the `DASSANA_LOG_*` settings through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_lowercase()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let level = match get("DASSANA_LOG_LEVEL") {
            Some(level) => parse_level(&level)?,
            None if get("DASSANA_DEBUG").is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on")) => {
                LevelFilter::DEBUG
            },
            None => defaults.level,
        };

        let output = match get("DASSANA_LOG_OUTPUT").as_deref() {
            None | Some("console") | Some("stderr") => LogOutput::Console,
            Some("file") => LogOutput::File,
            Some("both") => LogOutput::Both,
            Some(other) => bail!("DASSANA_LOG_OUTPUT must be console, file or both, got '{}'", other),
        };

        let format = match get("DASSANA_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("DASSANA_LOG_FORMAT must be text or json, got '{}'", other),
        };

        Ok(Self {
            level,
            output,
            format,
            log_dir: lookup("DASSANA_LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            log_file_prefix: lookup("DASSANA_LOG_FILE_PREFIX").unwrap_or(defaults.log_file_prefix),
            filter_directives: lookup("DASSANA_LOG_FILTER"),
            include_targets: defaults.include_targets,
        })
    }
}

fn parse_level(raw: &str) -> Result<LevelFilter> {
    let raw = if raw == "warning" { "warn" } else { raw };
    raw.parse::<LevelFilter>()
        .map_err(|_| anyhow!("DASSANA_LOG_LEVEL is not a log level: '{}'", raw))
}

/// Install the global subscriber described by `config`.
///
/// Returns the file writer guard when file output is enabled; keep it alive
/// until shutdown or buffered lines are lost. Fails if a global subscriber
/// is already set.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config)?;
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.output.to_console() {
        layers.push(fmt_layer(config, std::io::stderr, true));
    }

    if config.output.to_file() {
        std::fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("Failed to create log directory {}", config.log_dir.display()))?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt_layer(config, writer, false));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// `RUST_LOG` first, then the configured level and extra directives.
fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let directives = config.filter_directives.as_deref().unwrap_or_default();
    for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let parsed = directive
            .parse()
            .with_context(|| format!("Invalid filter directive: {}", directive))?;
        filter = filter.add_directive(parsed);
    }

    Ok(filter)
}

fn fmt_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(config.include_targets)
        .with_span_events(FmtSpan::CLOSE);

    match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}
