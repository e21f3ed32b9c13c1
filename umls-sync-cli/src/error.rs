use colored::Colorize;
use std::fmt;
use std::process;
use umls_sync_core::{ConfigError, VersionError};
use umls_sync_graph::GraphError;
use umls_sync_rrf::RrfError;

/// Exit codes for the CLI.
#[allow(dead_code)]
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Unified error type for CLI operations.
pub enum CliError {
    /// Configuration loading / validation failure.
    Config(ConfigError),
    /// Malformed release tag on the command line.
    Version(VersionError),
    /// RRF parse failure.
    Parse(RrfError),
    /// Graph client / delta strategy failure.
    Graph(GraphError),
    /// UTS download failure.
    Download(crate::downloader::DownloadError),
    /// Argument / usage errors.
    Usage(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Version(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Parse(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Graph(GraphError::Cancelled) => {
                write!(f, "{} sync cancelled; the graph is consistent at the previously advertised version", "warning:".yellow().bold())
            }
            CliError::Graph(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Download(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Usage(msg) => write!(f, "{} {msg}", "error:".red().bold()),
        }
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<VersionError> for CliError {
    fn from(e: VersionError) -> Self {
        CliError::Version(e)
    }
}

impl From<RrfError> for CliError {
    fn from(e: RrfError) -> Self {
        CliError::Parse(e)
    }
}

impl From<GraphError> for CliError {
    fn from(e: GraphError) -> Self {
        CliError::Graph(e)
    }
}

impl From<crate::downloader::DownloadError> for CliError {
    fn from(e: crate::downloader::DownloadError) -> Self {
        CliError::Download(e)
    }
}

/// Print error and exit with the appropriate code.
pub fn exit_with_error(err: CliError) -> ! {
    eprintln!("{err}");
    let code = match &err {
        CliError::Usage(_) | CliError::Version(_) => EXIT_USAGE,
        _ => EXIT_ERROR,
    };
    process::exit(code)
}

pub type CliResult<T> = std::result::Result<T, CliError>;
