//! Typed runtime configuration.
//!
//! Settings come from the process environment under the `PYNEOUMLSSYNCER_` prefix,
//! with an optional `.env` file in the working directory as a fallback layer
//! (already-set process variables always win). Every option has a typed
//! field on [`Settings`]; enumerated options are validated at load time so a
//! bad value is a startup error, not a mid-sync surprise.

use crate::version::VersionError;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable prefix for every recognized option.
pub const ENV_PREFIX: &str = "PYNEOUMLSSYNCER_";

/// Source vocabularies kept when `SAB_FILTER` is not set.
pub const DEFAULT_SAB_FILTER: &[&str] = &["RXNORM", "SNOMEDCT_US", "MTH", "MSH", "LNC"];

/// Preferred-name vocabulary ranking when `SAB_PRIORITY` is not set.
pub const DEFAULT_SAB_PRIORITY: &[&str] = &[
    "RXNORM", "SNOMEDCT_US", "MTH", "MSH", "LNC", "GO", "HGNC", "NCBI", "OMIM", "ICD10CM", "CPT",
];

pub const DEFAULT_APOC_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_MAX_MALFORMED_ROWS: u64 = 1_000;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_TX_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required configuration: {0} (set it in the environment or a .env file)")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to read .env file: {0}")]
    DotEnv(#[from] std::io::Error),
    #[error(transparent)]
    Version(#[from] VersionError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Which `SUPPRESS` flags cause an MRCONSO row to be dropped.
///
/// A validated subset of `{O, Y, E}`. The default drops obsolete (`O`) and
/// suppressed-by-editor (`Y`) rows; adding `E` also drops rows the source
/// vocabulary itself marks suppressible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionHandling(BTreeSet<char>);

impl Default for SuppressionHandling {
    fn default() -> Self {
        SuppressionHandling(BTreeSet::from(['O', 'Y']))
    }
}

impl SuppressionHandling {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let mut set = BTreeSet::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part {
                "O" => set.insert('O'),
                "Y" => set.insert('Y'),
                "E" => set.insert('E'),
                other => {
                    return Err(format!("unknown suppress code '{other}' (expected O, Y, or E)"))
                }
            };
        }
        if set.is_empty() {
            return Err("at least one suppress code is required".to_string());
        }
        Ok(SuppressionHandling(set))
    }

    /// True when a row carrying this `SUPPRESS` field value must be dropped.
    pub fn drops(&self, suppress_field: &str) -> bool {
        suppress_field
            .chars()
            .next()
            .is_some_and(|c| self.0.contains(&c))
    }
}

/// Graph database connection settings.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        GraphSettings {
            uri: "neo4j://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            database: "neo4j".to_string(),
        }
    }
}

/// The full runtime configuration record.
#[derive(Debug, Clone)]
pub struct Settings {
    /// UTS API credential for release downloads.
    pub umls_api_key: String,
    pub graph: GraphSettings,
    /// Target directory for bulk-import CSVs. Required by `full-import` and
    /// `incremental-sync`; validated at the command layer so that commands
    /// that never write CSVs do not demand it.
    pub neo4j_import_dir: Option<PathBuf>,
    pub download_dir: PathBuf,
    /// SAB allowlist. Empty means "keep every vocabulary".
    pub sab_filter: Vec<String>,
    pub sab_priority: Vec<String>,
    pub suppression: SuppressionHandling,
    /// Parser worker pool size.
    pub max_parallel_workers: usize,
    pub apoc_batch_size: usize,
    pub max_malformed_rows: u64,
    pub retry_max_attempts: u32,
    pub tx_timeout_secs: u64,
}

impl Settings {
    /// Load from the process environment plus `./.env` if present.
    pub fn load() -> Result<Self> {
        Self::from_source(&EnvSource::from_process(Path::new(".env"))?)
    }

    /// Load from an explicit source (tests inject maps directly).
    pub fn from_source(source: &EnvSource) -> Result<Self> {
        let umls_api_key = source
            .get("UMLS_API_KEY")
            .ok_or(ConfigError::Missing("PYNEOUMLSSYNCER_UMLS_API_KEY"))?;

        let defaults = GraphSettings::default();
        let graph = GraphSettings {
            uri: source.get("NEO4J_URI").unwrap_or(defaults.uri),
            user: source.get("NEO4J_USER").unwrap_or(defaults.user),
            password: source.get("NEO4J_PASSWORD").unwrap_or(defaults.password),
            database: source.get("NEO4J_DATABASE").unwrap_or(defaults.database),
        };

        let sab_filter = match source.get("SAB_FILTER") {
            Some(raw) => parse_list(&raw),
            None => DEFAULT_SAB_FILTER.iter().map(|s| s.to_string()).collect(),
        };
        let sab_priority = match source.get("SAB_PRIORITY") {
            Some(raw) => parse_list(&raw),
            None => DEFAULT_SAB_PRIORITY.iter().map(|s| s.to_string()).collect(),
        };

        let suppression = match source.get("SUPPRESSION_HANDLING") {
            Some(raw) => SuppressionHandling::parse(&raw).map_err(|reason| ConfigError::Invalid {
                key: "PYNEOUMLSSYNCER_SUPPRESSION_HANDLING",
                reason,
            })?,
            None => SuppressionHandling::default(),
        };

        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Ok(Settings {
            umls_api_key,
            graph,
            neo4j_import_dir: source.get("NEO4J_IMPORT_DIR").map(PathBuf::from),
            download_dir: source
                .get("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./umls_download")),
            sab_filter,
            sab_priority,
            suppression,
            max_parallel_workers: parse_numeric(
                source,
                "MAX_PARALLEL_WORKERS",
                "PYNEOUMLSSYNCER_MAX_PARALLEL_WORKERS",
                default_workers,
            )?,
            apoc_batch_size: parse_numeric(
                source,
                "APOC_BATCH_SIZE",
                "PYNEOUMLSSYNCER_APOC_BATCH_SIZE",
                DEFAULT_APOC_BATCH_SIZE,
            )?,
            max_malformed_rows: parse_numeric(
                source,
                "MAX_MALFORMED_ROWS",
                "PYNEOUMLSSYNCER_MAX_MALFORMED_ROWS",
                DEFAULT_MAX_MALFORMED_ROWS,
            )?,
            retry_max_attempts: parse_numeric(
                source,
                "RETRY_MAX_ATTEMPTS",
                "PYNEOUMLSSYNCER_RETRY_MAX_ATTEMPTS",
                DEFAULT_RETRY_MAX_ATTEMPTS,
            )?,
            tx_timeout_secs: parse_numeric(
                source,
                "TX_TIMEOUT_SECS",
                "PYNEOUMLSSYNCER_TX_TIMEOUT_SECS",
                DEFAULT_TX_TIMEOUT_SECS,
            )?,
        })
    }

    /// The CSV output directory, or a configuration error naming the option.
    pub fn require_import_dir(&self) -> Result<&Path> {
        self.neo4j_import_dir
            .as_deref()
            .ok_or(ConfigError::Missing("PYNEOUMLSSYNCER_NEO4J_IMPORT_DIR"))
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_numeric<T: std::str::FromStr>(
    source: &EnvSource,
    key: &str,
    full_key: &'static str,
    default: T,
) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match source.get(key) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
            key: full_key,
            reason: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

/// Layered option source: process environment first, `.env` file second.
///
/// Keys are looked up without the `PYNEOUMLSSYNCER_` prefix; the prefix is applied
/// here in one place.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    process: HashMap<String, String>,
    dotenv: HashMap<String, String>,
}

impl EnvSource {
    /// Snapshot the process environment and parse `dotenv_path` if it exists.
    pub fn from_process(dotenv_path: &Path) -> Result<Self> {
        let process = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        let dotenv = if dotenv_path.is_file() {
            parse_dotenv(&std::fs::read_to_string(dotenv_path)?)
        } else {
            HashMap::new()
        };
        Ok(EnvSource { process, dotenv })
    }

    /// Build a source from explicit prefixed key/value pairs (tests).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        EnvSource {
            process: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            dotenv: HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let full = format!("{ENV_PREFIX}{key}");
        self.process
            .get(&full)
            .or_else(|| self.dotenv.get(&full))
            .cloned()
    }
}

/// Parse `KEY=VALUE` lines; `#` comments and blank lines are skipped, and
/// values may be wrapped in single or double quotes.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().trim_start_matches("export ").trim();
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    vars
}
