//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote directory tree and crawl behavior
    #[serde(default)]
    pub source: SourceConfig,

    /// Transfer pool settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Wall-clock ceiling for one run
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Backoff for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Object store location
    #[serde(default)]
    pub destination: DestinationConfig,

    /// Completion queue
    #[serde(default)]
    pub queue: QueueConfig,

    /// Supplemental aggregate dataset
    #[serde(default)]
    pub population: PopulationConfig,

    /// Analytics inputs and parameters
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay values from the process environment.
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an environment-style lookup.
    ///
    /// Unset keys leave the current value alone. A key that is set but does
    /// not parse is a configuration error.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        if let Some(v) = get("SOURCE_ROOT_URL") {
            self.source.root_url = v;
        }
        if let Some(v) = get("USER_AGENT") {
            self.source.user_agent = v;
        }
        if let Some(v) = get("CRAWL_TIMEOUT_SECS") {
            self.source.timeout_secs = parse_env("CRAWL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("REQUEST_DELAY_MS") {
            self.source.request_delay_ms = parse_env("REQUEST_DELAY_MS", &v)?;
        }
        if let Some(v) = get("MAX_DEPTH") {
            self.source.max_depth = parse_env("MAX_DEPTH", &v)?;
        }
        if let Some(v) = get("CRAWL_WORKERS") {
            self.source.workers = parse_env("CRAWL_WORKERS", &v)?;
        }
        if let Some(v) = get("FILE_SUFFIXES") {
            self.source.file_suffixes = v
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = get("SYNC_WORKERS") {
            self.sync.workers = parse_env("SYNC_WORKERS", &v)?;
        }
        if let Some(v) = get("SPOOL_DIR") {
            self.sync.spool_dir = Some(PathBuf::from(v)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(v) = get("DEST_BUCKET") {
            self.destination.bucket = Some(v).filter(|b| !b.is_empty());
        }
        if let Some(v) = get("DEST_PREFIX") {
            self.destination.prefix = v;
        }
        if let Some(v) = get("RUN_CEILING_SECS") {
            self.budget.ceiling_secs = parse_env("RUN_CEILING_SECS", &v)?;
        }
        if let Some(v) = get("RUN_SAFETY_MARGIN_SECS") {
            self.budget.safety_margin_secs = parse_env("RUN_SAFETY_MARGIN_SECS", &v)?;
        }
        if let Some(v) = get("RATE_LIMIT_DELAY_MS") {
            self.retry.rate_limit_delay_ms = parse_env("RATE_LIMIT_DELAY_MS", &v)?;
        }
        if let Some(v) = get("QUEUE_URL") {
            self.queue.queue_url = Some(v).filter(|u| !u.is_empty());
        }
        if let Some(v) = get("QUEUE_MAX_RECEIVE_COUNT") {
            self.queue.max_receive_count = parse_env("QUEUE_MAX_RECEIVE_COUNT", &v)?;
        }
        if let Some(v) = get("POPULATION_API_URL") {
            self.population.api_url = Some(v).filter(|u| !u.is_empty());
        }
        if let Some(v) = get("ANALYTICS_YEAR_RANGE") {
            let (from, to) = v.split_once('-').ok_or_else(|| {
                AppError::config(format!(
                    "ANALYTICS_YEAR_RANGE={v:?} must look like 2013-2018"
                ))
            })?;
            self.analytics.year_from = parse_env("ANALYTICS_YEAR_RANGE", from.trim())?;
            self.analytics.year_to = parse_env("ANALYTICS_YEAR_RANGE", to.trim())?;
        }
        if let Some(v) = get("JOIN_SERIES_ID") {
            self.analytics.join_series_id = v;
        }
        if let Some(v) = get("JOIN_PERIOD") {
            self.analytics.join_period = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::validation("source.user_agent is empty"));
        }
        let root = url::Url::parse(&self.source.root_url).map_err(|e| {
            AppError::validation(format!(
                "source.root_url {:?} is not a URL: {e}",
                self.source.root_url
            ))
        })?;
        if !matches!(root.scheme(), "http" | "https") {
            return Err(AppError::validation("source.root_url must be http(s)"));
        }
        if !root.path().ends_with('/') {
            return Err(AppError::validation(
                "source.root_url must end with '/' (it names a directory)",
            ));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        if self.source.max_depth == 0 {
            return Err(AppError::validation("source.max_depth must be >= 1"));
        }
        if self.source.workers == 0 {
            return Err(AppError::validation("source.workers must be > 0"));
        }
        if self.sync.workers == 0 {
            return Err(AppError::validation("sync.workers must be > 0"));
        }
        if self.sync.channel_capacity == 0 {
            return Err(AppError::validation("sync.channel_capacity must be > 0"));
        }
        if self.source.file_suffixes.is_empty() {
            return Err(AppError::validation("source.file_suffixes is empty"));
        }
        for pattern in &self.source.file_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                AppError::validation(format!("source.file_patterns {pattern:?}: {e}"))
            })?;
        }
        if self.budget.ceiling_secs == 0 {
            return Err(AppError::validation("budget.ceiling_secs must be > 0"));
        }
        if self.budget.safety_margin_secs >= self.budget.ceiling_secs {
            return Err(AppError::validation(
                "budget.safety_margin_secs must be smaller than budget.ceiling_secs",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::validation("retry.max_attempts must be >= 1"));
        }
        if self.destination.prefix.trim_matches('/').is_empty() {
            return Err(AppError::validation("destination.prefix is empty"));
        }
        if self.analytics.year_from > self.analytics.year_to {
            return Err(AppError::validation(format!(
                "analytics year range {}-{} is reversed",
                self.analytics.year_from, self.analytics.year_to
            )));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| AppError::config(format!("{key}={value:?}: {e}")))
}

/// Remote directory tree and crawl behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root directory URL; must end with '/'
    #[serde(default = "defaults::root_url")]
    pub root_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Pause after each listing fetch, per worker
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Directories at depth >= max_depth are never fetched
    #[serde(default = "defaults::max_depth")]
    pub max_depth: u32,

    /// Number of crawl workers
    #[serde(default = "defaults::crawl_workers")]
    pub workers: usize,

    /// Recognized data file suffixes, without the dot
    #[serde(default = "defaults::file_suffixes")]
    pub file_suffixes: Vec<String>,

    /// Regexes for compound names like `pr.data.0.Current`
    #[serde(default = "defaults::file_patterns")]
    pub file_patterns: Vec<String>,
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root_url: defaults::root_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_depth: defaults::max_depth(),
            workers: defaults::crawl_workers(),
            file_suffixes: defaults::file_suffixes(),
            file_patterns: defaults::file_patterns(),
        }
    }
}

/// Transfer pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Concurrent transfers
    #[serde(default = "defaults::sync_workers")]
    pub workers: usize,

    /// Discovered files buffered between crawl and sync
    #[serde(default = "defaults::channel_capacity")]
    pub channel_capacity: usize,

    /// Scratch directory for in-flight transfer bodies
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

impl SyncConfig {
    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir
            .clone()
            .unwrap_or_else(crate::storage::default_spool_dir)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: defaults::sync_workers(),
            channel_capacity: defaults::channel_capacity(),
            spool_dir: None,
        }
    }
}

/// Wall-clock limits for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Host-imposed ceiling
    #[serde(default = "defaults::ceiling")]
    pub ceiling_secs: u64,

    /// Reserved for finalization and publish
    #[serde(default = "defaults::safety_margin")]
    pub safety_margin_secs: u64,
}

impl BudgetConfig {
    pub fn ceiling(&self) -> Duration {
        Duration::from_secs(self.ceiling_secs)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            ceiling_secs: defaults::ceiling(),
            safety_margin_secs: defaults::safety_margin(),
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,

    /// Base backoff after a 429 without `Retry-After`
    #[serde(default = "defaults::rate_limit_delay")]
    pub rate_limit_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay(),
            max_delay_ms: defaults::max_delay(),
            rate_limit_delay_ms: defaults::rate_limit_delay(),
        }
    }
}

/// Object store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// S3 bucket; unset means the local store is used
    #[serde(default)]
    pub bucket: Option<String>,

    /// Key prefix under which the mirror lives
    #[serde(default = "defaults::prefix")]
    pub prefix: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: defaults::prefix(),
        }
    }
}

/// Completion queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// SQS queue URL; unset means the in-process queue is used
    #[serde(default)]
    pub queue_url: Option<String>,

    /// Deliveries before a message is dead-lettered
    #[serde(default = "defaults::max_receive_count")]
    pub max_receive_count: u32,

    #[serde(default = "defaults::visibility_timeout")]
    pub visibility_timeout_secs: u64,
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_url: None,
            max_receive_count: defaults::max_receive_count(),
            visibility_timeout_secs: defaults::visibility_timeout(),
        }
    }
}

/// Supplemental aggregate dataset fetched after the crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// JSON API; unset disables the fetch
    #[serde(default = "defaults::population_api_url")]
    pub api_url: Option<String>,

    #[serde(default = "defaults::population_key")]
    pub destination_key: String,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::population_api_url(),
            destination_key: defaults::population_key(),
        }
    }
}

/// Analytics inputs and parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Tab-separated time-series table
    #[serde(default = "defaults::series_key")]
    pub series_key: String,

    /// Aggregate JSON dataset
    #[serde(default = "defaults::population_key")]
    pub population_key: String,

    #[serde(default = "defaults::year_from")]
    pub year_from: i32,

    #[serde(default = "defaults::year_to")]
    pub year_to: i32,

    /// Periods summed per (series, year); empty means all
    #[serde(default = "defaults::best_year_periods")]
    pub best_year_periods: Vec<String>,

    #[serde(default = "defaults::join_series_id")]
    pub join_series_id: String,

    #[serde(default = "defaults::join_period")]
    pub join_period: String,

    /// Rows shown in the console report
    #[serde(default = "defaults::report_limit")]
    pub report_limit: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            series_key: defaults::series_key(),
            population_key: defaults::population_key(),
            year_from: defaults::year_from(),
            year_to: defaults::year_to(),
            best_year_periods: defaults::best_year_periods(),
            join_series_id: defaults::join_series_id(),
            join_period: defaults::join_period(),
            report_limit: defaults::report_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Source defaults
    pub fn root_url() -> String {
        "https://download.bls.gov/pub/time.series/pr/".into()
    }
    pub fn user_agent() -> String {
        "tsmirror/0.1 (data-sync; contact: ops@example.com)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        300
    }
    pub fn max_depth() -> u32 {
        3
    }
    pub fn crawl_workers() -> usize {
        5
    }
    pub fn file_suffixes() -> Vec<String> {
        [
            "txt", "csv", "data", "xlsx", "xls", "json", "xml", "tsv", "series", "notes",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
    pub fn file_patterns() -> Vec<String> {
        vec![r"^[A-Za-z0-9_-]+\.data\.\d+\.[A-Za-z0-9_]+$".into()]
    }

    // Sync defaults
    pub fn sync_workers() -> usize {
        5
    }
    pub fn channel_capacity() -> usize {
        256
    }

    // Budget defaults
    pub fn ceiling() -> u64 {
        900
    }
    pub fn safety_margin() -> u64 {
        60
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        5
    }
    pub fn base_delay() -> u64 {
        1_000
    }
    pub fn max_delay() -> u64 {
        30_000
    }
    pub fn rate_limit_delay() -> u64 {
        10_000
    }

    // Destination defaults
    pub fn prefix() -> String {
        "bls-data".into()
    }

    // Queue defaults
    pub fn max_receive_count() -> u32 {
        3
    }
    pub fn visibility_timeout() -> u64 {
        360
    }

    // Population defaults
    pub fn population_api_url() -> Option<String> {
        Some("https://datausa.io/api/data?drilldowns=Nation&measures=Population".into())
    }
    pub fn population_key() -> String {
        "population-data/population_data_all.json".into()
    }

    // Analytics defaults
    pub fn series_key() -> String {
        "bls-data/pr.data.0.Current".into()
    }
    pub fn year_from() -> i32 {
        2013
    }
    pub fn year_to() -> i32 {
        2018
    }
    pub fn best_year_periods() -> Vec<String> {
        ["Q01", "Q02", "Q03", "Q04"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
    pub fn join_series_id() -> String {
        "PRS30006032".into()
    }
    pub fn join_period() -> String {
        "Q01".into()
    }
    pub fn report_limit() -> usize {
        10
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.source.max_depth, 3);
        assert_eq!(config.budget.ceiling_secs, 900);
        assert_eq!(config.destination.prefix, "bls-data");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [source]
            max_depth = 2

            [budget]
            ceiling_secs = 120
            safety_margin_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.source.max_depth, 2);
        assert_eq!(config.source.workers, 5);
        assert_eq!(config.budget.ceiling_secs, 120);
        assert_eq!(config.analytics.join_series_id, "PRS30006032");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(lookup(&[
                ("MAX_DEPTH", "2"),
                ("CRAWL_WORKERS", " 8 "),
                ("DEST_BUCKET", "mirror-bucket"),
                ("FILE_SUFFIXES", ".txt, csv"),
                ("ANALYTICS_YEAR_RANGE", "2015-2017"),
                ("POPULATION_API_URL", ""),
                ("RATE_LIMIT_DELAY_MS", "2500"),
            ]))
            .unwrap();

        assert_eq!(config.source.max_depth, 2);
        assert_eq!(config.source.workers, 8);
        assert_eq!(config.destination.bucket.as_deref(), Some("mirror-bucket"));
        assert_eq!(config.source.file_suffixes, vec!["txt", "csv"]);
        assert_eq!((config.analytics.year_from, config.analytics.year_to), (2015, 2017));
        assert!(config.population.api_url.is_none());
        assert_eq!(config.retry.rate_limit_delay_ms, 2_500);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(lookup(&[("MAX_DEPTH", "deep")]))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let err = config
            .apply_env_overrides(lookup(&[("ANALYTICS_YEAR_RANGE", "2013")]))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.source.max_depth = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sync.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.source.root_url = "https://download.bls.gov/pub/time.series/pr".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.source.file_patterns = vec!["([".into()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.budget.safety_margin_secs = 900;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let mut config = Config::default();
        config.budget.ceiling_secs = 0;
        config.budget.safety_margin_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ceiling_secs"));
    }
}
