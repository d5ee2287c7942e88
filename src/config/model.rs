// src/config/model.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::dag::DependencyGraph;
use crate::types::BackoffKind;

pub const DEFAULT_WAREHOUSE_URL_ENV: &str = "ETLDAG_WAREHOUSE_URL";

/// Pipeline file exactly as deserialized from TOML.
///
/// ```toml
/// [config]
/// workers = 4
///
/// [warehouse]
/// url_env = "ETLDAG_WAREHOUSE_URL"
///
/// [default]
/// max_attempts = 4
/// retry_delay = "5m"
///
/// [task.stage_events]
/// kind = "stage"
/// table = "staging_events"
/// credentials = "aws_credentials"
/// bucket = "udacity-dend"
/// key = "log_data"
/// json_paths = "log_json_path.json"
///
/// [task.load_songplays]
/// kind = "fact"
/// after = ["stage_events"]
/// ```
///
/// Use [`ConfigFile`] (via `TryFrom`) everywhere else.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub warehouse: WarehouseSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// Keys are task ids.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A pipeline file that passed validation, together with its graph.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub warehouse: WarehouseSection,
    pub default: DefaultSection,
    pub task: BTreeMap<String, TaskConfig>,
    pub graph: Arc<DependencyGraph>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of tasks executing at once.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    crate::pipeline::DEFAULT_WORKERS
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// `[warehouse]` section. `url` wins over `url_env`.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseSection {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_url_env")]
    pub url_env: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_url_env() -> String {
    DEFAULT_WAREHOUSE_URL_ENV.to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            url: None,
            url_env: default_url_env(),
            max_connections: default_max_connections(),
        }
    }
}

/// `[default]` section: retry behaviour applied to tasks that do not
/// override it.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,

    #[serde(default)]
    pub backoff: BackoffKind,

    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: String,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_retry_delay() -> String {
    "5m".to_string()
}

fn default_max_retry_delay() -> String {
    "1h".to_string()
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            backoff: BackoffKind::default(),
            max_retry_delay: default_max_retry_delay(),
        }
    }
}

/// Value of `kind = "..."` in a task table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKindConfig {
    Stage,
    Fact,
    Dimension,
    Quality,
    Marker,
}

/// `[task.<id>]` section.
///
/// One flat table for every kind; validation checks that the fields the kind
/// needs are present.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub kind: TaskKindConfig,

    /// Upstream task ids.
    #[serde(default)]
    pub after: Vec<String>,

    // Retry overrides.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay: Option<String>,
    #[serde(default)]
    pub backoff: Option<BackoffKind>,
    #[serde(default)]
    pub max_retry_delay: Option<String>,

    /// Target table (stage, fact, dimension).
    #[serde(default)]
    pub table: Option<String>,

    // Stage fields.
    #[serde(default)]
    pub credentials: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    /// Object key or prefix; may contain `{ds}`-style placeholders.
    #[serde(default)]
    pub key: Option<String>,
    /// `"auto"` or the key of a JSONPaths manifest in the same bucket.
    #[serde(default)]
    pub json_paths: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub time_format: Option<String>,

    // Fact / dimension fields.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub insert_mode: Option<String>,
    /// Target column holding the natural key.
    #[serde(default)]
    pub dedupe_column: Option<String>,
    /// Source column matching `dedupe_column`, when named differently.
    #[serde(default)]
    pub dedupe_source_column: Option<String>,

    // Quality gate checks, evaluated in order.
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

/// One entry of a quality task's `checks = [...]`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    #[serde(default)]
    pub description: Option<String>,
    pub query: String,
    /// e.g. `"== 0"`.
    pub expect: String,
}
