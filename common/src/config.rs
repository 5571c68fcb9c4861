use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub storage: StorageSettings,
    #[serde(default)]
    pub processor: ProcessorSettings,
    #[serde(default)]
    pub handles: HandleSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Custom S3 endpoint (MinIO, LocalStack). When unset the default AWS
    /// endpoint resolution is used.
    pub endpoint: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub incoming_bucket: String,
    pub quarantine_bucket: String,
    pub records_bucket: String,
    #[serde(default)]
    pub quarantine_prefix: String,
    #[serde(default = "default_records_prefix")]
    pub records_prefix: String,
    #[serde(default = "default_true")]
    pub force_path_style: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordIdStrategy {
    /// UUIDv5 over bucket, key and content hash. Retries upsert the same record.
    #[default]
    ContentDerived,
    /// Fresh UUIDv4 per run.
    Random,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessorSettings {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default)]
    pub required_columns: Vec<String>,
    #[serde(default)]
    pub record_id_strategy: RecordIdStrategy,
    #[serde(default = "default_invocation_timeout")]
    pub invocation_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            required_columns: Vec::new(),
            record_id_strategy: RecordIdStrategy::default(),
            invocation_timeout_secs: default_invocation_timeout(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HandleSettings {
    #[serde(default = "default_handle_ttl")]
    pub ttl_secs: u64,
}

impl Default for HandleSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_handle_ttl(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Accepted `x-api-key` values. An empty list disables the check.
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            keys: Vec::new(),
            rate_limit: RateLimitSettings::default(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorSettings {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    pub webhook_url: Option<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            threshold: default_threshold(),
            webhook_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_records_prefix() -> String {
    "records/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_file_size() -> u64 {
    64 * 1024 * 1024
}

fn default_invocation_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    200
}

fn default_handle_ttl() -> u64 {
    300
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_allowed_origin() -> String {
    "*".to_string()
}

fn default_requests_per_second() -> f64 {
    10.0
}

fn default_burst() -> u32 {
    20
}

fn default_window_secs() -> u64 {
    60
}

fn default_threshold() -> usize {
    1
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        Self::from_config(builder.build()?)
    }

    /// Builds settings from an inline TOML document. Environment overrides
    /// are not applied.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;

        debug!(
            incoming = %settings.storage.incoming_bucket,
            quarantine = %settings.storage.quarantine_bucket,
            records = %settings.storage.records_bucket,
            "Loaded storage configuration"
        );

        if settings.processor.max_attempts == 0 {
            return Err(ConfigError::Message(
                "processor.max_attempts must be at least 1".to_string(),
            ));
        }

        if settings.monitor.threshold == 0 {
            return Err(ConfigError::Message(
                "monitor.threshold must be at least 1".to_string(),
            ));
        }

        Ok(settings)
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
