use chrono::TimeDelta;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Influx,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub influx: Option<InfluxSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Native resolution of the meter data
    #[serde(default = "default_sampling_minutes")]
    pub sampling_interval_minutes: u32,
    #[serde(default = "default_lags")]
    pub lags: Vec<usize>,
}

impl AnalysisConfig {
    pub fn sampling_interval(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.sampling_interval_minutes))
    }

    pub fn sampling_label(&self) -> String {
        format!("{}min", self.sampling_interval_minutes)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampling_interval_minutes: default_sampling_minutes(),
            lags: default_lags(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_measurement_prefix")]
    pub measurement_prefix: String,
    #[serde(default)]
    pub skip_malformed: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            measurement_prefix: default_measurement_prefix(),
            skip_malformed: false,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_limit() -> usize {
    1000
}

fn default_sampling_minutes() -> u32 {
    15
}

fn default_lags() -> Vec<usize> {
    // 15min, 1h, 6h and 24h at the default resolution
    vec![1, 4, 24, 96]
}

fn default_measurement_prefix() -> String {
    "0100".to_string()
}

/// Loads `config/service` (optional) overlaid with `METER_*` environment variables.
pub fn load_service_config() -> anyhow::Result<ServiceConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/service").required(false))
        .add_source(
            config::Environment::with_prefix("METER")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let service_config: ServiceConfig = settings.try_deserialize()?;
    service_config.validate()?;
    Ok(service_config)
}

impl ServiceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let minutes = self.analysis.sampling_interval_minutes;
        if minutes == 0 || minutes > 1440 {
            anyhow::bail!(
                "analysis.sampling_interval_minutes must be between 1 and 1440, got {}",
                minutes
            );
        }
        // The daily lag must land on a whole number of samples.
        if 1440 % minutes != 0 {
            anyhow::bail!(
                "analysis.sampling_interval_minutes must divide a day (1440), got {}",
                minutes
            );
        }
        if self.ingest.measurement_prefix.is_empty() {
            anyhow::bail!("ingest.measurement_prefix must not be empty");
        }
        if self.storage.backend == StorageBackend::Influx && self.storage.influx.is_none() {
            anyhow::bail!("storage.backend = \"influx\" requires a [storage.influx] section");
        }
        Ok(())
    }
}
