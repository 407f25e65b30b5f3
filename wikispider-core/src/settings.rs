use crate::error::{CoreError, Result};
use config::{Config, Environment};
use serde::Serialize;

/// Prefix of every environment variable the spider reads.
pub const ENV_PREFIX: &str = "WIKISPIDER";

pub const LOG_LEVEL: &str = "log.level";

pub const METRICS_ENABLED: &str = "metrics.enabled";
pub const METRICS_PORT: &str = "metrics.port";

pub const TRACING_ENABLED: &str = "tracing.enabled";
pub const TRACING_SAMPLE_RATE: &str = "tracing.samplerate";
pub const TRACING_SERVICE: &str = "tracing.service";
pub const TRACING_VERSION: &str = "tracing.version";

pub const SPIDER_USER_AGENT: &str = "spider.user.agent";
pub const SPIDER_ALLOWED_DOMAINS: &str = "spider.allowed.domains";
pub const SPIDER_URL_BASE: &str = "spider.url.base";
pub const SPIDER_START_SLUG: &str = "spider.start.slug";
pub const SPIDER_MAX_DEPTH: &str = "spider.max.depth";
pub const SPIDER_DELAY_MS: &str = "spider.delay.ms";
pub const SPIDER_WORKERS: &str = "spider.workers";
pub const SPIDER_REQUEST_TIMEOUT_SECS: &str = "spider.request.timeout.secs";

pub const DATABASE_CONN_STRING: &str = "database.conn.string";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TracingSettings {
    pub enabled: bool,
    pub sample_rate: f64,
    pub service: String,
    pub version: String,
}

/// Parameters of the traversal itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpiderSettings {
    pub user_agent: String,
    pub allowed_domains: Vec<String>,
    pub url_base: String,
    pub start_slug: String,
    pub max_depth: usize,
    pub delay_ms: u64,
    pub workers: usize,
    pub request_timeout_secs: u64,
}

impl SpiderSettings {
    pub fn start_url(&self) -> String {
        format!("{}{}", self.url_base, self.start_slug)
    }
}

/// Everything a run needs, loaded once before the crawl starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub log_level: String,
    pub metrics: MetricsSettings,
    pub tracing: TracingSettings,
    pub spider: SpiderSettings,
    #[serde(skip)]
    pub database_conn_string: String,
}

/// Split a comma-separated domain list, dropping blanks.
pub fn parse_allowed_domains(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

fn defaults() -> std::result::Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default(LOG_LEVEL, "info")?
        .set_default(METRICS_ENABLED, false)?
        .set_default(METRICS_PORT, 8081)?
        .set_default(TRACING_ENABLED, false)?
        .set_default(TRACING_SAMPLE_RATE, 1.0)?
        .set_default(TRACING_SERVICE, "wikispider")?
        .set_default(TRACING_VERSION, env!("CARGO_PKG_VERSION"))?
        .set_default(SPIDER_DELAY_MS, 10_000)?
        .set_default(SPIDER_WORKERS, 1)?
        .set_default(SPIDER_REQUEST_TIMEOUT_SECS, 10)
}

impl Settings {
    /// Load from `WIKISPIDER_*` environment variables; `_` separates key
    /// segments, so `WIKISPIDER_SPIDER_MAX_DEPTH` is `spider.max.depth`.
    pub fn from_env() -> Result<Self> {
        Self::from_source(Environment::with_prefix(ENV_PREFIX).separator("_"))
    }

    /// Load from any config source, on top of the defaults.
    pub fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = defaults()?.add_source(source).build()?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let max_depth: i64 = config.get(SPIDER_MAX_DEPTH)?;
        let max_depth = usize::try_from(max_depth).map_err(|_| CoreError::InvalidSetting {
            key: SPIDER_MAX_DEPTH,
            reason: format!("must be a non-negative integer, got {max_depth}"),
        })?;

        let workers: i64 = config.get(SPIDER_WORKERS)?;
        let workers = usize::try_from(workers)
            .ok()
            .filter(|w| *w >= 1)
            .ok_or_else(|| CoreError::InvalidSetting {
                key: SPIDER_WORKERS,
                reason: format!("must be at least 1, got {workers}"),
            })?;

        let delay_ms: i64 = config.get(SPIDER_DELAY_MS)?;
        let delay_ms = u64::try_from(delay_ms).map_err(|_| CoreError::InvalidSetting {
            key: SPIDER_DELAY_MS,
            reason: format!("must be a non-negative integer, got {delay_ms}"),
        })?;

        let request_timeout_secs: i64 = config.get(SPIDER_REQUEST_TIMEOUT_SECS)?;
        let request_timeout_secs = u64::try_from(request_timeout_secs)
            .ok()
            .filter(|t| *t >= 1)
            .ok_or_else(|| CoreError::InvalidSetting {
                key: SPIDER_REQUEST_TIMEOUT_SECS,
                reason: format!("must be at least 1, got {request_timeout_secs}"),
            })?;

        let sample_rate: f64 = config.get(TRACING_SAMPLE_RATE)?;
        if !(0.0..=1.0).contains(&sample_rate) {
            return Err(CoreError::InvalidSetting {
                key: TRACING_SAMPLE_RATE,
                reason: format!("must be between 0.0 and 1.0, got {sample_rate}"),
            });
        }

        let port: i64 = config.get(METRICS_PORT)?;
        let port = u16::try_from(port).map_err(|_| CoreError::InvalidSetting {
            key: METRICS_PORT,
            reason: format!("not a valid port: {port}"),
        })?;

        Ok(Settings {
            log_level: config.get_string(LOG_LEVEL)?,
            metrics: MetricsSettings {
                enabled: config.get_bool(METRICS_ENABLED)?,
                port,
            },
            tracing: TracingSettings {
                enabled: config.get_bool(TRACING_ENABLED)?,
                sample_rate,
                service: config.get_string(TRACING_SERVICE)?,
                version: config.get_string(TRACING_VERSION)?,
            },
            spider: SpiderSettings {
                user_agent: config.get_string(SPIDER_USER_AGENT)?,
                allowed_domains: parse_allowed_domains(&config.get_string(SPIDER_ALLOWED_DOMAINS)?),
                url_base: config.get_string(SPIDER_URL_BASE)?,
                start_slug: config.get_string(SPIDER_START_SLUG)?,
                max_depth,
                delay_ms,
                workers,
                request_timeout_secs,
            },
            database_conn_string: config.get_string(DATABASE_CONN_STRING)?,
        })
    }
}
