use thiserror::Error;

/// Failures while preparing a run. All of them are fatal.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("could not load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("could not install metrics exporter: {0}")]
    Metrics(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
