use thiserror::Error;

pub mod app_config;
pub mod config;
pub mod record;
pub mod sink;

pub use app_config::AppConfig;
pub use config::{load_app_config, load_app_config_from_env};
pub use record::{normalize, BusinessRecord, RawProfile, ValidationError};
pub use sink::{MemorySink, RecordSink, SinkError, SinkOutcome};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
