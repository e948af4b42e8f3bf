//! Crate-wide error types.

use thiserror::Error;

pub type BootgraphResult<T> = Result<T, BootgraphError>;

#[derive(Debug, Error)]
pub enum BootgraphError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The log produced no intervals at all.
    #[error("no data: {0}")]
    NoData(String),

    /// The extracted timeline covers zero time and cannot be scaled.
    #[error("no timeline data: start {start:.6}s equals end {end:.6}s")]
    NoTimeline { start: f64, end: f64 },

    #[error("trace error: {0}")]
    Trace(String),
}
