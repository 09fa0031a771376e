use thiserror::Error;

/// Errors produced while loading session data, assigning minisectors or
/// rendering charts.
#[derive(Error, Debug)]
pub enum MinisectorError {
    /// The requested session, lap or telemetry could not be resolved
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// No telemetry samples to bin
    #[error("no telemetry samples to assign minisectors to")]
    EmptyInput,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A sample carried a non-finite distance or speed
    #[error("invalid sample for driver {driver}: {reason}")]
    InvalidSample { driver: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The plotting backend failed to draw or encode a chart
    #[error("render error: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, MinisectorError>;
