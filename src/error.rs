use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not decode '{source_name}' with any supported encoding")]
    Encoding { source_name: String },

    #[error("Batch '{source_name}' contains no data rows")]
    EmptyBatch { source_name: String },
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
