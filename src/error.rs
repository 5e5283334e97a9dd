use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("unknown {field}: {value}")]
    UnknownFilterValue { field: &'static str, value: String },

    #[error("unrecognized column layout in {file}")]
    SchemaUnrecognized { file: String },

    #[error("refresh partially failed for {} file(s): {}", failed.len(), failed.join(", "))]
    PartialFailure { failed: Vec<String> },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("metadata store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
