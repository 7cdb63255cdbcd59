use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no valid URLs were provided")]
    NoValidUrls,

    #[error("a batch needs at least one URL")]
    EmptyBatch,

    #[error("a batch is already running; cancel it or wait for it to finish")]
    BatchInProgress,

    #[error("invalid format token: {0}")]
    InvalidFormatToken(String),

    #[error("unknown format preset: {0}")]
    UnknownFormatPreset(String),

    #[error("{tool} not found")]
    ExternalToolMissing { tool: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
