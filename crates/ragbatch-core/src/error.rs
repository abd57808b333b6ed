use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read setting '{key}': {source}")]
    Setting {
        key: String,
        #[source]
        source: Box<figment::Error>,
    },

    #[error("Invalid chunk record on line {line}: {reason}")]
    InvalidChunk { line: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
