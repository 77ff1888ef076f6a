//! Error types for CI configuration handling

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CiError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid job '{job}': {reason}")]
    InvalidJob { job: String, reason: String },

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Configuration defines no jobs")]
    NoJobs,
}

/// Result type for CI configuration operations
pub type Result<T> = std::result::Result<T, CiError>;
