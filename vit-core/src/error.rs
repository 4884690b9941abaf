//! Error types for vit-core.

use std::path::PathBuf;

/// Result type alias using vit-core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when configuring or running a ViT model.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to read config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    /// A configuration invariant does not hold.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An input or parameter tensor has the wrong shape.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// No learned tensor is registered under the given key.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Error::Shape(err.to_string())
    }
}
