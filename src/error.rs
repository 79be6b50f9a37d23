// Error taxonomy for upscale submission and job execution
use std::path::PathBuf;
use thiserror::Error;

/// Problems detected before any process is launched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("source path is empty")]
    EmptySourcePath,

    #[error("unknown model family for model {0:?}")]
    UnknownModelFamily(String),

    #[error("no usable output directory could be resolved")]
    UnresolvedOutputDirectory,

    #[error("output directory {path:?} cannot be used: {reason}")]
    UnusableOutputDirectory { path: PathBuf, reason: String },

    #[error("scale factor must be a positive number, got {0}")]
    InvalidScale(f64),

    #[error("compression quality must be between 0 and 100, got {0}")]
    InvalidCompression(u8),

    #[error("target width must be greater than zero")]
    InvalidTargetWidth,

    #[error("folder {0:?} does not contain any .param or .bin model files")]
    InvalidCustomModelsFolder(PathBuf),
}

#[derive(Debug, Error)]
pub enum UpscaylError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("failed to launch upscaler: {0}")]
    Launch(String),

    #[error("{0}")]
    ExternalFailure(String),

    #[error("job was cancelled")]
    Cancelled,

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl UpscaylError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpscaylError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, UpscaylError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, UpscaylError>;
