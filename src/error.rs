use thiserror::Error;

/// Errors raised while configuring the analysis pipeline
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Frame size must be a power of two
    #[error("Frame size must be a power of two, got {0}")]
    FrameSizeNotPowerOfTwo(usize),

    /// Frame size below the supported minimum
    #[error("Frame size too small: {0} (min {1})")]
    FrameSizeTooSmall(usize, usize),
}

/// Result type for configuration
pub type Result<T> = std::result::Result<T, ConfigError>;
