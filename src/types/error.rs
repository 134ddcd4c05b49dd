use thiserror::Error;

/// roastrack error types
#[derive(Error, Debug)]
pub enum RoastrackError {
    /// Failed to parse an upstream payload or input file
    #[error("parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache operation failed
    #[error("cache error: {0}")]
    Cache(String),

    /// Upstream fetch failed (network, HTTP status, timeout)
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for roastrack
pub type Result<T> = std::result::Result<T, RoastrackError>;
