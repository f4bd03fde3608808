use thiserror::Error;

/// Top-level error type for xrelay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The database stayed locked for every retry attempt.
    #[error("{operation} failed after {attempts} attempts: database is locked")]
    LockExhausted { operation: String, attempts: u32 },

    /// The monitored handle could not be resolved to an upstream account.
    #[error("could not resolve {handle} after {attempts} attempts")]
    ResolutionExhausted { handle: String, attempts: u32 },

    /// Transport or protocol error from the upstream post source.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Storage error other than lock contention.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Error from a delivery channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// Image search failed.
    #[error("image lookup error: {0}")]
    ImageLookup(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
