//! Error types for shravan

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Subscriber error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or protocol error
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// TLS handshake failed
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    /// A framed record that cannot be decoded. Indicates byte-stream
    /// corruption, so the connection is aborted rather than the record
    /// skipped.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Wire encoding error
    #[error("Wire encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
