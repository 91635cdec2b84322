use thiserror::Error;

/// Errors surfaced by payment providers and the surrounding service.
///
/// Unrecognized vendor states are not errors: they come back as an
/// `Ok(NotificationResult)` with [`PaymentStatus::Error`](crate::models::payment::PaymentStatus::Error).
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Missing or invalid credentials at construction time
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller's request cannot be sent to any gateway
    #[error("invalid payment request: {0}")]
    InvalidRequest(String),

    /// The gateway answered but rejected the call
    #[error("{provider} {operation} failed: {message}")]
    Gateway {
        provider: &'static str,
        operation: &'static str,
        message: String,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed attachment, metadata or callback payload
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Instance built without credentials (lenient constructor)
    #[error("{0} provider is not configured")]
    NotConfigured(&'static str),

    #[error("unknown payment provider: {0}")]
    UnknownProvider(String),
}

impl PaymentError {
    pub fn gateway(provider: &'static str, operation: &'static str, message: impl Into<String>) -> Self {
        PaymentError::Gateway {
            provider,
            operation,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
