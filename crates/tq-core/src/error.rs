use thiserror::Error;

/// Coarse classification of a [`TqError`].
///
/// Callers use this to decide policy (e.g. a worker may dead-letter on
/// `Encoding` but let `RemoteCall` fall through to lease expiry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authorization,
    RemoteCall,
    Encoding,
    Usage,
    Sink,
    Config,
}

#[derive(Debug, Error)]
pub enum TqError {
    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("remote call `{op}` failed: {message}")]
    RemoteCall { op: &'static str, message: String },

    #[error("payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("log sink write failed: {0}")]
    Sink(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TqError {
    pub fn remote(op: &'static str, message: impl Into<String>) -> Self {
        Self::RemoteCall {
            op,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TqError::Authorization(_) => ErrorKind::Authorization,
            TqError::RemoteCall { .. } => ErrorKind::RemoteCall,
            TqError::Encoding(_) | TqError::Base64(_) => ErrorKind::Encoding,
            TqError::Usage(_) => ErrorKind::Usage,
            TqError::Sink(_) => ErrorKind::Sink,
            TqError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Failure returned by worker logic. Workers may fail with anything.
pub type WorkerError = Box<dyn std::error::Error + Send + Sync + 'static>;
