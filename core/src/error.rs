use thiserror::Error;

/// Failures talking to the console backend.
///
/// Validation problems are not represented here: they are ordinary values
/// (see [`crate::validation::ValidationReport`]) and never travel through `?`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered 401. The session has been invalidated and the
    /// user must authenticate again; retrying the same request is pointless.
    #[error("Unauthorized: session is no longer valid")]
    Unauthorized,

    /// Transport-level failure (connect, TLS, reset, body read).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend rejected or failed the request.
    #[error("Request failed ({status}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// `detail` from the error body when present.
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The server-push channel ended or broke mid-stream.
    #[error("Stream error: {0}")]
    Stream(String),
}

impl ApiError {
    /// Whether the failure is transient and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Stream(_) => true,
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::Unauthorized | ApiError::Parse(_) | ApiError::InvalidConfig(_) => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
