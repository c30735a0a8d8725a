use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RazorpayApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("No API credentials have been configured")]
    NoCredentials,
    #[error("No API credentials are configured for key id {0}")]
    UnknownKey(String),
    #[error("The request timed out: {0}")]
    Timeout(String),
    #[error("Could not reach the gateway: {0}")]
    Transport(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
}

impl RazorpayApiError {
    /// True if the outcome of the request is unknown, i.e. the gateway may or may not have acted on it.
    pub fn is_indeterminate(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::QueryError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RazorpayApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::JsonError(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}
