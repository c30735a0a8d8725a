use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use kk_order_engine::OrderEngineError;
use log::error;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("{0}")]
    EngineError(#[from] OrderEngineError),
}

impl ServerError {
    fn engine_status(e: &OrderEngineError) -> StatusCode {
        use OrderEngineError::*;
        match e {
            InsufficientStock(_) => StatusCode::CONFLICT,
            InvalidCoupon(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewaySignatureInvalid => StatusCode::BAD_REQUEST,
            GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            PaymentAmbiguous { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayRejected(_) => StatusCode::BAD_GATEWAY,
            GatewayMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            InvalidStateTransition { .. } => StatusCode::CONFLICT,
            CancellationWindowClosed => StatusCode::CONFLICT,
            ReturnWindowClosed => StatusCode::CONFLICT,
            DuplicatePayment(_) => StatusCode::CONFLICT,
            RefundFailed(_) => StatusCode::BAD_GATEWAY,
            RefundExceedsCaptured { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            OrderNotFound(_) => StatusCode::NOT_FOUND,
            NotOrderOwner => StatusCode::FORBIDDEN,
            ProductNotFound(_) => StatusCode::NOT_FOUND,
            ConcurrentModification(_) => StatusCode::CONFLICT,
            ValidationError(_) => StatusCode::BAD_REQUEST,
            DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
                AuthError::ValidationError(_) => StatusCode::UNAUTHORIZED,
                AuthError::PoorlyFormattedToken(_) => StatusCode::BAD_REQUEST,
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
                AuthError::CouldNotIssueToken(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::EngineError(e) => Self::engine_status(e),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::EngineError(OrderEngineError::DatabaseError(e)) => {
                error!("💻️ Database error while handling request: {e}");
                json!({ "error": "An error occurred on the backend of the server. Please try again later." })
            },
            Self::EngineError(e) => match e.details() {
                Some(details) => json!({ "error": e.to_string(), "details": details }),
                None => json!({ "error": e.to_string() }),
            },
            _ => json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(body.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No bearer token was provided.")]
    MissingToken,
    #[error("The access token has expired.")]
    TokenExpired,
    #[error("Access token signature is invalid. {0}")]
    ValidationError(String),
    #[error("Access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Could not issue an access token. {0}")]
    CouldNotIssueToken(String),
}
