// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Validation error: {0}")]
    InvalidInput(String),

    #[error("Ride not found")]
    RideNotFound,

    #[error("Not authorized for this ride")]
    Forbidden,

    #[error("Ride no longer available")]
    RideNotAvailable,

    #[error("Ride is already paid")]
    AlreadyPaid,

    #[error("Payment gateway timed out")]
    GatewayTimeout,

    #[error("M-Pesa error: {0}")]
    MpesaError(String),

    #[error("Authentication error")]
    AuthError,

    #[error("Invalid ObjectId: {0}")]
    InvalidObjectId(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("External API error: {0}")]
    ExternalApi(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::MongoDB(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
            AppError::RideNotFound => (StatusCode::NOT_FOUND, "Ride not found"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Not authorized"),
            AppError::RideNotAvailable => (StatusCode::CONFLICT, "Ride no longer available"),
            AppError::AlreadyPaid => (StatusCode::CONFLICT, "Ride is already paid"),
            AppError::GatewayTimeout => (StatusCode::GATEWAY_TIMEOUT, "Payment gateway timed out"),
            AppError::MpesaError(_) => (StatusCode::BAD_GATEWAY, "M-Pesa error"),
            AppError::AuthError => (StatusCode::UNAUTHORIZED, "Authentication failed"),
            AppError::InvalidObjectId(_) => (StatusCode::BAD_REQUEST, "Invalid ID format"),
            AppError::ConfigurationError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error")
            }
            AppError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
            }
            AppError::ExternalApi(_) => (StatusCode::BAD_GATEWAY, "External API error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

// Manual From implementations
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AppError::GatewayTimeout;
        }
        AppError::ExternalApi(format!("HTTP request failed: {}", err))
    }
}

impl From<mongodb::bson::oid::Error> for AppError {
    fn from(err: mongodb::bson::oid::Error) -> Self {
        AppError::InvalidObjectId(err.to_string())
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn mpesa(msg: impl Into<String>) -> Self {
        AppError::MpesaError(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
