use crate::entities::WalletType;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

pub type AppResult<T> = Result<T, AppError>;

/// Validation failures raised while preparing a checkout. Local and non-retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Competition '{0}' not found")]
    UnknownCompetition(String),

    #[error("Invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    #[error("Invalid quantity for '{0}'")]
    InvalidQuantity(String),

    #[error("Coupon '{0}' is no longer valid")]
    InvalidCoupon(String),

    #[error("Card payments are not available")]
    CardPaymentsUnavailable,

    #[error("Card payments require a positive total")]
    ZeroCardTotal,

    #[error("Order {0} is not a card order")]
    NotCardOrder(Uuid),

    #[error("Cart total is too large")]
    AmountOverflow,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Not enough tickets left for competition {competition_id} ({available} available)")]
    CapacityExhausted { competition_id: Uuid, available: i64 },

    #[error(
        "Allocation failed for competition {competition_id}: secured {secured} of {requested} tickets"
    )]
    AllocationFailed {
        competition_id: Uuid,
        requested: u32,
        secured: u32,
    },

    #[error("Insufficient {wallet} balance")]
    InsufficientFunds { wallet: WalletType },

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    /// Whether the caller may simply retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::AllocationFailed { .. })
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status_code, error_code, message) = match self {
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                (
                    actix_web::http::StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    msg.clone(),
                )
            }
            AppError::Checkout(err) => {
                log::warn!("Checkout rejected: {err}");
                (
                    actix_web::http::StatusCode::BAD_REQUEST,
                    "CHECKOUT_ERROR",
                    err.to_string(),
                )
            }
            AppError::CapacityExhausted { .. } => (
                actix_web::http::StatusCode::CONFLICT,
                "CAPACITY_EXHAUSTED",
                "Not enough tickets left".to_string(),
            ),
            AppError::AllocationFailed { .. } => {
                log::warn!("{self}");
                (
                    actix_web::http::StatusCode::SERVICE_UNAVAILABLE,
                    "ALLOCATION_FAILED",
                    "Could not allocate tickets, please try again".to_string(),
                )
            }
            AppError::InsufficientFunds { .. } => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "INSUFFICIENT_FUNDS",
                self.to_string(),
            ),
            AppError::AuthError(msg) => {
                log::warn!("Authentication error: {msg}");
                (
                    actix_web::http::StatusCode::UNAUTHORIZED,
                    "AUTH_ERROR",
                    msg.clone(),
                )
            }
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
            ),
            AppError::Forbidden => {
                log::warn!("Forbidden access");
                (
                    actix_web::http::StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "Forbidden".to_string(),
                )
            }
            AppError::ExternalApiError(msg) => {
                log::error!("External API error: {msg}");
                (
                    actix_web::http::StatusCode::BAD_GATEWAY,
                    "EXTERNAL_API_ERROR",
                    msg.clone(),
                )
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error".to_string(),
                )
            }
            _ => {
                log::error!("Internal error: {self}");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        HttpResponse::build(status_code).json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message
            }
        }))
    }
}
