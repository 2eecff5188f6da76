//! Error types for the LedgerGuard integrity core
//!
//! Provides one error enum for every component with:
//! - HTTP status code mapping for the (external) web layer
//! - Machine-readable error codes
//! - Localized, user-displayable messages that never leak tenant ownership

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidAmount,

    // Authentication errors (2xxx)
    Unauthorized,

    // Authorization errors (3xxx)
    Forbidden,
    TenantAccess,

    // Resource errors (4xxx)
    InvoiceNotFound,

    // Conflict errors (5xxx)
    ConcurrencyConflict,
    PaymentExceedsTotal,
    InvoiceCancelled,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    DatabaseError,

    // External service errors (8xxx)
    CacheError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidAmount => 1002,

            ErrorCode::Unauthorized => 2001,

            ErrorCode::Forbidden => 3001,
            ErrorCode::TenantAccess => 3002,

            ErrorCode::InvoiceNotFound => 4001,

            ErrorCode::ConcurrencyConflict => 5001,
            ErrorCode::PaymentExceedsTotal => 5002,
            ErrorCode::InvoiceCancelled => 5003,

            ErrorCode::RateLimited => 6001,

            ErrorCode::DatabaseError => 7001,

            ErrorCode::CacheError => 8001,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Why a tenant-scoped check was refused.
///
/// Only ever logged. Every reason renders the same way to the caller so a
/// refusal never reveals which tenant owns a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantDenial {
    /// The resource does not resolve to any tenant (missing or tombstoned)
    ResourceNotFound,
    /// The resource belongs to another tenant
    ForeignTenant,
    /// A create was attempted under another tenant
    ForeignCompany,
    /// The principal is tenant-scoped but has no tenant assigned
    UnlinkedAccount,
}

impl TenantDenial {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantDenial::ResourceNotFound => "resource_not_found",
            TenantDenial::ForeignTenant => "foreign_tenant",
            TenantDenial::ForeignCompany => "foreign_company",
            TenantDenial::UnlinkedAccount => "unlinked_account",
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication / authorization
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Tenant access denied ({})", reason.as_str())]
    TenantAccess { reason: TenantDenial },

    // Ledger
    #[error("Optimistic lock exhausted after {attempts} attempts")]
    Concurrency { attempts: u32 },

    #[error("Payment amount must be positive, got {amount}")]
    InvalidAmount { amount: Decimal },

    #[error("Payment exceeds outstanding balance of {outstanding}")]
    Overpayment { outstanding: Decimal },

    #[error("Invoice is cancelled")]
    InvoiceCancelled,

    #[error("Invoice not found: {id}")]
    InvoiceNotFound { id: String },

    // Validation
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per {window_secs}s")]
    RateLimited { limit: u64, window_secs: u64 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    // External services
    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a tenant refusal
    pub fn tenant(reason: TenantDenial) -> Self {
        AppError::TenantAccess { reason }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::TenantAccess { .. } => ErrorCode::TenantAccess,
            AppError::Concurrency { .. } => ErrorCode::ConcurrencyConflict,
            AppError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            AppError::Overpayment { .. } => ErrorCode::PaymentExceedsTotal,
            AppError::InvoiceCancelled => ErrorCode::InvoiceCancelled,
            AppError::InvoiceNotFound { .. } => ErrorCode::InvoiceNotFound,
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::CacheError { .. } => ErrorCode::CacheError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::InvalidAmount { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found (tenant refusals included, see TenantDenial)
            AppError::TenantAccess { .. }
            | AppError::InvoiceNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Concurrency { .. } => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            AppError::Overpayment { .. }
            | AppError::InvoiceCancelled => StatusCode::UNPROCESSABLE_ENTITY,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 503 Service Unavailable
            AppError::CacheError { .. }
            | AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Localized message safe to show to end users
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthorized { .. } => "Oturum açmanız gerekiyor.".to_string(),
            AppError::Forbidden { .. } => "Bu işlem için yetkiniz yok.".to_string(),
            AppError::TenantAccess {
                reason: TenantDenial::UnlinkedAccount,
            } => "Hesabınız bir firmaya bağlı değil.".to_string(),
            AppError::TenantAccess { .. } => {
                "Kaynak bulunamadı veya bu kaynağa erişim yetkiniz yok.".to_string()
            }
            AppError::Concurrency { .. } => {
                "Eşzamanlı işlem hatası, lütfen tekrar deneyin.".to_string()
            }
            AppError::InvalidAmount { .. } => "Ödeme tutarı sıfırdan büyük olmalıdır.".to_string(),
            AppError::Overpayment { .. } => "Ödeme tutarı fatura toplamını aşamaz.".to_string(),
            AppError::InvoiceCancelled => "İptal edilmiş faturaya ödeme yapılamaz.".to_string(),
            AppError::InvoiceNotFound { .. } => "Fatura bulunamadı veya silinmiş.".to_string(),
            AppError::Validation { message, .. } => message.clone(),
            AppError::RateLimited { .. } => {
                "Çok fazla istek gönderdiniz. Lütfen daha sonra tekrar deneyin.".to_string()
            }
            AppError::ServiceUnavailable { .. } | AppError::CacheError { .. } => {
                "Servis şu anda kullanılamıyor, lütfen tekrar deneyin.".to_string()
            }
            _ => "Beklenmeyen bir hata oluştu.".to_string(),
        }
    }

    /// Whether resubmitting the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Concurrency { .. } | AppError::ServiceUnavailable { .. }
        )
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // The internal text (including tenant denial reasons) is logged, never returned
        if self.is_server_error() {
            tracing::error!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %self,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message: self.user_message(),
                retryable: self.is_retryable(),
                request_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

/// `{success, data | error}` result shape handed back to the web layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionError {
    /// Localized, user-displayable text
    pub message: String,
    /// Internal error class
    pub code: ErrorCode,
}

impl<T> From<Result<T>> for ActionResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => ActionResult {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(err) => {
                if err.is_server_error() {
                    tracing::error!(error = %err, code = ?err.code(), "Action failed");
                }
                ActionResult {
                    success: false,
                    data: None,
                    error: Some(ActionError {
                        message: err.user_message(),
                        code: err.code(),
                    }),
                }
            }
        }
    }
}
