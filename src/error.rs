use crate::models::TypedApiError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient credits: required {required}, current {current}")]
    InsufficientCredits {
        required: i64,
        current: i64,
        missing: i64,
    },

    #[error("Generation API error: {message}")]
    GenerationApiError { message: String, refunded: bool },

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    /// 上游返回非 2xx，按原状态码透传
    #[error("Upstream error ({status}): {message}")]
    UpstreamError { status: u16, message: String },

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

/// 状态码 -> 错误类型（任务状态接口使用）
pub fn error_type_for(status: u16) -> &'static str {
    match status {
        400 => "invalid_request_error",
        401 => "authentication_error",
        402 => "payment_required",
        403 => "permission_error",
        404 => "not_found_error",
        429 => "rate_limit_error",
        500 => "server_error",
        502 => "bad_gateway",
        _ => "unknown_error",
    }
}

impl AppError {
    fn error_code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            AppError::GenerationApiError { .. } => "GENERATION_API_ERROR",
            AppError::AuthError(_) | AppError::JwtError(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden => "FORBIDDEN",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            AppError::ExternalApiError(_) | AppError::UpstreamError { .. } => "EXTERNAL_API_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ConfigError(_) => "CONFIG_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// 对外可见的错误信息；数据库与内部错误不暴露细节
    fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg)
            | AppError::MalformedPayload(msg)
            | AppError::ExternalApiError(msg) => msg.clone(),
            AppError::InsufficientCredits { .. } => "Insufficient credits".to_string(),
            AppError::GenerationApiError { message, .. } => message.clone(),
            AppError::UpstreamError { message, .. } => message.clone(),
            AppError::JwtError(_) => "Invalid access token".to_string(),
            AppError::Forbidden => "Forbidden".to_string(),
            AppError::InvalidSignature => "Invalid signature".to_string(),
            AppError::DatabaseError(_) => "Database error".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg) => log::warn!("Validation error: {msg}"),
            AppError::AuthError(msg) => log::warn!("Authentication error: {msg}"),
            AppError::InsufficientCredits {
                required, current, ..
            } => log::info!("Insufficient credits: required={required} current={current}"),
            AppError::Forbidden => log::warn!("Forbidden access"),
            AppError::InvalidSignature => log::warn!("Rejected webhook with invalid signature"),
            AppError::NotFound(_) => {}
            AppError::GenerationApiError { message, refunded } => {
                log::error!("Generation API error (refunded={refunded}): {message}")
            }
            AppError::ExternalApiError(msg) => log::error!("External API error: {msg}"),
            AppError::UpstreamError { status, message } => {
                log::error!("Upstream error {status}: {message}")
            }
            AppError::DatabaseError(err) => log::error!("Database error: {err}"),
            _ => log::error!("Internal error: {self}"),
        }
    }

    /// `{error:{code,message,type}}` 形式，供任务状态接口使用
    pub fn typed_error_response(&self) -> HttpResponse {
        self.log();
        let status = self.status_code();
        HttpResponse::build(status).json(json!({
            "error": TypedApiError {
                code: status.as_u16(),
                message: self.public_message(),
                error_type: error_type_for(status.as_u16()).to_string(),
            }
        }))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) | AppError::JwtError(_) | AppError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            AppError::InsufficientCredits { .. } | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ExternalApiError(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.log();

        let mut body = json!({
            "success": false,
            "code": self.error_code(),
            "error": self.public_message(),
        });
        match self {
            AppError::InsufficientCredits {
                required,
                current,
                missing,
            } => {
                body["data"] = json!({
                    "required": required,
                    "current": current,
                    "missing": missing,
                });
            }
            AppError::GenerationApiError { refunded, .. } => {
                body["refunded"] = json!(refunded);
            }
            _ => {}
        }

        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_credits_is_forbidden() {
        let err = AppError::InsufficientCredits {
            required: 20,
            current: 0,
            missing: 20,
        };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_upstream_status_is_passed_through() {
        let err = AppError::UpstreamError {
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error_type_for(429), "rate_limit_error");
        assert_eq!(error_type_for(418), "unknown_error");
    }

    #[test]
    fn test_generation_failure_maps_to_500() {
        let err = AppError::GenerationApiError {
            message: "boom".into(),
            refunded: true,
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
