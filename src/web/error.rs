//! HTTP错误类型

use crate::core::analysis::AnalysisError;
use crate::core::classifier::ClassifierError;
use crate::core::resolver::{ResolveError, RuleEditError};
use crate::core::upload::UploadError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("Bad upstream response: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            ApiError::ClassificationUnavailable(msg) => {
                tracing::warn!("分类服务不可用: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Classification service is unavailable, please try again".to_string(),
                )
            }
            ApiError::BadGateway(msg) => {
                tracing::error!("视觉模型响应异常: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Classification service returned an unusable response".to_string(),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<ResolveError> for ApiError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::UnknownCategory(_) => ApiError::BadRequest(e.to_string()),
            ResolveError::NoRuleConfigured { .. } => {
                // 数据完整性问题，不作为正常结果展示给用户
                tracing::error!("处置规则配置缺失: {}", e);
                ApiError::Internal(anyhow::Error::new(e))
            }
        }
    }
}

impl From<RuleEditError> for ApiError {
    fn from(e: RuleEditError) -> Self {
        match e {
            RuleEditError::NationalRuleRequired(_) => ApiError::Conflict(e.to_string()),
            RuleEditError::UnknownCategory(_) | RuleEditError::EmptyField(_) => {
                ApiError::BadRequest(e.to_string())
            }
        }
    }
}

impl From<ClassifierError> for ApiError {
    fn from(e: ClassifierError) -> Self {
        match e {
            ClassifierError::Unavailable(_) => ApiError::ClassificationUnavailable(e.to_string()),
            ClassifierError::Rejected { .. } | ClassifierError::InvalidResponse(_) => {
                ApiError::BadGateway(e.to_string())
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::TooLarge { .. } => ApiError::PayloadTooLarge(e.to_string()),
            UploadError::Io(io) => ApiError::Internal(anyhow::Error::new(io)),
            _ => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        match e {
            AnalysisError::MissingState => ApiError::BadRequest(e.to_string()),
            AnalysisError::Upload(e) => e.into(),
            AnalysisError::Classifier(e) => e.into(),
            AnalysisError::Resolve(e) => e.into(),
            AnalysisError::History(e) => ApiError::Internal(e),
        }
    }
}
