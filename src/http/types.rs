//! API response envelope and error mapping

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{EngineError, ErrorKind};

/// Unified API response wrapper
///
/// - code: `"OK"` on success, otherwise the stable engine error code
/// - msg / msg_ar: English and Arabic message
/// - data: present on success only
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: &'static str,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_ar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: "OK",
            msg: "ok".to_string(),
            msg_ar: None,
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(err: &EngineError) -> Self {
        Self {
            code: err.code(),
            msg: err.to_string(),
            msg_ar: Some(err.message_ar()),
            data: None,
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// Engine error on its way out as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self.0.kind() {
            ErrorKind::Storage | ErrorKind::ExternalService => {
                error!(code = self.0.code(), error = %self.0, "Request failed")
            }
            _ => warn!(code = self.0.code(), error = %self.0, "Request rejected"),
        }
        (status, Json(ApiResponse::error(&self.0))).into_response()
    }
}
