use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use herqles_core::HerqlesError;
use serde_json::json;
use tracing::error;

/// REST错误响应：`{"status": <code>, "message": <text>}`
#[derive(Debug)]
pub struct ApiError(pub HerqlesError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<HerqlesError> for ApiError {
    fn from(err: HerqlesError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!("请求处理失败: {}", self.0);
        }

        (
            status,
            Json(json!({
                "status": status.as_u16(),
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_error_code() {
        let response = ApiError(HerqlesError::MissingToken).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError(HerqlesError::TaskNotFound { id: 7 }).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError(HerqlesError::Rejected {
            code: 403,
            message: "denied".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
