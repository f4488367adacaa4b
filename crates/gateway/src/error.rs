//! # Gateway エラー型
//!
//! Coreのエラーをステータスコードと `{"statusCode", "message"}` 形式のJSONに変換する。

use axum::http::StatusCode;
use axum::Json;
use signlink_core::{CoreError, RepositoryError};

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Coreの処理結果
    #[error(transparent)]
    Core(#[from] CoreError),
    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Core(core) => match core {
                CoreError::NotFound(_)
                | CoreError::TokenInvalid
                | CoreError::NoContractImage(_)
                | CoreError::Repository(RepositoryError::ContractNotFound(_)) => {
                    StatusCode::NOT_FOUND
                }
                CoreError::NotSignable { .. } | CoreError::Compositing(_) => {
                    StatusCode::BAD_REQUEST
                }
                CoreError::AlreadySigned(_) => StatusCode::CONFLICT,
                CoreError::FetchFailed { .. } => StatusCode::BAD_GATEWAY,
                CoreError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
                CoreError::Repository(_) | CoreError::Storage(_) | CoreError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, status = status.as_u16(), "リクエスト処理に失敗しました");
        }
        let body = serde_json::json!({
            "statusCode": status.as_u16(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
