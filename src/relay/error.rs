//! 中继错误及其 HTTP 映射
//!
//! 只覆盖流打开之前的错误；流打开后的失败通过中断响应体通知客户端。

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use hyper::ext::ReasonPhrase;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("missing or invalid session")]
    AuthenticationMissing,

    #[error("invalid chat request: {0}")]
    InvalidRequest(#[from] serde_json::Error),

    #[error("backend rejected request: {status}")]
    UpstreamRejected { status: StatusCode, reason: String },

    #[error("backend did not respond in time")]
    UpstreamTimeout,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn plain_text(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body.into(),
    )
        .into_response()
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::AuthenticationMissing => plain_text(StatusCode::UNAUTHORIZED, "Unauthorized"),
            RelayError::InvalidRequest(e) => {
                tracing::debug!(error = %e, "请求体解析失败");
                plain_text(StatusCode::BAD_REQUEST, "Invalid request body")
            }
            RelayError::UpstreamRejected { status, reason } => {
                let mut response = plain_text(status, format!("Backend error: {}", reason));
                if status.canonical_reason() != Some(reason.as_str()) {
                    if let Ok(phrase) = ReasonPhrase::try_from(reason.as_bytes()) {
                        response.extensions_mut().insert(phrase);
                    }
                }
                response
            }
            RelayError::UpstreamTimeout => plain_text(StatusCode::GATEWAY_TIMEOUT, "Backend timeout"),
            RelayError::Internal(e) => {
                tracing::error!(error = ?e, "中继内部错误");
                plain_text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}
