//! 中继 Handler 函数

use axum::{
    body::{Body, Bytes},
    extract::{Extension, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::Instrument;
use uuid::Uuid;

use crate::identity::Session;

use super::error::RelayError;
use super::middleware::AppState;
use super::stream::relay_stream;
use super::types::ChatRequest;

/// GET /health
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// POST /api/chat/stream
///
/// 把后端 `/chat/stream` 的 SSE 字节流原样转发给调用方，
/// 静默期间插入 ping 保活帧。
pub async fn post_chat_stream(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chat_stream", %request_id, user_id = %session.user_id);

    async move {
        match open_relay(&state, session, &body).await {
            Ok(response) => response,
            Err(e) => {
                if let RelayError::UpstreamRejected { status, .. } = &e {
                    tracing::warn!(%status, "后端拒绝请求");
                }
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn open_relay(state: &AppState, session: Session, body: &[u8]) -> Result<Response, RelayError> {
    let payload: ChatRequest = serde_json::from_slice(body)?;
    tracing::info!(
        mode = ?payload.mode,
        workbook_id = %payload.workbook_id,
        sheet_id = %payload.sheet_id,
        model = payload.model.as_deref().unwrap_or("default"),
        "收到聊天流请求"
    );

    let upstream_request = payload.into_upstream(session.user_id);
    let upstream = state
        .backend
        .open_stream(&upstream_request, &session.access_token)
        .await?;

    // 上游已成功响应，开始转发
    let (stream, _pump) = relay_stream(upstream.bytes_stream(), state.keep_alive);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .map_err(|e| RelayError::Internal(e.into()))
}
