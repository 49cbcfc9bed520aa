//! 中继 API middleware

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::common::auth;
use crate::identity::{IdentityResolver, Session};

use super::error::RelayError;
use super::upstream::BackendClient;

#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityResolver>,
    pub backend: BackendClient,
    pub session_cookie: String,
    pub keep_alive: Duration,
}

impl AppState {
    pub fn new(identity: Arc<dyn IdentityResolver>, backend: BackendClient) -> Self {
        Self {
            identity,
            backend,
            session_cookie: "sb-access-token".to_string(),
            keep_alive: Duration::from_secs(20),
        }
    }

    pub fn with_session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = name.into();
        self
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }
}

/// 解析调用方身份，成功后把 [`Session`] 放入请求扩展
///
/// 没有凭据或会话无效时直接返回 401，不会触达后端。
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = auth::extract_access_token(request.headers(), &state.session_cookie) else {
        tracing::debug!("请求未携带凭据");
        return RelayError::AuthenticationMissing.into_response();
    };

    let session: Session = match state.identity.resolve(&token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            tracing::debug!("会话无效或已过期");
            return RelayError::AuthenticationMissing.into_response();
        }
        Err(e) => return RelayError::Internal(e.context("身份解析失败")).into_response(),
    };

    request.extensions_mut().insert(session);
    next.run(request).await
}

pub fn cors_layer() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{Any, CorsLayer};

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
