//! 中继 API router

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use super::{
    handlers::{health, post_chat_stream},
    middleware::{AppState, auth_middleware, cors_layer},
};

pub fn create_router(state: AppState, max_body_size: usize) -> Router {
    let chat_routes = Router::new()
        .route("/chat/stream", post(post_chat_stream))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api", chat_routes)
        .layer(cors_layer())
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
