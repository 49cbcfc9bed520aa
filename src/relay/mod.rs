//! 聊天流中继
//!
//! 认证调用方 → 请求后端 `/chat/stream` → 转发字节流并插入 ping 保活

pub mod error;
mod handlers;
pub mod middleware;
mod router;
pub mod stream;
pub mod types;
pub mod upstream;


pub use middleware::AppState;
pub use router::create_router;
pub use upstream::BackendClient;
