//! 调用方身份解析

mod cache;
mod supabase;

use async_trait::async_trait;

pub use cache::CachedIdentity;
pub use supabase::SupabaseIdentity;

/// 已认证的会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    /// 转发给后端的 access token
    pub access_token: String,
}

/// 身份解析器
///
/// 给定请求携带的凭据，返回会话；凭据无效时返回 `Ok(None)`。
/// `Err` 仅表示身份服务本身不可用。
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, access_token: &str) -> anyhow::Result<Option<Session>>;
}
