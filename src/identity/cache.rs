use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{IdentityResolver, Session};

/// 缓存条目上限，超过后先清理过期条目
const MAX_CACHED_SESSIONS: usize = 10_000;

#[derive(Debug, Clone)]
struct CachedSession {
    session: Session,
    expires_at: DateTime<Utc>,
}

/// 带短期缓存的身份解析器
///
/// 只缓存成功解析的会话；无效凭据和身份服务错误都不缓存。
pub struct CachedIdentity {
    inner: Arc<dyn IdentityResolver>,
    ttl: chrono::Duration,
    sessions: Mutex<HashMap<String, CachedSession>>,
}

impl CachedIdentity {
    pub fn new(inner: Arc<dyn IdentityResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52)),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lookup(&self, token: &str) -> Option<Session> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        match sessions.get(token) {
            Some(cached) if cached.expires_at > now => Some(cached.session.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    fn store(&self, token: &str, session: &Session) {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        if sessions.len() >= MAX_CACHED_SESSIONS {
            sessions.retain(|_, s| s.expires_at > now);
            if sessions.len() >= MAX_CACHED_SESSIONS {
                sessions.clear();
            }
        }
        sessions.insert(
            token.to_string(),
            CachedSession {
                session: session.clone(),
                expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
    }

    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }
}

#[async_trait]
impl IdentityResolver for CachedIdentity {
    async fn resolve(&self, access_token: &str) -> anyhow::Result<Option<Session>> {
        if let Some(session) = self.lookup(access_token) {
            return Ok(Some(session));
        }
        let resolved = self.inner.resolve(access_token).await?;
        if let Some(session) = &resolved {
            self.store(access_token, session);
        }
        Ok(resolved)
    }
}
