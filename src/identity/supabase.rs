//! Supabase Auth 校验
//!
//! 用 `GET {auth_url}/auth/v1/user` 校验 access token：
//! 200 返回用户信息，401/403 表示 token 无效或已过期。

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{IdentityResolver, Session};

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

pub struct SupabaseIdentity {
    client: Client,
    user_url: String,
    anon_key: Option<String>,
}

impl SupabaseIdentity {
    pub fn new(client: Client, auth_url: &str, anon_key: Option<String>) -> Self {
        Self {
            client,
            user_url: format!("{}/auth/v1/user", auth_url.trim_end_matches('/')),
            anon_key,
        }
    }
}

#[async_trait]
impl IdentityResolver for SupabaseIdentity {
    async fn resolve(&self, access_token: &str) -> anyhow::Result<Option<Session>> {
        let mut request = self.client.get(&self.user_url).bearer_auth(access_token);
        if let Some(key) = &self.anon_key {
            request = request.header("apikey", key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("请求身份服务失败: {}", self.user_url))?;

        match response.status() {
            status if status.is_success() => {
                let user: AuthUser = response.json().await.context("解析身份服务响应失败")?;
                if user.id.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Session {
                    user_id: user.id,
                    access_token: access_token.to_string(),
                }))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => anyhow::bail!("身份服务返回异常状态: {}", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode as AxumStatus},
        response::{IntoResponse, Response},
        routing::get,
    };
    use serde_json::json;

    async fn user_handler(headers: HeaderMap) -> Response {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let apikey = headers
            .get("apikey")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if apikey != "anon" {
            return AxumStatus::BAD_REQUEST.into_response();
        }
        match auth {
            "Bearer valid" => Json(json!({"id": "user-42", "email": "a@b.c"})).into_response(),
            "Bearer crash" => AxumStatus::INTERNAL_SERVER_ERROR.into_response(),
            _ => AxumStatus::UNAUTHORIZED.into_response(),
        }
    }

    async fn spawn_auth_server() -> String {
        let app = Router::new().route("/auth/v1/user", get(user_handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_valid_token_resolves_session() {
        let url = spawn_auth_server().await;
        let identity = SupabaseIdentity::new(Client::new(), &url, Some("anon".to_string()));

        let session = identity.resolve("valid").await.unwrap().unwrap();
        assert_eq!(session.user_id, "user-42");
        assert_eq!(session.access_token, "valid");
    }

    #[tokio::test]
    async fn test_rejected_token_is_none() {
        let url = spawn_auth_server().await;
        let identity = SupabaseIdentity::new(Client::new(), &url, Some("anon".to_string()));

        assert!(identity.resolve("expired").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_err() {
        let url = spawn_auth_server().await;
        let identity = SupabaseIdentity::new(Client::new(), &url, Some("anon".to_string()));

        assert!(identity.resolve("crash").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_err() {
        let identity = SupabaseIdentity::new(Client::new(), "http://127.0.0.1:1", None);
        assert!(identity.resolve("valid").await.is_err());
    }
}
