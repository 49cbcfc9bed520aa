//! 后端聊天服务客户端

use std::time::Duration;

use anyhow::Context;
use hyper::ext::ReasonPhrase;
use reqwest::Client;

use super::error::RelayError;
use super::types::UpstreamChatRequest;

/// 后端流式聊天接口的固定路径
const CHAT_STREAM_PATH: &str = "/chat/stream";

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    stream_url: String,
    response_timeout: Option<Duration>,
}

impl BackendClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            stream_url: format!("{}{}", base_url.trim_end_matches('/'), CHAT_STREAM_PATH),
            response_timeout: None,
        }
    }

    /// 设置等待响应头的超时（不影响之后的流读取）
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// 打开上游流
    ///
    /// 只发一次，不重试。非 2xx 状态原样返回为 `UpstreamRejected`。
    pub async fn open_stream(
        &self,
        request: &UpstreamChatRequest,
        access_token: &str,
    ) -> Result<reqwest::Response, RelayError> {
        let send = self
            .client
            .post(&self.stream_url)
            .bearer_auth(access_token)
            .json(request)
            .send();

        let result = match self.response_timeout {
            Some(timeout) => tokio::time::timeout(timeout, send)
                .await
                .map_err(|_| RelayError::UpstreamTimeout)?,
            None => send.await,
        };
        let response = result.with_context(|| format!("请求后端失败: {}", self.stream_url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::UpstreamRejected {
                status,
                reason: reason_phrase(&response),
            });
        }
        Ok(response)
    }
}

/// 上游响应的原始 reason phrase
///
/// hyper 只在 reason 与标准短语不同时才保留它，否则回退到标准短语。
fn reason_phrase(response: &reqwest::Response) -> String {
    if let Some(phrase) = response.extensions().get::<ReasonPhrase>() {
        return String::from_utf8_lossy(phrase.as_bytes()).into_owned();
    }
    response
        .status()
        .canonical_reason()
        .unwrap_or_default()
        .to_string()
}
