//! 出站 HTTP 客户端构建

use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Proxy};

/// 出站代理配置
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// 构建共享的 reqwest Client
///
/// 只设置连接超时：整体超时会截断长时间运行的流式响应。
pub fn build_client(proxy: Option<&ProxyConfig>, connect_timeout: Duration) -> anyhow::Result<Client> {
    let mut builder = Client::builder()
        .use_rustls_tls()
        .connect_timeout(connect_timeout)
        .tcp_keepalive(Duration::from_secs(30));

    if let Some(proxy_config) = proxy {
        let mut proxy = Proxy::all(&proxy_config.url)
            .with_context(|| format!("无效的代理地址: {}", proxy_config.url))?;
        if let (Some(username), Some(password)) = (&proxy_config.username, &proxy_config.password) {
            proxy = proxy.basic_auth(username, password);
        }
        builder = builder.proxy(proxy);
        tracing::info!("出站请求使用代理: {}", proxy_config.url);
    }

    builder.build().context("创建 HTTP 客户端失败")
}
