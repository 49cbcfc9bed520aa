use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 后端聊天服务的生产地址（未通过环境变量或配置文件指定时使用）
pub const DEFAULT_BACKEND_URL: &str = "https://api.workbook.chat";

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// 后端聊天服务地址（环境变量 BACKEND_URL 优先）
    #[serde(default)]
    pub backend_url: Option<String>,

    /// 身份服务地址（环境变量 SUPABASE_URL 优先）
    #[serde(default)]
    pub auth_url: Option<String>,

    /// 身份服务 anon key（环境变量 SUPABASE_ANON_KEY 优先）
    #[serde(default)]
    pub auth_anon_key: Option<String>,

    /// 存放 access token 的 Cookie 名称
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// 会话缓存时长（秒），0 表示每次请求都向身份服务校验
    #[serde(default = "default_session_cache_ttl_secs")]
    pub session_cache_ttl_secs: u64,

    /// ping 保活间隔（秒）
    #[serde(default = "default_keep_alive_interval_secs")]
    pub keep_alive_interval_secs: u64,

    #[serde(default = "default_upstream_connect_timeout_secs")]
    pub upstream_connect_timeout_secs: u64,

    /// 等待上游响应头的最长时间（秒），0 表示不限制
    #[serde(default = "default_upstream_response_timeout_secs")]
    pub upstream_response_timeout_secs: u64,

    /// HTTP 代理地址（可选）
    /// 支持格式: http://host:port, https://host:port, socks5://host:port
    #[serde(default)]
    pub proxy_url: Option<String>,

    #[serde(default)]
    pub proxy_username: Option<String>,

    #[serde(default)]
    pub proxy_password: Option<String>,

    /// 请求体大小上限（字节）
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_session_cookie() -> String {
    "sb-access-token".to_string()
}

fn default_session_cache_ttl_secs() -> u64 {
    60
}

fn default_keep_alive_interval_secs() -> u64 {
    20
}

fn default_upstream_connect_timeout_secs() -> u64 {
    10
}

fn default_upstream_response_timeout_secs() -> u64 {
    60
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backend_url: None,
            auth_url: None,
            auth_anon_key: None,
            session_cookie: default_session_cookie(),
            session_cache_ttl_secs: default_session_cache_ttl_secs(),
            keep_alive_interval_secs: default_keep_alive_interval_secs(),
            upstream_connect_timeout_secs: default_upstream_connect_timeout_secs(),
            upstream_response_timeout_secs: default_upstream_response_timeout_secs(),
            proxy_url: None,
            proxy_username: None,
            proxy_password: None,
            max_body_size: default_max_body_size(),
        }
    }
}

impl Config {
    /// 获取默认配置文件路径
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// 从文件加载配置，并应用环境变量覆盖
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            // 配置文件不存在，使用默认配置
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// 用环境变量覆盖对应字段（空值视为未设置）
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("BACKEND_URL") {
            self.backend_url = Some(url);
        }
        if let Some(url) = lookup("SUPABASE_URL") {
            self.auth_url = Some(url);
        }
        if let Some(key) = lookup("SUPABASE_ANON_KEY") {
            self.auth_anon_key = Some(key);
        }
    }

    /// 获取有效的后端地址（去掉末尾的 `/`）
    pub fn effective_backend_url(&self) -> &str {
        self.backend_url
            .as_deref()
            .unwrap_or(DEFAULT_BACKEND_URL)
            .trim_end_matches('/')
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs.max(1))
    }

    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout_secs)
    }

    pub fn upstream_response_timeout(&self) -> Option<Duration> {
        (self.upstream_response_timeout_secs > 0)
            .then(|| Duration::from_secs(self.upstream_response_timeout_secs))
    }

    pub fn session_cache_ttl(&self) -> Option<Duration> {
        (self.session_cache_ttl_secs > 0).then(|| Duration::from_secs(self.session_cache_ttl_secs))
    }
}
