mod common;
mod http_client;
mod identity;
mod model;
mod relay;

use std::sync::Arc;

use clap::Parser;
use identity::{CachedIdentity, IdentityResolver, SupabaseIdentity};
use model::arg::Args;
use model::config::Config;
use relay::{AppState, BackendClient};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = args
        .config
        .unwrap_or_else(|| Config::default_config_path().to_string());
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        tracing::error!("加载配置失败: {}", e);
        std::process::exit(1);
    });

    let Some(auth_url) = config.auth_url.clone() else {
        tracing::error!("未设置身份服务地址（authUrl 或 SUPABASE_URL）");
        std::process::exit(1);
    };

    let proxy_config = config.proxy_url.as_ref().map(|url| {
        let mut proxy = http_client::ProxyConfig::new(url);
        if let (Some(username), Some(password)) = (&config.proxy_username, &config.proxy_password) {
            proxy = proxy.with_auth(username, password);
        }
        proxy
    });

    let client = http_client::build_client(proxy_config.as_ref(), config.upstream_connect_timeout())
        .unwrap_or_else(|e| {
            tracing::error!("创建 HTTP 客户端失败: {:?}", e);
            std::process::exit(1);
        });

    let supabase: Arc<dyn IdentityResolver> = Arc::new(SupabaseIdentity::new(
        client.clone(),
        &auth_url,
        config.auth_anon_key.clone(),
    ));
    let identity: Arc<dyn IdentityResolver> = match config.session_cache_ttl() {
        Some(ttl) => {
            let cached = Arc::new(CachedIdentity::new(supabase, ttl));

            // 后台清理过期会话
            let cleanup = cached.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
                loop {
                    interval.tick().await;
                    let expired = cleanup.cleanup_expired();
                    if expired > 0 {
                        tracing::debug!("会话缓存清理: 移除 {} 个过期会话", expired);
                    }
                }
            });
            cached as Arc<dyn IdentityResolver>
        }
        None => supabase,
    };

    let backend = BackendClient::new(client, config.effective_backend_url())
        .with_response_timeout(config.upstream_response_timeout());
    tracing::info!("后端地址: {}", backend.stream_url());
    tracing::info!(
        "ping 保活间隔: {}s, 等待后端响应上限: {}",
        config.keep_alive_interval().as_secs(),
        config
            .upstream_response_timeout()
            .map(|t| format!("{}s", t.as_secs()))
            .unwrap_or_else(|| "不限".to_string())
    );

    let state = AppState::new(identity, backend)
        .with_session_cookie(config.session_cookie.clone())
        .with_keep_alive(config.keep_alive_interval());
    let app = relay::create_router(state, config.max_body_size);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("启动服务: {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("监听 {} 失败: {}", addr, e);
            std::process::exit(1);
        });
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("服务异常退出: {}", e);
        std::process::exit(1);
    }
}
