//! 聊天请求类型定义

use serde::{Deserialize, Serialize};

/// 聊天模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Ask,
    Analyst,
}

/// 浏览器发来的聊天请求
///
/// 请求体里的 `user_id` 不会被读取，用户身份只来自会话。
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub mode: ChatMode,
    pub message: String,
    #[serde(rename = "wid")]
    pub workbook_id: String,
    #[serde(rename = "sid")]
    pub sheet_id: String,
    /// 上下文列表，原样转发；缺省或 `null` 视为空列表
    #[serde(default)]
    pub contexts: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ChatRequest {
    /// 合并会话中的 user_id，生成发给后端的请求
    pub fn into_upstream(self, user_id: impl Into<String>) -> UpstreamChatRequest {
        UpstreamChatRequest {
            mode: self.mode,
            message: self.message,
            workbook_id: self.workbook_id,
            sheet_id: self.sheet_id,
            contexts: self.contexts.unwrap_or_default(),
            model: self.model,
            user_id: user_id.into(),
        }
    }
}

/// 发给后端 `/chat/stream` 的请求体
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChatRequest {
    pub mode: ChatMode,
    pub message: String,
    #[serde(rename = "wid")]
    pub workbook_id: String,
    #[serde(rename = "sid")]
    pub sheet_id: String,
    pub contexts: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub user_id: String,
}
