//! Webhook 消息格式与 HTTP 发送
//!
//! callback 和 flock 渠道共用同一个消息结构（Flock 的 Message + Attachment）。

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::event::EventType;
use super::template::Rendered;

/// HTTP 请求超时时间 (秒)，关闭时进行中的投递最多等这么久
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Webhook 请求载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookMessage {
    /// 通知预览文本
    pub notification: String,
    /// 标题
    pub text: String,
    pub attachments: Vec<WebhookAttachment>,
}

/// 消息附件，正文放在 title 里
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookAttachment {
    pub title: String,
    pub color: String,
}

impl WebhookMessage {
    pub fn new(rendered: &Rendered, event_type: EventType) -> Self {
        Self {
            notification: rendered.title.clone(),
            text: rendered.title.clone(),
            attachments: vec![WebhookAttachment {
                title: rendered.body.clone(),
                color: event_type.color().to_string(),
            }],
        }
    }
}

/// 创建带超时的 HTTP 客户端
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to create HTTP client")
}

/// POST JSON，只有 200 算成功
///
/// 地址里可能带 token，错误信息去掉 URL，并压成一层
pub async fn post_json<T: Serialize + ?Sized>(client: &Client, url: &str, payload: &T) -> Result<String> {
    let response = client
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(|e| anyhow!("send request error: {}", e.without_url()))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status != StatusCode::OK {
        bail!("non-200 code returned: {}", status.as_u16());
    }
    Ok(body)
}
