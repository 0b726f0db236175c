//! Telegram 渠道 - 通过 Bot API sendMessage 发送给每个 chat

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::notification::channel::{ChannelFailure, DeliveryError, NotificationChannel};
use crate::notification::event::Event;
use crate::notification::template::{TemplateConfig, TemplateSet, MESSAGE_DEFAULTS};
use crate::notification::webhook::post_json;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Chat ID：数字 ID 或 `@channel` 用户名，配置里两种写法都支持
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Name(String),
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Id(id) => write!(f, "{}", id),
            ChatId::Name(name) => f.write_str(name),
        }
    }
}

/// Telegram 渠道配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramConfig {
    /// Bot token
    pub token: String,
    /// 接收者
    pub chat_ids: Vec<ChatId>,
    /// API 地址，默认官方地址
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_base: String,
    #[serde(flatten)]
    pub templates: TemplateConfig,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a ChatId,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram 渠道
pub struct TelegramChannel {
    name: String,
    /// 带 token 的完整地址，不要打日志
    endpoint: String,
    chat_ids: Vec<ChatId>,
    client: Client,
    templates: TemplateSet,
}

impl TelegramChannel {
    pub fn new(name: &str, config: &TelegramConfig, client: Client) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidChannel {
            channel: name.to_string(),
            reason: reason.to_string(),
        };
        if config.token.trim().is_empty() {
            return Err(invalid("telegram.token is required"));
        }
        if config.chat_ids.is_empty() {
            return Err(invalid("telegram.chatIds must not be empty"));
        }

        let api_base = if config.api_base.is_empty() {
            TELEGRAM_API_BASE
        } else {
            config.api_base.trim_end_matches('/')
        };

        Ok(Self {
            name: name.to_string(),
            endpoint: format!("{}/bot{}/sendMessage", api_base, config.token),
            chat_ids: config.chat_ids.clone(),
            client,
            templates: TemplateSet::compile(name, &config.templates, MESSAGE_DEFAULTS)?,
        })
    }

    async fn send_to(&self, chat_id: &ChatId, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id,
            text,
            disable_web_page_preview: true,
        };
        let body = post_json(&self.client, &self.endpoint, &request).await?;
        let response: TelegramResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("invalid telegram response: {}", e))?;
        if !response.ok {
            return Err(anyhow!(
                "telegram api error: {}",
                response.description.unwrap_or_else(|| "unknown error".to_string())
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &Event) -> Result<()> {
        let rendered = self.templates.render(event)?;
        let text = format!("{}\n{}", rendered.title, rendered.body);

        let mut failures = Vec::new();
        for chat_id in &self.chat_ids {
            match self.send_to(chat_id, &text).await {
                Ok(()) => debug!(channel = %self.name, chat_id = %chat_id, "Telegram message sent"),
                Err(e) => {
                    warn!(channel = %self.name, chat_id = %chat_id, error = %e, "Telegram send failed");
                    failures.push(ChannelFailure {
                        target: format!("chat:{}", chat_id),
                        error: e,
                    });
                }
            }
        }
        DeliveryError::from_failures(failures)?;
        Ok(())
    }
}
