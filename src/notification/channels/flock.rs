//! Flock 渠道 - 通过 incoming webhook 发送消息
//!
//! 每个接收者（Flock channel / 用户）对应一个 webhook URL。

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::notification::channel::{ChannelFailure, DeliveryError, NotificationChannel};
use crate::notification::event::Event;
use crate::notification::template::{TemplateConfig, TemplateSet, MESSAGE_DEFAULTS};
use crate::notification::webhook::{post_json, WebhookMessage};

/// Flock 渠道配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlockConfig {
    /// Incoming webhook 地址，每个接收者一个
    pub urls: Vec<String>,
    #[serde(flatten)]
    pub templates: TemplateConfig,
}

/// Flock 渠道
pub struct FlockChannel {
    name: String,
    urls: Vec<String>,
    client: Client,
    templates: TemplateSet,
}

impl FlockChannel {
    pub fn new(name: &str, config: &FlockConfig, client: Client) -> Result<Self, ConfigError> {
        if config.urls.iter().all(|u| u.trim().is_empty()) {
            return Err(ConfigError::InvalidChannel {
                channel: name.to_string(),
                reason: "flock.urls must not be empty".to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            urls: config
                .urls
                .iter()
                .filter(|u| !u.trim().is_empty())
                .cloned()
                .collect(),
            client,
            templates: TemplateSet::compile(name, &config.templates, MESSAGE_DEFAULTS)?,
        })
    }
}

#[async_trait]
impl NotificationChannel for FlockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &Event) -> Result<()> {
        let rendered = self.templates.render(event)?;
        let message = WebhookMessage::new(&rendered, event.event_type);

        let mut failures = Vec::new();
        // webhook URL 里带 token，日志只记下标
        for (index, url) in self.urls.iter().enumerate() {
            match post_json(&self.client, url, &message).await {
                Ok(_) => debug!(channel = %self.name, recipient = index, "Flock message sent"),
                Err(e) => {
                    warn!(channel = %self.name, recipient = index, error = %e, "Flock send failed");
                    failures.push(ChannelFailure {
                        target: format!("urls[{}]", index),
                        error: e,
                    });
                }
            }
        }
        DeliveryError::from_failures(failures)?;
        Ok(())
    }
}
