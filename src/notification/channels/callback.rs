//! Callback 渠道 - 把渲染后的消息 POST 到配置的 URL

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::ConfigError;
use crate::notification::channel::NotificationChannel;
use crate::notification::event::Event;
use crate::notification::template::{TemplateConfig, TemplateSet, MESSAGE_DEFAULTS};
use crate::notification::webhook::{post_json, WebhookMessage};

/// Callback 渠道配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallbackConfig {
    /// 回调地址
    pub url: String,
    #[serde(flatten)]
    pub templates: TemplateConfig,
}

/// Callback 渠道
pub struct CallbackChannel {
    name: String,
    url: String,
    client: Client,
    templates: TemplateSet,
}

impl CallbackChannel {
    pub fn new(name: &str, config: &CallbackConfig, client: Client) -> Result<Self, ConfigError> {
        if config.url.trim().is_empty() {
            return Err(ConfigError::InvalidChannel {
                channel: name.to_string(),
                reason: "callback.url is required".to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            url: config.url.clone(),
            client,
            templates: TemplateSet::compile(name, &config.templates, MESSAGE_DEFAULTS)?,
        })
    }
}

#[async_trait]
impl NotificationChannel for CallbackChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &Event) -> Result<()> {
        let rendered = self.templates.render(event)?;
        let message = WebhookMessage::new(&rendered, event.event_type);

        match post_json(&self.client, &self.url, &message).await {
            Ok(_) => {
                debug!(channel = %self.name, key = %event.key(), "Callback delivered");
                Ok(())
            }
            Err(e) => {
                error!(channel = %self.name, error = %e, "Callback delivery failed");
                Err(e)
            }
        }
    }
}
