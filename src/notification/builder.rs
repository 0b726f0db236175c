//! 通知系统构建器 - 校验配置、构造渠道、生成 dispatcher

use reqwest::Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

use super::channel::NotificationChannel;
use super::channels::{CallbackChannel, FlockChannel, GroupChannel, PrintChannel, TelegramChannel};
use super::dispatcher::NotificationDispatcher;
use super::webhook::{build_http_client, DEFAULT_HTTP_TIMEOUT_SECS};
use crate::config::{resolve_policies, ChannelConfig, ChannelType, Config, ConfigError};

/// 渠道名 → 渠道实例，setup 之后只读
#[derive(Default, Clone)]
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn NotificationChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置构造所有渠道（group 成员先构造，共享同一个实例）
    pub fn from_config(
        channels: &BTreeMap<String, ChannelConfig>,
        client: Client,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for name in channels.keys() {
            registry.build(name, channels, &client, &mut Vec::new())?;
        }
        Ok(registry)
    }

    fn build(
        &mut self,
        name: &str,
        configs: &BTreeMap<String, ChannelConfig>,
        client: &Client,
        visiting: &mut Vec<String>,
    ) -> Result<Arc<dyn NotificationChannel>, ConfigError> {
        if let Some(channel) = self.channels.get(name) {
            return Ok(channel.clone());
        }
        if visiting.iter().any(|v| v == name) {
            visiting.push(name.to_string());
            return Err(ConfigError::GroupCycle(visiting.join(" -> ")));
        }
        let config = configs.get(name).ok_or_else(|| ConfigError::UnknownChannel {
            name: name.to_string(),
            location: format!(".channels.{}.group", visiting.last().map(String::as_str).unwrap_or("")),
        })?;
        config.check_payload(name)?;

        let missing = || ConfigError::MissingChannelPayload {
            name: name.to_string(),
            channel_type: config.channel_type.to_string(),
        };
        let channel: Arc<dyn NotificationChannel> = match config.channel_type {
            ChannelType::Callback => {
                let payload = config.callback.as_ref().ok_or_else(missing)?;
                Arc::new(CallbackChannel::new(name, payload, client.clone())?)
            }
            ChannelType::Print => {
                let payload = config.print.as_ref().ok_or_else(missing)?;
                Arc::new(PrintChannel::new(name, payload)?)
            }
            ChannelType::Telegram => {
                let payload = config.telegram.as_ref().ok_or_else(missing)?;
                Arc::new(TelegramChannel::new(name, payload, client.clone())?)
            }
            ChannelType::Flock => {
                let payload = config.flock.as_ref().ok_or_else(missing)?;
                Arc::new(FlockChannel::new(name, payload, client.clone())?)
            }
            ChannelType::Group => {
                let member_names = config.group.as_ref().ok_or_else(missing)?;
                visiting.push(name.to_string());
                let mut members = Vec::with_capacity(member_names.len());
                for member in member_names {
                    members.push(self.build(member, configs, client, visiting)?);
                }
                visiting.pop();
                Arc::new(GroupChannel::new(name, members))
            }
        };

        info!(channel = name, channel_type = %config.channel_type, "Registering notification channel");
        self.channels.insert(name.to_string(), channel.clone());
        Ok(channel)
    }

    /// 注册渠道（自定义渠道或测试使用）
    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        info!(channel = channel.name(), "Registering notification channel");
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn NotificationChannel>> {
        self.channels.get(name)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// 已注册的渠道名称（排序后）
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// 通知系统构建器
pub struct NotificationBuilder {
    config: Config,
    http_timeout_secs: u64,
    dry_run: bool,
}

impl NotificationBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 设置 HTTP 超时（秒）
    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.http_timeout_secs = secs;
        self
    }

    /// 校验配置并构建 dispatcher，任何配置错误都让整个 setup 失败
    pub fn build(self) -> Result<NotificationDispatcher, ConfigError> {
        let policies = resolve_policies(&self.config)?;

        let client = build_http_client(self.http_timeout_secs).map_err(|e| {
            ConfigError::InvalidChannel {
                channel: "*".to_string(),
                reason: format!("{:#}", e),
            }
        })?;
        let channels = ChannelRegistry::from_config(&self.config.channels, client)?;

        info!(
            resources = policies.len(),
            channels = channels.len(),
            "Notification dispatcher ready"
        );
        Ok(NotificationDispatcher::new(policies, channels).with_dry_run(self.dry_run))
    }
}
