//! 通知分发器 - 按资源的生效策略过滤事件并路由到渠道
//!
//! 每个事件的处理流程：
//! 1. 查找资源策略，没有配置的资源直接丢弃
//! 2. 事件类型对应的开关关闭则丢弃
//! 3. UPDATED 且配置了 `updateOn`：列出的字段都没变化则丢弃
//! 4. 投递到策略里的每个渠道，失败汇总后一起返回
//!
//! 分发器本身无状态，策略表和渠道表在 setup 后只读。
//! 重试由调用方（watcher）负责。

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::builder::ChannelRegistry;
use super::channel::{ChannelFailure, DeliveryError, NotificationChannel};
use super::event::{Event, EventType};
use crate::config::{EffectivePolicy, PolicyTable, ResourceKey};

/// 事件被丢弃的原因（不是错误）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// 资源未配置
    UnknownResource,
    /// 事件类型的通知开关未开启
    TriggerDisabled,
    /// `updateOn` 中的字段都没有变化
    NoWatchedFieldChanged,
    /// 策略里没有渠道
    NoChannels,
}

/// 分发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 已投递到这些渠道
    Delivered(Vec<String>),
    /// 已丢弃
    Dropped(DropReason),
    /// dry-run 模式，只记录会投递到哪些渠道
    DryRun(Vec<String>),
}

/// 通知分发器
pub struct NotificationDispatcher {
    policies: PolicyTable,
    channels: ChannelRegistry,
    /// 是否为 dry-run 模式
    dry_run: bool,
}

impl NotificationDispatcher {
    pub fn new(policies: PolicyTable, channels: ChannelRegistry) -> Self {
        Self {
            policies,
            channels,
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn policy(&self, key: &ResourceKey) -> Option<&EffectivePolicy> {
        self.policies.get(key)
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn channel(&self, name: &str) -> Option<&Arc<dyn NotificationChannel>> {
        self.channels.get(name)
    }

    /// 获取已注册的渠道数量
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// 获取已注册的渠道名称
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.names()
    }

    /// 不投递的原因，`None` 表示需要投递
    fn filter(policy: &EffectivePolicy, event: &Event) -> Option<DropReason> {
        let enabled = match event.event_type {
            EventType::Added => policy.notice_when_added,
            EventType::Deleted => policy.notice_when_deleted,
            EventType::Updated => policy.notice_when_updated,
        };
        if !enabled {
            return Some(DropReason::TriggerDisabled);
        }
        if event.event_type == EventType::Updated
            && !policy.update_on.is_empty()
            && !event.fields_changed(&policy.update_on)
        {
            return Some(DropReason::NoWatchedFieldChanged);
        }
        if policy.channel_names.is_empty() {
            return Some(DropReason::NoChannels);
        }
        None
    }

    /// 处理一个事件
    ///
    /// 丢弃不是错误；只有投递失败才返回 [`DeliveryError`]，其中包含所有失败的渠道。
    pub async fn dispatch(
        &self,
        key: &ResourceKey,
        event: &Event,
    ) -> Result<DispatchOutcome, DeliveryError> {
        let Some(policy) = self.policies.get(key) else {
            debug!(resource = %key, "No policy for resource, dropping event");
            return Ok(DispatchOutcome::Dropped(DropReason::UnknownResource));
        };

        if let Some(reason) = Self::filter(policy, event) {
            debug!(
                resource = %key,
                event_type = %event.event_type,
                object = %event.key(),
                reason = ?reason,
                "Event dropped"
            );
            return Ok(DispatchOutcome::Dropped(reason));
        }

        if self.dry_run {
            info!(
                resource = %key,
                event_type = %event.event_type,
                channels = ?policy.channel_names,
                "[DRY-RUN] Would send to channels"
            );
            return Ok(DispatchOutcome::DryRun(policy.channel_names.clone()));
        }

        let mut delivered = Vec::new();
        let mut failures = Vec::new();
        for name in &policy.channel_names {
            let Some(channel) = self.channels.get(name) else {
                failures.push(ChannelFailure {
                    target: name.clone(),
                    error: anyhow::anyhow!("channel not registered"),
                });
                continue;
            };
            match channel.send(event).await {
                Ok(()) => delivered.push(name.clone()),
                Err(e) => {
                    warn!(
                        channel = %name,
                        resource = %key,
                        object = %event.key(),
                        error = %e,
                        "Channel send failed"
                    );
                    failures.push(ChannelFailure {
                        target: name.clone(),
                        error: e,
                    });
                }
            }
        }

        DeliveryError::from_failures(failures)?;
        debug!(resource = %key, object = %event.key(), channels = ?delivered, "Event delivered");
        Ok(DispatchOutcome::Delivered(delivered))
    }
}
