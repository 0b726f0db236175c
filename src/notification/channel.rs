//! 通知渠道 trait 定义

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use super::event::Event;

/// 通知渠道
///
/// 每种渠道（callback / print / telegram / flock / group）一个实现，
/// 由 [`ChannelRegistry`](super::builder::ChannelRegistry) 按配置构造一次。
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// 渠道名称（用于日志和配置）
    fn name(&self) -> &str;

    /// 渲染并投递事件
    async fn send(&self, event: &Event) -> Result<()>;
}

/// 单个目标的投递失败
#[derive(Debug)]
pub struct ChannelFailure {
    /// 渠道名或接收者
    pub target: String,
    pub error: anyhow::Error,
}

impl fmt::Display for ChannelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.target, self.error)
    }
}

/// 聚合的投递错误：一个目标失败不影响其它目标，最后一起报告
#[derive(Debug, Error)]
#[error("{} delivery failure(s): {}", .failures.len(), join_failures(.failures))]
pub struct DeliveryError {
    pub failures: Vec<ChannelFailure>,
}

fn join_failures(failures: &[ChannelFailure]) -> String {
    failures
        .iter()
        .map(ChannelFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DeliveryError {
    /// 没有失败返回 `Ok(())`
    pub fn from_failures(failures: Vec<ChannelFailure>) -> Result<(), DeliveryError> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DeliveryError { failures })
        }
    }

    pub fn targets(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.target.as_str()).collect()
    }
}

/// 依次投递到每个渠道，不因单个失败而中断
pub async fn send_to_all(
    channels: &[Arc<dyn NotificationChannel>],
    event: &Event,
) -> Result<(), DeliveryError> {
    let mut failures = Vec::new();
    for channel in channels {
        if let Err(e) = channel.send(event).await {
            warn!(channel = channel.name(), error = %e, "Channel send failed");
            failures.push(ChannelFailure {
                target: channel.name().to_string(),
                error: e,
            });
        }
    }
    DeliveryError::from_failures(failures)
}
