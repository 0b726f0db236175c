//! kubebigbrother - 监听集群资源变更，按配置策略通知到各个渠道

pub mod config;
pub mod notification;
pub mod watcher;

pub use config::{resolve_policies, Config, ConfigError, EffectivePolicy, PolicyTable, ResourceKey, ResyncPeriodFunc};
pub use notification::{
    DeliveryError, DispatchOutcome, Event, EventSink, EventType, JsonlEventSink, NotificationBuilder,
    NotificationChannel, NotificationDispatcher,
};
pub use watcher::{EventSource, ReplaySource, Watcher};
