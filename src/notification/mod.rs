//! 通知抽象层 - 统一管理所有通知渠道
//!
//! # 设计目标
//! 1. 统一接口：所有渠道实现 `NotificationChannel` trait
//! 2. 渠道解耦：每个渠道独立实现，一个失败不影响其它
//! 3. 按资源路由：`NotificationDispatcher` 根据生效策略决定发送到哪些渠道
//!
//! # 使用示例
//! ```ignore
//! use kubebigbrother::config::{Config, ResourceKey};
//! use kubebigbrother::notification::{Event, NotificationBuilder};
//!
//! let config = Config::load_from_file("config.yaml")?;
//! let dispatcher = NotificationBuilder::new(config).build()?;
//!
//! let event = Event::added(pod);
//! dispatcher.dispatch(&ResourceKey::new("default", "pods"), &event).await?;
//! ```

pub mod builder;
pub mod channel;
pub mod channels;
pub mod dispatcher;
pub mod event;
pub mod store;
pub mod template;
pub mod webhook;

pub use builder::{ChannelRegistry, NotificationBuilder};
pub use channel::{send_to_all, ChannelFailure, DeliveryError, NotificationChannel};
pub use dispatcher::{DispatchOutcome, DropReason, NotificationDispatcher};
pub use event::{Event, EventType, EventTypeError};
pub use store::{EventRecord, EventSink, JsonlEventSink};
pub use template::{Rendered, Template, TemplateConfig, TemplateError, TemplateSet};
