//! Group 渠道 - 扇出到多个成员渠道

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::notification::channel::{send_to_all, NotificationChannel};
use crate::notification::event::Event;

/// Group 渠道：按顺序投递给所有成员，单个成员失败不会中断，失败汇总后返回
pub struct GroupChannel {
    name: String,
    members: Vec<Arc<dyn NotificationChannel>>,
}

impl GroupChannel {
    pub fn new(name: &str, members: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self {
            name: name.to_string(),
            members,
        }
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name()).collect()
    }
}

#[async_trait]
impl NotificationChannel for GroupChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &Event) -> Result<()> {
        send_to_all(&self.members, event).await?;
        Ok(())
    }
}
