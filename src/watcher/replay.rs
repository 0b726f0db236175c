//! 回放事件源 - 从 JSONL 文件读取录制好的事件
//!
//! 每行一个事件：
//! ```json
//! {"namespace": "default", "resource": "pods", "type": "ADDED", "obj": {...}}
//! ```
//! 回放没有 resync，事件发完后 receiver 关闭。

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::EventSource;
use crate::config::{ResourceKey, ResyncPeriodFunc};
use crate::notification::Event;

/// 回放文件中的一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRecord {
    #[serde(default)]
    pub namespace: String,
    pub resource: String,
    #[serde(flatten)]
    pub event: Event,
}

/// 回放事件源，每个资源的事件只能被订阅一次
pub struct ReplaySource {
    events: Mutex<HashMap<ResourceKey, Vec<Event>>>,
}

impl ReplaySource {
    pub fn from_records(records: impl IntoIterator<Item = ReplayRecord>) -> Self {
        let mut events: HashMap<ResourceKey, Vec<Event>> = HashMap::new();
        for record in records {
            events
                .entry(ResourceKey::new(record.namespace, record.resource))
                .or_default()
                .push(record.event);
        }
        Self {
            events: Mutex::new(events),
        }
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut records = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ReplayRecord = serde_json::from_str(&line)
                .with_context(|| format!("invalid replay record at line {}", i + 1))?;
            records.push(record);
        }
        Ok(Self::from_records(records))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// 还没有被订阅的资源（通常是配置里没有的资源）
    pub fn unclaimed(&self) -> Vec<ResourceKey> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<ResourceKey> = events.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl EventSource for ReplaySource {
    async fn subscribe(
        &self,
        key: &ResourceKey,
        _resync: ResyncPeriodFunc,
        _cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Event>> {
        let events = self
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.try_send(event)?;
        }
        Ok(rx)
    }
}
