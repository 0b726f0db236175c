//! 事件存储 - 分发结束后的事件落地
//!
//! 持久化本身是外部协作方，这里只定义 [`EventSink`] 接口，
//! 并提供一个本地 JSONL 文件实现。sink 的错误只记录日志，不影响分发。

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use super::channel::DeliveryError;
use super::dispatcher::DispatchOutcome;
use super::event::{Event, EventType};
use crate::config::ResourceKey;

/// 事件落地接口
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(
        &self,
        key: &ResourceKey,
        event: &Event,
        result: &Result<DispatchOutcome, DeliveryError>,
    ) -> Result<()>;
}

/// 事件记录（JSONL 格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// ISO8601 时间戳
    pub ts: DateTime<Utc>,
    pub namespace: String,
    pub resource: String,
    pub event_type: EventType,
    /// namespace/name
    pub object: String,
    /// delivered | dropped | dry_run | failed
    pub outcome: String,
    /// 成功投递的渠道
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventRecord {
    pub fn new(
        key: &ResourceKey,
        event: &Event,
        result: &Result<DispatchOutcome, DeliveryError>,
    ) -> Self {
        let (outcome, channels, error) = match result {
            Ok(DispatchOutcome::Delivered(channels)) => ("delivered", channels.clone(), None),
            Ok(DispatchOutcome::DryRun(channels)) => ("dry_run", channels.clone(), None),
            Ok(DispatchOutcome::Dropped(reason)) => ("dropped", Vec::new(), Some(format!("{:?}", reason))),
            Err(e) => ("failed", Vec::new(), Some(e.to_string())),
        };
        Self {
            ts: Utc::now(),
            namespace: key.namespace.clone(),
            resource: key.resource.clone(),
            event_type: event.event_type,
            object: event.key(),
            outcome: outcome.to_string(),
            channels,
            error,
        }
    }
}

/// 本地 JSONL 文件 sink
#[derive(Debug, Clone)]
pub struct JsonlEventSink {
    path: PathBuf,
}

impl JsonlEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 默认路径 ~/.kubebigbrother/events.jsonl
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kubebigbrother")
            .join("events.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加记录（带文件锁）
    pub fn append(&self, record: &EventRecord) -> Result<()> {
        use fs2::FileExt;

        // 确保目录存在
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.lock_exclusive()?;
        let written = writeln!(file, "{}", serde_json::to_string(record)?);
        file.unlock()?;
        written?;
        Ok(())
    }

    /// 读取最近 N 条记录
    pub fn read_recent(&self, n: usize) -> Vec<EventRecord> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let records: Vec<EventRecord> = BufReader::new(file)
            .lines()
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();

        let start = records.len().saturating_sub(n);
        records[start..].to_vec()
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn record(
        &self,
        key: &ResourceKey,
        event: &Event,
        result: &Result<DispatchOutcome, DeliveryError>,
    ) -> Result<()> {
        let record = EventRecord::new(key, event, result);
        let sink = self.clone();
        tokio::task::spawn_blocking(move || sink.append(&record)).await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::channel::ChannelFailure;
    use crate::notification::dispatcher::DropReason;
    use serde_json::json;

    fn key() -> ResourceKey {
        ResourceKey::new("default", "pods")
    }

    fn pod() -> Event {
        Event::added(json!({"metadata": {"name": "web-0", "namespace": "default"}}))
    }

    #[test]
    fn test_record_outcomes() {
        let delivered = EventRecord::new(&key(), &pod(), &Ok(DispatchOutcome::Delivered(vec!["a".into()])));
        assert_eq!(delivered.outcome, "delivered");
        assert_eq!(delivered.channels, vec!["a"]);
        assert_eq!(delivered.object, "default/web-0");

        let dropped = EventRecord::new(
            &key(),
            &pod(),
            &Ok(DispatchOutcome::Dropped(DropReason::TriggerDisabled)),
        );
        assert_eq!(dropped.outcome, "dropped");
        assert_eq!(dropped.error.as_deref(), Some("TriggerDisabled"));

        let failed = EventRecord::new(
            &key(),
            &pod(),
            &Err(DeliveryError {
                failures: vec![ChannelFailure {
                    target: "hook".to_string(),
                    error: anyhow::anyhow!("non-200 code returned: 500"),
                }],
            }),
        );
        assert_eq!(failed.outcome, "failed");
        assert!(failed.error.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlEventSink::new(dir.path().join("nested").join("events.jsonl"));

        for _ in 0..3 {
            sink.record(&key(), &pod(), &Ok(DispatchOutcome::Delivered(vec!["a".into()])))
                .await
                .unwrap();
        }

        let records = sink.read_recent(2);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].resource, "pods");
        assert_eq!(records[0].event_type, EventType::Added);

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_read_recent_skips_unreadable_line() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlEventSink::new(dir.path().join("events.jsonl"));
        let record = EventRecord::new(&key(), &pod(), &Ok(DispatchOutcome::Delivered(Vec::new())));
        sink.append(&record).unwrap();

        // 中间插入一行非 UTF-8 内容
        let mut file = OpenOptions::new().append(true).open(sink.path()).unwrap();
        file.write_all(b"\xff\xfe broken\n").unwrap();
        drop(file);
        sink.append(&record).unwrap();

        assert_eq!(sink.read_recent(10).len(), 2);
    }

    #[test]
    fn test_read_recent_missing_file() {
        let sink = JsonlEventSink::new("/nonexistent/dir/events.jsonl");
        assert!(sink.read_recent(10).is_empty());
    }
}
