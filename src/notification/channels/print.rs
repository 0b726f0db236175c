//! Print 渠道 - 每个事件输出一行到 stdout / stderr

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::config::ConfigError;
use crate::notification::channel::NotificationChannel;
use crate::notification::event::Event;
use crate::notification::template::{TemplateConfig, TemplateSet, PRINT_DEFAULTS};

pub const PRINT_WRITER_STDOUT: &str = "stdout";
pub const PRINT_WRITER_STDERR: &str = "stderr";

/// Print 渠道配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrintConfig {
    /// "stdout"（默认）或 "stderr"
    pub writer: String,
    #[serde(flatten)]
    pub templates: TemplateConfig,
}

/// Print 渠道
pub struct PrintChannel {
    name: String,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    templates: TemplateSet,
}

impl PrintChannel {
    pub fn new(name: &str, config: &PrintConfig) -> Result<Self, ConfigError> {
        let writer: Box<dyn Write + Send> = match config.writer.as_str() {
            "" | PRINT_WRITER_STDOUT => Box::new(std::io::stdout()),
            PRINT_WRITER_STDERR => Box::new(std::io::stderr()),
            other => {
                return Err(ConfigError::UnsupportedWriter {
                    channel: name.to_string(),
                    writer: other.to_string(),
                })
            }
        };
        let templates = TemplateSet::compile(name, &config.templates, PRINT_DEFAULTS)?;
        Ok(Self::with_writer(name, templates, writer))
    }

    /// 指定输出目标（测试或嵌入使用）
    pub fn with_writer(name: &str, templates: TemplateSet, writer: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.to_string(),
            writer: Arc::new(Mutex::new(writer)),
            templates,
        }
    }
}

#[async_trait]
impl NotificationChannel for PrintChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &Event) -> Result<()> {
        let rendered = self.templates.render(event)?;
        let line = if rendered.title.is_empty() {
            rendered.body
        } else {
            format!("{} {}", rendered.title, rendered.body)
        };

        // 标准输出是阻塞 IO，放到 blocking 线程
        let writer = self.writer.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut writer = writer
                .lock()
                .map_err(|_| anyhow!("print writer lock poisoned"))?;
            writeln!(writer, "{}", line)?;
            writer.flush()?;
            Ok(())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// 共享缓冲区，方便断言输出
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn channel(config: &TemplateConfig, buf: &SharedBuf) -> PrintChannel {
        let templates = TemplateSet::compile("stdout", config, PRINT_DEFAULTS).unwrap();
        PrintChannel::with_writer("stdout", templates, Box::new(buf.clone()))
    }

    #[tokio::test]
    async fn test_print_default_format() {
        let buf = SharedBuf::default();
        let channel = channel(&TemplateConfig::default(), &buf);

        channel
            .send(&Event::added(json!({"metadata": {"name": "nginx", "namespace": "default"}})))
            .await
            .unwrap();
        channel
            .send(&Event::deleted(json!({"metadata": {"name": "node-1"}})))
            .await
            .unwrap();

        assert_eq!(buf.contents(), "[ADDED] default/nginx\n[DELETED] node-1\n");
    }

    #[tokio::test]
    async fn test_print_concurrent_sends_keep_lines_whole() {
        let buf = SharedBuf::default();
        let channel = Arc::new(channel(&TemplateConfig::default(), &buf));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let channel = channel.clone();
            tasks.spawn(async move {
                channel
                    .send(&Event::added(json!({"metadata": {"name": format!("pod-{}", i)}})))
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let contents = buf.contents();
        let mut lines: Vec<&str> = contents.lines().collect();
        lines.sort();
        let expected: Vec<String> = (0..8).map(|i| format!("[ADDED] pod-{}", i)).collect();
        assert_eq!(lines, expected);
    }

    #[tokio::test]
    async fn test_print_render_error() {
        let buf = SharedBuf::default();
        let config = TemplateConfig {
            added_template: "{{ .Obj.spec.replicas }}".to_string(),
            ..Default::default()
        };
        let channel = channel(&config, &buf);

        assert!(channel.send(&Event::added(json!({}))).await.is_err());
        assert_eq!(buf.contents(), "");
    }

    #[test]
    fn test_print_unsupported_writer() {
        let config = PrintConfig {
            writer: "syslog".to_string(),
            ..Default::default()
        };
        let err = PrintChannel::new("p", &config).err().unwrap();
        assert_eq!(err.to_string(), "channel p: unsupported writer: syslog");
    }
}
