//! kubebigbrother CLI
//!
//! 校验通知配置、测试渠道、回放录制的资源事件

use anyhow::Result;
use clap::{Parser, Subcommand};
use kubebigbrother::{
    Config, Event, EventType, JsonlEventSink, NotificationBuilder, ReplaySource, Watcher,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "kbb")]
#[command(about = "kubebigbrother - 监听集群资源变更并发送通知")]
#[command(version)]
struct Cli {
    /// 配置文件路径（.json / .yaml，默认 ~/.kubebigbrother/config.yaml）
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 校验配置并输出每个资源的生效策略（JSON）
    Check,
    /// 向指定渠道发送一条测试事件
    TestChannel {
        /// 渠道名称
        name: String,
        /// 事件类型 (added/deleted/updated)
        #[arg(long, default_value = "added")]
        event: EventType,
    },
    /// 回放 JSONL 事件文件，按配置分发
    Replay {
        /// 事件文件，每行 {"namespace", "resource", "type", "obj", "oldObj"}
        #[arg(long)]
        events: PathBuf,
        /// 只记录会发送到哪些渠道，不实际发送
        #[arg(long)]
        dry_run: bool,
        /// 把处理结果追加到 JSONL 文件（默认 ~/.kubebigbrother/events.jsonl）
        #[arg(long)]
        record: Option<Option<PathBuf>>,
    },
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kubebigbrother")
        .join("config.yaml")
}

/// 测试用的示例对象
fn sample_event(event_type: EventType) -> Event {
    let obj = json!({
        "kind": "Pod",
        "metadata": {"name": "kbb-test", "namespace": "default"},
        "spec": {"containers": [{"name": "app", "image": "nginx:latest"}]}
    });
    match event_type {
        EventType::Added => Event::added(obj),
        EventType::Deleted => Event::deleted(obj),
        EventType::Updated => {
            let mut old = obj.clone();
            old["spec"]["containers"][0]["image"] = json!("nginx:1.25");
            Event::updated(old, obj)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kubebigbrother=info,kbb=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = Config::load_from_file(&config_path)?;
    info!(path = %config_path.display(), "Loaded config");

    match cli.command {
        Commands::Check => {
            let policies = kubebigbrother::resolve_policies(&config)?;
            let entries: Vec<_> = policies
                .iter()
                .map(|(key, policy)| json!({"resource": key, "policy": policy}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Commands::TestChannel { name, event } => {
            let dispatcher = NotificationBuilder::new(config).build()?;
            let channel = dispatcher
                .channel(&name)
                .ok_or_else(|| anyhow::anyhow!("渠道 {} 不存在", name))?;
            channel.send(&sample_event(event)).await?;
            println!("已发送测试事件到渠道: {}", name);
        }
        Commands::Replay {
            events,
            dry_run,
            record,
        } => {
            let dispatcher = Arc::new(NotificationBuilder::new(config).dry_run(dry_run).build()?);
            let source = Arc::new(ReplaySource::from_file(&events)?);

            let mut watcher = Watcher::new(dispatcher, source.clone());
            if let Some(path) = record {
                let sink = JsonlEventSink::new(path.unwrap_or_else(JsonlEventSink::default_path));
                info!(path = %sink.path().display(), "Recording event outcomes");
                watcher = watcher.with_sink(Arc::new(sink));
            }

            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Received Ctrl-C, shutting down");
                        cancel.cancel();
                    }
                }
            });

            watcher.run(cancel).await?;

            for key in source.unclaimed() {
                warn!(resource = %key, "Events skipped: resource not configured");
            }
        }
    }

    Ok(())
}
