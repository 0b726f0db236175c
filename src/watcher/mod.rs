//! 资源监听 - 从事件源取事件，按资源排队，由 worker 调用 dispatcher
//!
//! 每个资源一个有界队列和 `workers` 个 worker，不同资源之间并行。
//! 投递失败的事件立即重新入队（无退避），直到用完 `maxRetries`，之后记录日志并丢弃。
//! 取消后停止接收新事件，已排队的事件处理完再退出，不再发起新的重试。

mod replay;

pub use replay::{ReplayRecord, ReplaySource};

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{EffectivePolicy, ResourceKey, ResyncPeriodFunc};
use crate::notification::{DeliveryError, DispatchOutcome, Event, EventSink, NotificationDispatcher};

/// 默认的每资源队列容量
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// 事件源（外部协作方）
///
/// 实现方每次完整 resync 之后都要重新调用 `resync.next_period()` 取下一次间隔。
/// 返回的 receiver 关闭表示该资源没有更多事件。
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(
        &self,
        key: &ResourceKey,
        resync: ResyncPeriodFunc,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Event>>;
}

/// 队列中的事件
#[derive(Debug, Clone)]
struct WorkItem {
    event: Event,
    /// 已经重试的次数
    retries: u32,
}

/// 资源监听器
pub struct Watcher {
    dispatcher: Arc<NotificationDispatcher>,
    source: Arc<dyn EventSource>,
    sink: Option<Arc<dyn EventSink>>,
    queue_capacity: usize,
}

impl Watcher {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, source: Arc<dyn EventSource>) -> Self {
        Self {
            dispatcher,
            source,
            sink: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// 设置事件落地
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// 监听所有已配置的资源，直到事件源全部结束或被取消
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut subscriptions = Vec::new();
        for (key, policy) in self.dispatcher.policies() {
            let events = self
                .source
                .subscribe(key, policy.resync, cancel.child_token())
                .await?;
            subscriptions.push((key.clone(), policy.clone(), events));
        }

        info!(resources = subscriptions.len(), "Watcher started");

        let mut resources = JoinSet::new();
        for (key, policy, events) in subscriptions {
            let worker = ResourceWorker {
                key,
                policy,
                dispatcher: self.dispatcher.clone(),
                sink: self.sink.clone(),
                cancel: cancel.clone(),
            };
            resources.spawn(worker.run(events, self.queue_capacity));
        }

        while let Some(joined) = resources.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Resource watcher task failed");
            }
        }

        info!("Watcher stopped");
        Ok(())
    }
}

/// 单个资源的队列和 worker
#[derive(Clone)]
struct ResourceWorker {
    key: ResourceKey,
    policy: EffectivePolicy,
    dispatcher: Arc<NotificationDispatcher>,
    sink: Option<Arc<dyn EventSink>>,
    cancel: CancellationToken,
}

impl ResourceWorker {
    async fn run(self, mut events: mpsc::Receiver<Event>, capacity: usize) {
        let (tx, rx) = mpsc::channel::<WorkItem>(capacity);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for id in 0..self.policy.workers.max(1) {
            let worker = self.clone();
            let rx = rx.clone();
            let retry_tx = tx.downgrade();
            workers.spawn(async move {
                loop {
                    // 只在取下一个事件时持锁
                    let item = rx.lock().await.recv().await;
                    let Some(item) = item else { break };
                    worker.process(id, item, &retry_tx).await;
                }
            });
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(resource = %self.key, "Cancelled, draining queue");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if tx.send(WorkItem { event, retries: 0 }).await.is_err() {
                        break;
                    }
                }
            }
        }

        // 关闭队列，worker 处理完剩余事件后退出
        drop(tx);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(resource = %self.key, error = %e, "Worker task failed");
            }
        }
        debug!(resource = %self.key, "Resource watcher stopped");
    }

    async fn process(&self, worker: usize, mut item: WorkItem, retry_tx: &mpsc::WeakSender<WorkItem>) {
        loop {
            let result = self.dispatcher.dispatch(&self.key, &item.event).await;

            if let Err(e) = &result {
                // 取消后只处理完当前这次投递，不再重试
                if item.retries < self.policy.max_retries && !self.cancel.is_cancelled() {
                    item.retries += 1;
                    warn!(
                        resource = %self.key,
                        object = %item.event.key(),
                        worker,
                        retry = item.retries,
                        max_retries = self.policy.max_retries,
                        error = %e,
                        "Delivery failed, requeueing"
                    );
                    // 队列已关闭或已满时就地重试
                    match retry_tx.upgrade() {
                        Some(tx) => match tx.try_send(item) {
                            Ok(()) => return,
                            Err(mpsc::error::TrySendError::Full(back))
                            | Err(mpsc::error::TrySendError::Closed(back)) => {
                                item = back;
                                continue;
                            }
                        },
                        None => continue,
                    }
                }
                error!(
                    resource = %self.key,
                    object = %item.event.key(),
                    event_type = %item.event.event_type,
                    retries = item.retries,
                    error = %e,
                    "Dropping event after final attempt"
                );
            } else if let Ok(DispatchOutcome::Delivered(channels)) = &result {
                debug!(resource = %self.key, worker, channels = ?channels, "Event handled");
            }

            self.record(&item.event, &result).await;
            return;
        }
    }

    async fn record(&self, event: &Event, result: &std::result::Result<DispatchOutcome, DeliveryError>) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record(&self.key, event, result).await {
                warn!(resource = %self.key, error = %e, "Failed to record event");
            }
        }
    }
}
