use super::pattern::CronPattern;
use crate::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 触发时调用的任务
pub type JobHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// 已注册触发器的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerHandle(u64);

impl TriggerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// 定时触发器
pub trait JobTrigger: Send + Sync {
    /// 注册周期任务
    fn schedule(&self, pattern: &CronPattern, handler: JobHandler) -> Result<TriggerHandle>;

    /// 取消任务，只影响之后的触发，返回句柄是否存在
    fn cancel(&self, handle: TriggerHandle) -> bool;

    /// 取消全部任务
    fn shutdown(&self) {}
}

/// 基于 tokio 定时器的触发器，每个任务一个后台循环
#[derive(Debug)]
pub struct TokioCronTrigger {
    next_id: AtomicU64,
    root: CancellationToken,
    tasks: Mutex<HashMap<u64, CancellationToken>>,
}

impl Default for TokioCronTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioCronTrigger {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            root: CancellationToken::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JobTrigger for TokioCronTrigger {
    fn schedule(&self, pattern: &CronPattern, handler: JobHandler) -> Result<TriggerHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        self.tasks().insert(id, token.clone());

        let pattern = pattern.clone();
        tokio::spawn(async move {
            let mut last_fired: Option<DateTime<Utc>> = None;
            loop {
                let now = Utc::now();
                let after = last_fired.map_or(now, |last| last.max(now));
                let Some(next) = pattern.next_after(after) else {
                    warn!(pattern = %pattern, "定时表达式没有后续触发时间，任务结束");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or_default();

                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(trigger_id = id, "触发器已取消");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {
                        last_fired = Some(next);
                        // 执行放到独立任务中，取消触发器不会中断进行中的执行
                        tokio::spawn(handler());
                    }
                }
            }
        });

        Ok(TriggerHandle(id))
    }

    fn cancel(&self, handle: TriggerHandle) -> bool {
        match self.tasks().remove(&handle.0) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn shutdown(&self) {
        self.root.cancel();
        self.tasks().clear();
    }
}

impl Drop for TokioCronTrigger {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_handler(counter: Arc<AtomicUsize>) -> JobHandler {
        Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_fires_every_second_until_cancelled() {
        let trigger = TokioCronTrigger::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let pattern = CronPattern::parse("* * * * * *").unwrap();

        let handle = trigger.schedule(&pattern, counting_handler(counter.clone())).unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(counter.load(Ordering::SeqCst) >= 1);

        assert!(trigger.cancel(handle));
        assert!(!trigger.cancel(handle));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let fired = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), fired);
    }

    #[tokio::test]
    async fn test_shutdown_stops_all() {
        let trigger = TokioCronTrigger::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let pattern = CronPattern::parse("* * * * * *").unwrap();
        let a = trigger.schedule(&pattern, counting_handler(counter.clone())).unwrap();
        let b = trigger.schedule(&pattern, counting_handler(counter.clone())).unwrap();
        assert_ne!(a, b);

        trigger.shutdown();
        assert!(!trigger.cancel(a));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
