// 定时备份模块
// 把启用定时的备份任务注册为周期触发器，触发时执行备份和保留策略清理

pub mod pattern;
pub mod trigger;

pub use pattern::{CronPattern, next_executions, validate_pattern};
pub use trigger::{JobHandler, JobTrigger, TokioCronTrigger, TriggerHandle};

use crate::Result;
use crate::backup::{BackupOptions, BackupOrchestrator, BackupResult};
use crate::constants::cron as cron_consts;
use crate::database::{BackupConfiguration, Database};
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

/// 已注册的定时任务
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledBackupInfo {
    pub id: String,
    pub name: String,
    pub pattern: String,
}

struct ScheduledJob {
    name: String,
    pattern: CronPattern,
    handle: TriggerHandle,
}

/// 执行结束时把运行标记复位
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 备份任务调度器
///
/// 显式创建并由调用方持有，进程退出前调用 [`BackupScheduler::shutdown`]。
/// 同一任务的上一次执行尚未结束时，新的触发会被跳过。
#[derive(Clone)]
pub struct BackupScheduler {
    database: Database,
    orchestrator: BackupOrchestrator,
    trigger: Arc<dyn JobTrigger>,
    jobs: Arc<Mutex<HashMap<String, ScheduledJob>>>,
    // 独立于 jobs 保存，重新注册不会丢失运行状态
    run_states: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
}

impl std::fmt::Debug for BackupScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupScheduler")
            .field("orchestrator", &self.orchestrator)
            .field("jobs", &self.jobs().len())
            .finish()
    }
}

impl BackupScheduler {
    pub fn new(
        database: Database,
        orchestrator: BackupOrchestrator,
        trigger: Arc<dyn JobTrigger>,
    ) -> Self {
        Self {
            database,
            orchestrator,
            trigger,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            run_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, ScheduledJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_state(&self, id: &str) -> Arc<AtomicBool> {
        self.run_states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    /// 空闲时丢弃运行状态，执行中的保留以便继续拦截重叠触发
    fn release_run_state(&self, id: &str) {
        let mut states = self
            .run_states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if states.get(id).is_some_and(|running| !running.load(Ordering::Acquire)) {
            states.remove(id);
        }
    }

    /// 进程启动时注册所有启用定时的任务，返回成功注册的数量
    ///
    /// 单个任务注册失败只记录日志，不影响其他任务。
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<usize> {
        let configs = self.database.list_schedulable_configurations().await?;
        let mut scheduled = 0;
        for config in configs.iter().filter(|c| c.wants_schedule()) {
            if self.schedule_backup(config) {
                scheduled += 1;
            }
        }
        info!(total = configs.len(), scheduled, "定时备份初始化完成");
        Ok(scheduled)
    }

    /// 注册定时任务，已存在的同名任务会先被停止
    ///
    /// 表达式无效时返回 false，不注册任何触发器。
    pub fn schedule_backup(&self, config: &BackupConfiguration) -> bool {
        let Some(raw) = config.schedule_pattern.as_deref() else {
            warn!(config_id = %config.id, "备份任务没有定时表达式");
            return false;
        };
        let pattern = match CronPattern::parse(raw) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(config_id = %config.id, pattern = raw, error = %e, "定时表达式无效，跳过注册");
                return false;
            }
        };

        self.stop_scheduled_backup(&config.id);

        let handler = self.job_handler(config.clone());
        match self.trigger.schedule(&pattern, handler) {
            Ok(handle) => {
                info!(config_id = %config.id, name = %config.name, pattern = %pattern, "已注册定时备份");
                let previous = self.jobs().insert(
                    config.id.clone(),
                    ScheduledJob {
                        name: config.name.clone(),
                        pattern,
                        handle,
                    },
                );
                // 并发注册同一任务时，被覆盖的触发器也要取消
                if let Some(previous) = previous {
                    self.trigger.cancel(previous.handle);
                }
                true
            }
            Err(e) => {
                error!(config_id = %config.id, error = %e, "注册定时备份失败");
                false
            }
        }
    }

    fn job_handler(&self, config: BackupConfiguration) -> JobHandler {
        let scheduler = self.clone();
        let config = Arc::new(config);
        Arc::new(move || {
            let scheduler = scheduler.clone();
            let config = config.clone();
            async move {
                scheduler.execute_scheduled_backup(&config).await;
            }
            .boxed()
        })
    }

    /// 触发器调用的执行入口，返回 None 表示因上一次执行未结束而跳过
    #[instrument(skip(self, config), fields(config_id = %config.id))]
    async fn execute_scheduled_backup(&self, config: &BackupConfiguration) -> Option<BackupResult> {
        let running = self.run_state(&config.id);
        if running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(name = %config.name, "上一次定时备份仍在执行，跳过本次触发");
            return None;
        }
        let _guard = RunGuard(running);

        // 定时任务只在进程已持有远程凭据时上传
        let upload = self.orchestrator.remote_ready().await;
        if !upload {
            debug!("没有可用的远程凭据，仅保存本地备份");
        }

        let result = self
            .orchestrator
            .create_backup(
                cron_consts::SYSTEM_ACTOR,
                BackupOptions::from(config),
                upload,
                config.remote_folder_id.as_deref(),
            )
            .await;

        match &result {
            BackupResult::Success(success) => {
                info!(artifact = %success.artifact_name, size = success.size, "定时备份完成");
                if let Err(e) = self.database.set_last_backup_at(&config.id, Utc::now()).await {
                    warn!(error = %e, "更新最后备份时间失败");
                }
                if config.retention_days > 0 {
                    let report = self.orchestrator.cleanup_old_backups(config.retention_days).await;
                    for err in &report.errors {
                        warn!(error = %err, "保留策略清理出错");
                    }
                }
            }
            BackupResult::Failure(failure) => {
                error!(kind = ?failure.kind, error = %failure.message, "定时备份失败");
            }
        }

        Some(result)
    }

    /// 停止定时任务，进行中的执行不受影响
    pub fn stop_scheduled_backup(&self, id: &str) -> bool {
        let removed = self.jobs().remove(id);
        self.release_run_state(id);
        let Some(job) = removed else {
            return false;
        };
        self.trigger.cancel(job.handle);
        info!(config_id = id, "已停止定时备份");
        true
    }

    /// 重新读取任务配置并按需重新注册，返回该任务当前是否处于定时状态
    pub async fn update_scheduled_backup(&self, id: &str) -> bool {
        let config = match self.database.get_backup_configuration(id).await {
            Ok(config) => config,
            Err(e) => {
                error!(config_id = id, error = %e, "读取备份任务失败");
                return false;
            }
        };

        self.stop_scheduled_backup(id);
        match config {
            Some(config) if config.wants_schedule() => self.schedule_backup(&config),
            Some(_) => {
                debug!(config_id = id, "备份任务不再满足定时条件");
                false
            }
            None => {
                warn!(config_id = id, "备份任务不存在");
                false
            }
        }
    }

    /// 当前已注册的定时任务
    pub fn get_scheduled_backups(&self) -> Vec<ScheduledBackupInfo> {
        let mut list: Vec<ScheduledBackupInfo> = self
            .jobs()
            .iter()
            .map(|(id, job)| ScheduledBackupInfo {
                id: id.clone(),
                name: job.name.clone(),
                pattern: job.pattern.as_str().to_string(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// 停止所有定时任务
    pub fn stop_all_scheduled_backups(&self) {
        let jobs: Vec<ScheduledJob> = self.jobs().drain().map(|(_, job)| job).collect();
        for job in &jobs {
            self.trigger.cancel(job.handle);
        }
        info!(count = jobs.len(), "已停止所有定时备份");
    }

    /// 进程退出前调用
    pub fn shutdown(&self) {
        self.stop_all_scheduled_backups();
        self.trigger.shutdown();
    }
}
