use crate::app::CliApp;
use keeper_core::{
    KeeperError, Result,
    database::BackupConfiguration,
    scheduler::{BackupScheduler, TokioCronTrigger, next_executions, validate_pattern},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 配置中影响定时执行的部分，执行时间的更新不算变更
fn schedule_view(config: &BackupConfiguration) -> BackupConfiguration {
    let mut view = config.clone();
    view.last_backup_at = None;
    view.updated_at = view.created_at;
    view
}

/// 比较两次读取的任务配置，返回 (需要重新注册的, 已删除的)
fn diff_configurations(
    known: &HashMap<String, BackupConfiguration>,
    current: &[BackupConfiguration],
) -> (Vec<String>, Vec<String>) {
    let changed = current
        .iter()
        .filter(|c| known.get(&c.id) != Some(&schedule_view(c)))
        .map(|c| c.id.clone())
        .collect();
    let removed = known
        .keys()
        .filter(|id| !current.iter().any(|c| &c.id == *id))
        .cloned()
        .collect();
    (changed, removed)
}

fn snapshot(configs: &[BackupConfiguration]) -> HashMap<String, BackupConfiguration> {
    configs
        .iter()
        .map(|c| (c.id.clone(), schedule_view(c)))
        .collect()
}

async fn reload(
    app: &CliApp,
    scheduler: &BackupScheduler,
    known: &mut HashMap<String, BackupConfiguration>,
) {
    let current = match app.database.list_backup_configurations().await {
        Ok(configs) => configs,
        Err(e) => {
            error!("❌ 读取备份任务失败: {}", e);
            return;
        }
    };

    let (changed, removed) = diff_configurations(known, &current);
    for id in &changed {
        let scheduled = scheduler.update_scheduled_backup(id).await;
        debug!(config_id = %id, scheduled, "任务配置已变更");
    }
    for id in &removed {
        scheduler.stop_scheduled_backup(id);
        info!(config_id = %id, "任务已删除，停止定时");
    }
    if !changed.is_empty() || !removed.is_empty() {
        info!(
            "🔄 已重新加载任务配置，当前定时任务 {} 个",
            scheduler.get_scheduled_backups().len()
        );
    }
    *known = snapshot(&current);
}

/// 前台运行调度器，直到收到 Ctrl+C
pub async fn run_scheduler(app: &CliApp, reload_interval: u64) -> Result<()> {
    let trigger = Arc::new(TokioCronTrigger::new());
    let scheduler = BackupScheduler::new(app.database.clone(), app.orchestrator.clone(), trigger);

    let count = scheduler.initialize().await?;
    info!("✅ 已注册 {} 个定时任务", count);
    for job in scheduler.get_scheduled_backups() {
        info!("   - {} [{}]", job.name, job.pattern);
    }
    if !app.orchestrator.remote_ready().await {
        info!("💡 未持有远程凭据，定时备份只保存在本地");
    }

    let mut known = snapshot(&app.database.list_backup_configurations().await?);
    let mut ticker = tokio::time::interval(Duration::from_secs(reload_interval.max(1)));
    ticker.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    info!("⏰ 调度器运行中，按 Ctrl+C 退出");

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!("监听退出信号失败: {}", e);
                }
                break;
            }
            _ = ticker.tick() => reload(app, &scheduler, &mut known).await,
        }
    }

    info!("🛑 正在停止调度器...");
    scheduler.shutdown();
    info!("✅ 调度器已停止");
    Ok(())
}

/// 列出会被注册的定时任务
pub async fn list_schedules(app: &CliApp) -> Result<()> {
    let configs = app.database.list_schedulable_configurations().await?;
    let configs: Vec<&BackupConfiguration> = configs.iter().filter(|c| c.wants_schedule()).collect();
    if configs.is_empty() {
        info!("📭 没有启用定时的备份任务");
        return Ok(());
    }

    info!("📋 定时任务 ({} 个)", configs.len());
    for config in configs {
        let pattern = config.schedule_pattern.as_deref().unwrap_or_default();
        match next_executions(pattern, 1).first() {
            Some(next) => info!(
                "   {} [{}] 下次执行: {}",
                config.name,
                pattern,
                next.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            None => warn!("   {} [{}] 表达式无效，不会被注册", config.name, pattern),
        }
    }
    Ok(())
}

/// 校验定时表达式
pub fn validate_schedule(pattern: &str, count: usize) -> Result<()> {
    if !validate_pattern(pattern) {
        return Err(KeeperError::InvalidInput(format!("定时表达式无效: {pattern}")));
    }
    info!("✅ 定时表达式有效: {}", pattern);
    print_next_executions(pattern, count)
}

pub(super) fn print_next_executions(pattern: &str, count: usize) -> Result<()> {
    let upcoming = next_executions(pattern, count);
    if upcoming.is_empty() {
        return Err(KeeperError::InvalidInput(format!("定时表达式无效: {pattern}")));
    }
    info!("接下来的 {} 次执行时间 (UTC):", upcoming.len());
    for (i, time) in upcoming.iter().enumerate() {
        info!("   {}. {}", i + 1, time.format("%Y-%m-%d %H:%M:%S %a"));
    }
    Ok(())
}
