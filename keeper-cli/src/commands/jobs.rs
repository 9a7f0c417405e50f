use crate::app::CliApp;
use crate::cli::SourceFlags;
use keeper_core::{
    KeeperError, Result,
    backup::BackupOptions,
    constants::cron,
    database::BackupConfiguration,
    scheduler::{next_executions, validate_pattern},
};
use tracing::{info, warn};

/// `job update` 的可选修改项
#[derive(Debug, Clone, Default)]
pub struct JobChanges {
    pub name: Option<String>,
    pub schedule: Option<String>,
    pub disable_schedule: bool,
    pub active: Option<bool>,
    pub retention_days: Option<i32>,
    pub folder: Option<String>,
}

fn check_pattern(pattern: &str) -> Result<()> {
    if validate_pattern(pattern) {
        Ok(())
    } else {
        Err(KeeperError::InvalidInput(format!("定时表达式无效: {pattern}")))
    }
}

fn check_retention(days: i32) -> Result<()> {
    if days < 0 {
        return Err(KeeperError::InvalidInput(format!("保留天数不能为负数: {days}")));
    }
    if days > cron::MAX_RETENTION_DAYS {
        return Err(KeeperError::InvalidInput(format!(
            "保留天数不能超过 {}: {days}",
            cron::MAX_RETENTION_DAYS
        )));
    }
    Ok(())
}

fn apply_changes(config: &mut BackupConfiguration, changes: JobChanges) -> Result<()> {
    if let Some(name) = changes.name {
        if name.trim().is_empty() {
            return Err(KeeperError::InvalidInput("任务名称不能为空".to_string()));
        }
        config.name = name;
    }
    if let Some(pattern) = changes.schedule {
        check_pattern(&pattern)?;
        config.schedule_pattern = Some(pattern);
        config.schedule_enabled = true;
    }
    if changes.disable_schedule {
        config.schedule_enabled = false;
    }
    if let Some(active) = changes.active {
        config.is_active = active;
    }
    if let Some(days) = changes.retention_days {
        check_retention(days)?;
        config.retention_days = days;
    }
    if let Some(folder) = changes.folder {
        config.remote_folder_id = (!folder.is_empty()).then_some(folder);
    }
    Ok(())
}

async fn load_job(app: &CliApp, id: &str) -> Result<BackupConfiguration> {
    app.database
        .get_backup_configuration(id)
        .await?
        .ok_or_else(|| KeeperError::NotFound(format!("备份任务: {id}")))
}

/// 新建备份任务
pub async fn create_job(
    app: &CliApp,
    name: String,
    schedule: Option<String>,
    retention_days: Option<i32>,
    folder: Option<String>,
    sources: SourceFlags,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(KeeperError::InvalidInput("任务名称不能为空".to_string()));
    }

    let mut config = BackupConfiguration::new(name);
    if sources.any() {
        let options: BackupOptions = sources.to_options();
        config.include_data_store = options.include_data_store;
        config.include_uploads = options.include_uploads;
        config.include_config = options.include_config;
        config.include_logs = options.include_logs;
    }
    apply_changes(
        &mut config,
        JobChanges {
            schedule,
            retention_days,
            folder,
            ..Default::default()
        },
    )?;

    let config = app.database.create_backup_configuration(config).await?;
    info!("✅ 已创建备份任务: {} ({})", config.name, config.id);
    print_job(&config);
    if config.wants_schedule() {
        info!("💡 运行 keeper schedule run 启动调度器后任务才会按时执行");
    }
    Ok(())
}

/// 修改备份任务
pub async fn update_job(app: &CliApp, id: &str, changes: JobChanges) -> Result<()> {
    let mut config = load_job(app, id).await?;
    apply_changes(&mut config, changes)?;
    let config = app.database.update_backup_configuration(config).await?;
    info!("✅ 已更新备份任务: {} ({})", config.name, config.id);
    print_job(&config);
    Ok(())
}

/// 显示任务详情
pub async fn show_job(app: &CliApp, id: &str) -> Result<()> {
    let config = load_job(app, id).await?;
    print_job(&config);
    if config.wants_schedule() {
        if let Some(pattern) = config.schedule_pattern.as_deref() {
            let upcoming = next_executions(pattern, 3);
            if upcoming.is_empty() {
                warn!("⚠️  定时表达式无效，调度器不会注册此任务");
            }
            for time in upcoming {
                info!("   下次执行: {}", time.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
    }
    Ok(())
}

/// 列出所有任务
pub async fn list_jobs(app: &CliApp) -> Result<()> {
    let configs = app.database.list_backup_configurations().await?;
    if configs.is_empty() {
        info!("📭 暂无备份任务，使用 keeper job create <名称> 创建");
        return Ok(());
    }

    info!("📋 备份任务 ({} 个)", configs.len());
    for config in &configs {
        let state = match (config.is_active, config.wants_schedule()) {
            (false, _) => "已停用",
            (true, true) => "定时",
            (true, false) => "手动",
        };
        info!(
            "   {} {:<24} [{}] {}",
            config.id,
            crate::utils::truncate(&config.name, 24),
            state,
            config.schedule_pattern.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// 显示任务接下来的执行时间
pub async fn show_job_next_runs(app: &CliApp, id: &str, count: usize) -> Result<()> {
    let config = load_job(app, id).await?;
    let Some(pattern) = config.schedule_pattern.as_deref() else {
        info!("任务 {} 没有定时表达式", config.name);
        return Ok(());
    };
    if !config.wants_schedule() {
        warn!("⚠️  任务当前未启用定时，以下时间仅供参考");
    }
    super::schedule::print_next_executions(pattern, count)
}

fn print_job(config: &BackupConfiguration) {
    info!("   名称: {}", config.name);
    info!("   ID: {}", config.id);
    info!("   启用: {}", if config.is_active { "是" } else { "否" });
    info!(
        "   定时: {} {}",
        if config.schedule_enabled { "开" } else { "关" },
        config.schedule_pattern.as_deref().unwrap_or("")
    );
    info!("   数据源: {}", BackupOptions::from(config).describe());
    info!("   保留天数: {}", config.retention_days);
    if let Some(folder) = &config.remote_folder_id {
        info!("   远程文件夹: {}", folder);
    }
    match config.last_backup_at {
        Some(at) => info!("   最后备份: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => info!("   最后备份: 从未"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::config::AppConfig;
    use tempfile::{TempDir, tempdir};

    async fn test_app() -> (TempDir, CliApp) {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        let mut config = AppConfig::default();
        config.storage.artifact_dir = root.join("backups").to_string_lossy().to_string();
        config.storage.staging_dir = root.join("staging").to_string_lossy().to_string();
        config.storage.database_path = root.join("keeper.duckdb").to_string_lossy().to_string();
        config.secrets.store_path = root.join("secrets.json").to_string_lossy().to_string();
        let app = CliApp::from_config(config).await.unwrap();
        (temp_dir, app)
    }

    #[test]
    fn test_apply_schedule_enables_it() {
        let mut config = BackupConfiguration::new("nightly");
        apply_changes(
            &mut config,
            JobChanges {
                schedule: Some("0 2 * * *".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(config.schedule_enabled);
        assert!(config.wants_schedule());

        apply_changes(
            &mut config,
            JobChanges {
                disable_schedule: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!config.schedule_enabled);
        assert_eq!(config.schedule_pattern.as_deref(), Some("0 2 * * *"));
    }

    #[test]
    fn test_apply_rejects_invalid_values() {
        let mut config = BackupConfiguration::new("nightly");
        let err = apply_changes(
            &mut config,
            JobChanges {
                schedule: Some("not a cron".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, KeeperError::InvalidInput(_)));
        assert!(!config.schedule_enabled);

        assert!(
            apply_changes(
                &mut config,
                JobChanges {
                    retention_days: Some(-1),
                    ..Default::default()
                },
            )
            .is_err()
        );
        for days in [36_501, 200_000_000] {
            assert!(
                apply_changes(
                    &mut config,
                    JobChanges {
                        retention_days: Some(days),
                        ..Default::default()
                    },
                )
                .is_err()
            );
        }
        assert_eq!(config.retention_days, 30);
    }

    #[test]
    fn test_empty_folder_clears_it() {
        let mut config = BackupConfiguration::new("nightly");
        config.remote_folder_id = Some("folder-1".to_string());
        apply_changes(
            &mut config,
            JobChanges {
                folder: Some(String::new()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.remote_folder_id, None);
    }

    #[tokio::test]
    async fn test_create_and_update_job() {
        let (_temp_dir, app) = test_app().await;
        let sources = SourceFlags {
            data_store: true,
            ..Default::default()
        };
        create_job(&app, "nightly".to_string(), Some("0 2 * * *".to_string()), Some(7), None, sources)
            .await
            .unwrap();

        let configs = app.database.list_backup_configurations().await.unwrap();
        assert_eq!(configs.len(), 1);
        let created = &configs[0];
        assert!(created.wants_schedule());
        assert!(created.include_data_store);
        assert!(!created.include_uploads);
        assert_eq!(created.retention_days, 7);

        update_job(
            &app,
            &created.id,
            JobChanges {
                active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let updated = app
            .database
            .get_backup_configuration(&created.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.is_active);
        assert!(!updated.wants_schedule());

        let err = update_job(&app, "missing", JobChanges::default()).await.unwrap_err();
        assert!(matches!(err, KeeperError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_job_with_invalid_pattern_is_not_saved() {
        let (_temp_dir, app) = test_app().await;
        let result = create_job(
            &app,
            "broken".to_string(),
            Some("every day".to_string()),
            None,
            None,
            SourceFlags::default(),
        )
        .await;
        assert!(result.is_err());
        assert!(app.database.list_backup_configurations().await.unwrap().is_empty());
    }
}
