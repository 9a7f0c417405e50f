use crate::app::CliApp;
use keeper_core::{
    KeeperError, Result,
    backup::{BackupOptions, BackupResult, RemoteCopy, SourceOutcome},
    database::format_file_size,
};
use tracing::{error, info, warn};

/// 立即创建备份
pub async fn run_backup(
    app: &CliApp,
    actor: &str,
    options: BackupOptions,
    upload: bool,
    folder: Option<String>,
) -> Result<()> {
    info!("💾 创建备份");
    info!("===========");
    info!("📦 数据源: {}", options.describe());

    if upload && app.remote.is_none() {
        warn!("⚠️  远程存储未启用，本次只保存本地备份");
    }
    let folder = folder.or_else(|| app.config.remote.default_folder_id.clone());

    let result = app
        .orchestrator
        .create_backup(actor, options, upload, folder.as_deref())
        .await;

    match result {
        BackupResult::Success(success) => {
            info!("✅ 备份完成: {}", success.artifact_name);
            info!("   大小: {}", format_file_size(success.size));
            info!("   耗时: {:.2} 秒", success.duration_seconds);
            info!("   SHA-256: {}", success.sha256);
            for report in &success.sources {
                match report.outcome {
                    SourceOutcome::Included { entries } => {
                        info!("   - {}: {} 个条目", report.source.label(), entries)
                    }
                    SourceOutcome::SkippedMissing => {
                        warn!("   - {}: 不存在，已跳过", report.source.label())
                    }
                    SourceOutcome::NotRequested => {}
                }
            }
            match success.remote {
                RemoteCopy::NotRequested => {}
                RemoteCopy::Unavailable => warn!("⚠️  没有可用的远程存储凭据，未上传"),
                RemoteCopy::Uploaded { remote_id } => info!("☁️  已上传到远程存储: {}", remote_id),
                RemoteCopy::Failed { message } => {
                    warn!("⚠️  远程上传失败，本地备份仍然有效: {}", message)
                }
            }
            Ok(())
        }
        BackupResult::Failure(failure) => {
            error!("❌ 备份失败 ({:?}): {}", failure.kind, failure.message);
            Err(KeeperError::backup(failure.message))
        }
    }
}

/// 列出本地备份文件
pub async fn run_list_artifacts(app: &CliApp) -> Result<()> {
    let artifacts = app.orchestrator.list_artifacts().await?;
    if artifacts.is_empty() {
        info!("📭 备份目录中没有备份文件: {}", app.orchestrator.artifact_dir().display());
        return Ok(());
    }

    info!("📋 本地备份 ({} 个)", artifacts.len());
    info!("{:<52} {:>10}  {}", "文件名", "大小", "创建时间");
    for artifact in &artifacts {
        let created = artifact
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "{:<52} {:>10}  {}",
            artifact.name,
            format_file_size(artifact.size),
            created
        );
    }
    Ok(())
}

/// 按保留天数清理
pub async fn run_cleanup(app: &CliApp, retention_days: i32) -> Result<()> {
    if retention_days <= 0 {
        info!("保留天数为 {}，不执行清理", retention_days);
        return Ok(());
    }

    info!("🧹 清理 {} 天前的备份文件和审计日志...", retention_days);
    let report = app.orchestrator.cleanup_old_backups(retention_days).await;

    for name in &report.deleted {
        info!("   🗑️  {}", name);
    }
    info!(
        "✅ 清理完成: 删除 {} 个备份文件，{} 条审计日志",
        report.deleted_count, report.purged_log_count
    );
    for err in &report.errors {
        warn!("⚠️  {}", err);
    }
    Ok(())
}
