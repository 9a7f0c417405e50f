use crate::app::CliApp;
use crate::utils::truncate;
use keeper_core::{Result, database::MaintenanceStatus};
use tracing::info;

/// 查看最近的审计日志
pub async fn show_logs(app: &CliApp, limit: i64) -> Result<()> {
    let entries = app.database.list_maintenance_logs(Some(limit.max(1))).await?;
    if entries.is_empty() {
        info!("📭 暂无审计日志");
        return Ok(());
    }

    info!("📋 审计日志 (最近 {} 条)", entries.len());
    for entry in &entries {
        let icon = match entry.status {
            MaintenanceStatus::Running => "⏳",
            MaintenanceStatus::Completed => "✅",
            MaintenanceStatus::Failed => "❌",
        };
        info!(
            "{} #{} [{}] {} {} by {}",
            icon,
            entry.id,
            entry.log_type.as_str(),
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(&entry.description, 40),
            entry.actor_id
        );
        if !entry.artifact_name.is_empty() {
            info!(
                "     {} ({}, {:.2} 秒)",
                entry.artifact_name, entry.file_size_formatted, entry.duration_seconds
            );
        }
        if let Some(remote_id) = &entry.remote_artifact_id {
            info!("     远程副本: {}", remote_id);
        }
        if let Some(message) = &entry.error_message {
            info!("     错误: {}", truncate(message, 80));
        }
    }
    Ok(())
}
