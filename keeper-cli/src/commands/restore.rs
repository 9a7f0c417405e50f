use crate::app::CliApp;
use keeper_core::{
    KeeperError, Result,
    backup::{RestoreResult, RestoreSource},
    database::format_file_size,
};
use tracing::{error, info, warn};

/// 准备恢复：获取备份文件并校验
pub async fn run_restore(
    app: &CliApp,
    actor: &str,
    artifact_name: &str,
    remote_id: Option<&str>,
) -> Result<()> {
    info!("♻️  准备恢复: {}", artifact_name);

    if remote_id.is_some() && app.remote.is_none() {
        warn!("⚠️  远程存储未启用，将使用本地备份文件");
    }

    match app
        .orchestrator
        .restore_backup(actor, artifact_name, remote_id)
        .await
    {
        RestoreResult::Success(success) => {
            let source = match success.source {
                RestoreSource::Local => "本地",
                RestoreSource::Remote => "远程",
            };
            info!("✅ 备份文件已就绪 (来源: {})", source);
            info!("   路径: {}", success.staged_path.display());
            info!("   大小: {}", format_file_size(success.size));
            info!("   条目: {}", success.entries);
            info!("   耗时: {:.2} 秒", success.duration_seconds);
            info!("💡 解压前请先停止使用这些数据的服务");
            Ok(())
        }
        RestoreResult::Failure(failure) => {
            error!("❌ 恢复准备失败 ({:?}): {}", failure.kind, failure.message);
            Err(KeeperError::restore(failure.message))
        }
    }
}
