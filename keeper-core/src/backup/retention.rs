use super::naming;
use super::result::CleanupReport;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 备份文件的创建时间：优先使用文件名中的时间戳，否则使用修改时间
async fn artifact_created_at(path: &Path, name: &str) -> Option<DateTime<Utc>> {
    if let Some(ts) = naming::parse_artifact_timestamp(name) {
        return Some(ts);
    }
    let metadata = tokio::fs::metadata(path).await.ok()?;
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

/// 删除备份目录中早于截止时间的备份文件
///
/// 单个文件删除失败只记录到错误列表，不会中断整个清理过程。
pub async fn prune_artifacts(artifact_dir: &Path, cutoff: DateTime<Utc>) -> CleanupReport {
    let mut report = CleanupReport::default();

    let mut entries = match tokio::fs::read_dir(artifact_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("备份目录不存在，无需清理: {}", artifact_dir.display());
            return report;
        }
        Err(e) => {
            report
                .errors
                .push(format!("读取备份目录失败 {}: {e}", artifact_dir.display()));
            return report;
        }
    };

    let mut candidates: Vec<(PathBuf, String)> = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let name = entry.file_name().to_string_lossy().to_string();
                let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
                if is_file && naming::is_artifact_name(&name) {
                    candidates.push((entry.path(), name));
                }
            }
            Ok(None) => break,
            Err(e) => {
                report.errors.push(format!("遍历备份目录失败: {e}"));
                break;
            }
        }
    }

    for (path, name) in candidates {
        let Some(created_at) = artifact_created_at(&path, &name).await else {
            report.errors.push(format!("无法确定备份文件时间: {name}"));
            continue;
        };
        if created_at >= cutoff {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("删除过期备份文件: {}", name);
                report.deleted_count += 1;
                report.deleted.push(name);
            }
            Err(e) => {
                warn!("删除过期备份文件失败 {}: {}", name, e);
                report.errors.push(format!("删除 {name} 失败: {e}"));
            }
        }
    }

    report
}
