// 备份编排模块
// 打包数据源、记录审计日志、可选上传远程副本，以及恢复前的备份文件准备

pub mod archive;
pub mod naming;
pub mod result;
pub mod retention;

pub use archive::{ArchiveSummary, BackupSources};
pub use result::{
    BackupOptions, BackupResult, BackupSuccess, CleanupReport, FailureKind, OperationFailure,
    RemoteCopy, RestoreResult, RestoreSource, RestoreSuccess, SourceKind, SourceOutcome,
    SourceReport,
};

use crate::config::AppConfig;
use crate::constants::archive as archive_consts;
use crate::database::{Database, MaintenanceOutcome, MaintenanceStatus, MaintenanceType};
use crate::remote::RemoteStorage;
use crate::{KeeperError, Result};
use chrono::{TimeDelta, Utc};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// 备份编排器
#[derive(Clone)]
pub struct BackupOrchestrator {
    artifact_dir: PathBuf,
    staging_dir: PathBuf,
    sources: BackupSources,
    compression_level: u32,
    database: Database,
    remote: Option<Arc<dyn RemoteStorage>>,
}

/// 本地备份文件信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArtifactInfo {
    pub name: String,
    pub size: u64,
    pub created_at: Option<chrono::DateTime<Utc>>,
}

impl std::fmt::Debug for BackupOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupOrchestrator")
            .field("artifact_dir", &self.artifact_dir)
            .field("staging_dir", &self.staging_dir)
            .field("sources", &self.sources)
            .field("compression_level", &self.compression_level)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

impl BackupOrchestrator {
    /// 创建新的备份编排器
    pub fn new(
        artifact_dir: PathBuf,
        staging_dir: PathBuf,
        sources: BackupSources,
        compression_level: u32,
        database: Database,
    ) -> Self {
        Self {
            artifact_dir,
            staging_dir,
            sources,
            compression_level,
            database,
            remote: None,
        }
    }

    /// 根据应用配置创建
    pub fn from_config(config: &AppConfig, database: Database) -> Self {
        Self::new(
            config.get_artifact_dir(),
            config.get_staging_dir(),
            BackupSources::from_config(&config.sources),
            config.archive.compression_level,
            database,
        )
    }

    /// 挂载远程存储
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStorage>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// 是否存在已持有凭据的远程存储
    pub async fn remote_ready(&self) -> bool {
        match &self.remote {
            Some(remote) => remote.is_authorized().await,
            None => false,
        }
    }

    /// 创建备份
    ///
    /// 任何失败都以 `BackupResult::Failure` 返回。远程上传失败不影响本地备份的成功，
    /// 但会体现在结果的 `remote` 字段中。
    pub async fn create_backup(
        &self,
        actor_id: &str,
        options: BackupOptions,
        upload_to_remote: bool,
        remote_folder_id: Option<&str>,
    ) -> BackupResult {
        let started = Instant::now();
        let metadata = json!({
            "options": options,
            "uploadToRemote": upload_to_remote,
            "remoteFolderId": remote_folder_id,
        });

        let log_id = match self
            .database
            .start_maintenance_log(
                MaintenanceType::Backup,
                format!("备份: {}", options.describe()),
                actor_id,
                Some(metadata),
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!("无法写入审计日志，放弃备份: {}", e);
                return BackupResult::Failure(OperationFailure {
                    kind: FailureKind::AuditStore,
                    message: e.to_string(),
                    duration_seconds: started.elapsed().as_secs_f64(),
                    log_id: None,
                });
            }
        };

        let artifact_name = naming::generate_artifact_name(Utc::now());
        info!("开始创建备份: {} (操作者: {})", artifact_name, actor_id);

        let summary = match self.build_artifact(&artifact_name, options).await {
            Ok(summary) => summary,
            Err(e) => {
                let duration_seconds = started.elapsed().as_secs_f64();
                error!("备份创建失败: {}", e);
                self.finish_log(
                    log_id,
                    MaintenanceStatus::Failed,
                    MaintenanceOutcome {
                        duration_seconds,
                        error_message: Some(e.to_string()),
                        ..Default::default()
                    },
                )
                .await;
                return BackupResult::Failure(OperationFailure {
                    kind: FailureKind::ArchiveIo,
                    message: e.to_string(),
                    duration_seconds,
                    log_id: Some(log_id),
                });
            }
        };

        let remote = if upload_to_remote {
            self.upload_artifact(&artifact_name, remote_folder_id).await
        } else {
            RemoteCopy::NotRequested
        };

        let duration_seconds = started.elapsed().as_secs_f64();
        let remote_artifact_id = match &remote {
            RemoteCopy::Uploaded { remote_id } => Some(remote_id.clone()),
            _ => None,
        };
        self.finish_log(
            log_id,
            MaintenanceStatus::Completed,
            MaintenanceOutcome {
                artifact_name: artifact_name.clone(),
                file_size_bytes: summary.size,
                duration_seconds,
                remote_artifact_id,
                error_message: None,
                metadata: Some(json!({
                    "options": options,
                    "sources": summary.sources,
                    "sha256": summary.sha256,
                    "remote": remote,
                })),
            },
        )
        .await;

        info!(
            "备份创建成功: {} ({} 字节, {:.2} 秒)",
            artifact_name, summary.size, duration_seconds
        );
        BackupResult::Success(BackupSuccess {
            artifact_name,
            size: summary.size,
            duration_seconds,
            sha256: summary.sha256,
            remote,
            sources: summary.sources,
            log_id,
        })
    }

    /// 写入临时文件后再改名，失败时清理临时文件
    async fn build_artifact(&self, artifact_name: &str, options: BackupOptions) -> Result<ArchiveSummary> {
        tokio::fs::create_dir_all(&self.artifact_dir).await?;

        let final_path = self.artifact_dir.join(artifact_name);
        let partial_path = self
            .artifact_dir
            .join(format!("{artifact_name}{}", archive_consts::PARTIAL_SUFFIX));

        // 在后台线程中执行压缩操作，避免阻塞异步运行时
        let sources = self.sources.clone();
        let target = partial_path.clone();
        let exclude = self.artifact_dir.clone();
        let compression_level = self.compression_level;
        let built = tokio::task::spawn_blocking(move || {
            archive::write_archive(&sources, &options, &target, compression_level, Some(&exclude))
        })
        .await
        .map_err(KeeperError::from)
        .and_then(|r| r);

        let summary = match built {
            Ok(summary) => summary,
            Err(e) => {
                remove_partial(&partial_path).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&partial_path, &final_path).await {
            remove_partial(&partial_path).await;
            return Err(KeeperError::backup(format!("保存备份文件失败: {e}")));
        }
        Ok(summary)
    }

    /// 尽力上传，失败只记录在结果中
    async fn upload_artifact(&self, artifact_name: &str, folder_id: Option<&str>) -> RemoteCopy {
        let Some(remote) = &self.remote else {
            warn!("未配置远程存储，备份仅保存在本地");
            return RemoteCopy::Unavailable;
        };

        let path = self.artifact_dir.join(artifact_name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("读取备份文件失败，跳过上传: {}", e);
                return RemoteCopy::Failed {
                    message: e.to_string(),
                };
            }
        };

        match remote
            .upload_file(artifact_name, bytes, archive_consts::ARTIFACT_MIME_TYPE, folder_id)
            .await
        {
            Ok(file) => {
                info!("远程副本上传成功: {} -> {}", artifact_name, file.id);
                RemoteCopy::Uploaded { remote_id: file.id }
            }
            Err(e) => {
                warn!("远程副本上传失败，本地备份已保存: {}", e);
                RemoteCopy::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    /// 准备恢复：获取备份文件并校验完整性，不执行解压
    pub async fn restore_backup(
        &self,
        actor_id: &str,
        artifact_name: &str,
        remote_artifact_id: Option<&str>,
    ) -> RestoreResult {
        let started = Instant::now();
        let log_id = match self
            .database
            .start_maintenance_log(
                MaintenanceType::Restore,
                format!("恢复: {artifact_name}"),
                actor_id,
                Some(json!({
                    "artifactName": artifact_name,
                    "remoteArtifactId": remote_artifact_id,
                })),
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!("无法写入审计日志，放弃恢复: {}", e);
                return RestoreResult::Failure(OperationFailure {
                    kind: FailureKind::AuditStore,
                    message: e.to_string(),
                    duration_seconds: started.elapsed().as_secs_f64(),
                    log_id: None,
                });
            }
        };

        info!("开始准备恢复: {} (操作者: {})", artifact_name, actor_id);
        let fetched = self.fetch_artifact(artifact_name, remote_artifact_id).await;
        let duration_seconds = started.elapsed().as_secs_f64();

        match fetched {
            Ok((staged_path, source, size, entries)) => {
                self.finish_log(
                    log_id,
                    MaintenanceStatus::Completed,
                    MaintenanceOutcome {
                        artifact_name: artifact_name.to_string(),
                        file_size_bytes: size,
                        duration_seconds,
                        remote_artifact_id: remote_artifact_id
                            .filter(|_| source == RestoreSource::Remote)
                            .map(str::to_string),
                        error_message: None,
                        metadata: Some(json!({
                            "stagedPath": staged_path,
                            "source": source,
                            "entries": entries,
                        })),
                    },
                )
                .await;
                info!("备份文件已就位: {} ({} 个条目)", staged_path.display(), entries);
                RestoreResult::Success(RestoreSuccess {
                    artifact_name: artifact_name.to_string(),
                    staged_path,
                    size,
                    entries,
                    source,
                    duration_seconds,
                    log_id,
                })
            }
            Err(e) => {
                error!("恢复准备失败: {}", e);
                self.finish_log(
                    log_id,
                    MaintenanceStatus::Failed,
                    MaintenanceOutcome {
                        artifact_name: artifact_name.to_string(),
                        duration_seconds,
                        remote_artifact_id: remote_artifact_id.map(str::to_string),
                        error_message: Some(e.to_string()),
                        ..Default::default()
                    },
                )
                .await;
                RestoreResult::Failure(OperationFailure {
                    kind: FailureKind::RestoreFetch,
                    message: e.to_string(),
                    duration_seconds,
                    log_id: Some(log_id),
                })
            }
        }
    }

    async fn fetch_artifact(
        &self,
        artifact_name: &str,
        remote_artifact_id: Option<&str>,
    ) -> Result<(PathBuf, RestoreSource, u64, usize)> {
        naming::validate_artifact_name(artifact_name)?;

        let path = match (remote_artifact_id, &self.remote) {
            (Some(remote_id), Some(remote)) => {
                let bytes = remote.download_file(remote_id).await?;
                return self.stage_download(artifact_name, &bytes).await;
            }
            (Some(_), None) => {
                warn!("未配置远程存储，改用本地备份文件: {}", artifact_name);
                self.artifact_dir.join(artifact_name)
            }
            (None, _) => self.artifact_dir.join(artifact_name),
        };

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(KeeperError::restore(format!("不是文件: {}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KeeperError::restore(format!("备份文件不存在: {}", path.display())));
            }
            Err(e) => return Err(e.into()),
        };

        let verify_path = path.clone();
        let entries = tokio::task::spawn_blocking(move || archive::verify_archive(&verify_path)).await??;

        Ok((path, RestoreSource::Local, metadata.len(), entries.len()))
    }

    /// 下载内容先写入临时文件并校验，通过后才以备份文件名出现在暂存目录
    async fn stage_download(
        &self,
        artifact_name: &str,
        bytes: &[u8],
    ) -> Result<(PathBuf, RestoreSource, u64, usize)> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let staged = self.staging_dir.join(artifact_name);
        let partial = self
            .staging_dir
            .join(format!("{artifact_name}{}", archive_consts::PARTIAL_SUFFIX));

        match verify_then_rename(&partial, &staged, bytes).await {
            Ok(entries) => Ok((staged, RestoreSource::Remote, bytes.len() as u64, entries)),
            Err(e) => {
                remove_partial(&partial).await;
                Err(e)
            }
        }
    }

    /// 清理过期备份文件及对应的审计日志
    pub async fn cleanup_old_backups(&self, retention_days: i32) -> CleanupReport {
        if retention_days <= 0 {
            return CleanupReport::default();
        }

        // 超出时间范围时没有任何文件足够旧
        let Some(cutoff) = TimeDelta::try_days(i64::from(retention_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            warn!("保留天数 {} 超出时间范围，不执行清理", retention_days);
            return CleanupReport::default();
        };
        let mut report = retention::prune_artifacts(&self.artifact_dir, cutoff).await;

        match self.database.purge_maintenance_logs(cutoff).await {
            Ok(count) => report.purged_log_count = count,
            Err(e) => {
                warn!("清理审计日志失败: {}", e);
                report.errors.push(format!("清理审计日志失败: {e}"));
            }
        }

        info!(
            "清理完成: 删除 {} 个备份文件, {} 条审计日志, {} 个错误",
            report.deleted_count,
            report.purged_log_count,
            report.errors.len()
        );
        report
    }

    /// 列出本地备份文件，按名称倒序（即最新在前）
    pub async fn list_artifacts(&self) -> Result<Vec<ArtifactInfo>> {
        let mut artifacts = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.artifact_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(artifacts),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !naming::is_artifact_name(&name) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            artifacts.push(ArtifactInfo {
                created_at: naming::parse_artifact_timestamp(&name),
                size: metadata.len(),
                name,
            });
        }

        artifacts.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(artifacts)
    }

    /// 审计日志终态写入失败只记录，不改变操作结果
    async fn finish_log(&self, log_id: i64, status: MaintenanceStatus, outcome: MaintenanceOutcome) {
        if let Err(e) = self
            .database
            .finish_maintenance_log(log_id, status, outcome)
            .await
        {
            error!("更新审计日志 {} 失败: {}", log_id, e);
        }
    }
}

async fn verify_then_rename(partial: &Path, target: &Path, bytes: &[u8]) -> Result<usize> {
    tokio::fs::write(partial, bytes).await?;
    let verify_path = partial.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || archive::verify_archive(&verify_path)).await??;
    tokio::fs::rename(partial, target).await?;
    Ok(entries.len())
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("已删除未完成的文件: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("删除未完成的文件失败 {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteFile;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        _temp_dir: TempDir,
        root: PathBuf,
        database: Database,
        orchestrator: BackupOrchestrator,
    }

    async fn fixture() -> Fixture {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().to_path_buf();
        let database = Database::connect_memory().await.unwrap();
        let sources = BackupSources {
            data_store: root.join("data").join("app.db"),
            uploads_dir: root.join("uploads"),
            config_files: vec![root.join(".env")],
            logs_dir: root.join("logs"),
        };
        let orchestrator = BackupOrchestrator::new(
            root.join("backups"),
            root.join("staging"),
            sources,
            6,
            database.clone(),
        );
        Fixture {
            _temp_dir: temp_dir,
            root,
            database,
            orchestrator,
        }
    }

    fn populate_sources(root: &Path) {
        std::fs::create_dir_all(root.join("data")).unwrap();
        std::fs::write(root.join("data").join("app.db"), b"SQLite format 3").unwrap();
        std::fs::create_dir_all(root.join("uploads").join("docs")).unwrap();
        std::fs::write(root.join("uploads").join("docs").join("a.pdf"), b"%PDF").unwrap();
        std::fs::write(root.join(".env"), b"SECRET=1").unwrap();
        std::fs::create_dir_all(root.join("logs")).unwrap();
        std::fs::write(root.join("logs").join("app.log"), b"started").unwrap();
    }

    fn leftover_partials(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .filter(|n| n.ends_with(archive_consts::PARTIAL_SUFFIX))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 可控的远程存储替身
    struct FakeRemote {
        fail: bool,
        uploads: Mutex<Vec<(String, usize, Option<String>)>>,
        download: Vec<u8>,
    }

    impl FakeRemote {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                uploads: Mutex::new(Vec::new()),
                download: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl RemoteStorage for FakeRemote {
        async fn is_authorized(&self) -> bool {
            !self.fail
        }

        async fn upload_file(
            &self,
            name: &str,
            bytes: Vec<u8>,
            _mime_type: &str,
            folder_id: Option<&str>,
        ) -> Result<RemoteFile> {
            if self.fail {
                return Err(KeeperError::remote("connection reset"));
            }
            self.uploads
                .lock()
                .unwrap()
                .push((name.to_string(), bytes.len(), folder_id.map(str::to_string)));
            Ok(RemoteFile {
                id: "remote-1".to_string(),
                name: name.to_string(),
                size: Some(bytes.len() as u64),
                mime_type: None,
                created_time: None,
                modified_time: None,
            })
        }

        async fn download_file(&self, _file_id: &str) -> Result<Vec<u8>> {
            if self.fail {
                return Err(KeeperError::auth("token revoked"));
            }
            Ok(self.download.clone())
        }
    }

    #[tokio::test]
    async fn test_every_flag_combination_completes() {
        let f = fixture().await;
        populate_sources(&f.root);

        for mask in 0u8..16 {
            let options = BackupOptions {
                include_data_store: mask & 1 != 0,
                include_uploads: mask & 2 != 0,
                include_config: mask & 4 != 0,
                include_logs: mask & 8 != 0,
            };
            let result = f.orchestrator.create_backup("admin", options, false, None).await;
            let BackupResult::Success(success) = result else {
                panic!("mask {mask} failed: {result:?}");
            };
            assert!(success.size > 0);
            assert_eq!(success.remote, RemoteCopy::NotRequested);

            let entry = f.database.get_maintenance_log(success.log_id).await.unwrap().unwrap();
            assert_eq!(entry.status, MaintenanceStatus::Completed);
            assert_eq!(entry.file_size_bytes, success.size);
            assert!(entry.ended_at.is_some());

            let entries = archive::verify_archive(&f.orchestrator.artifact_dir().join(&success.artifact_name))
                .unwrap();
            assert_eq!(entries.len(), mask.count_ones() as usize);
        }
        assert!(leftover_partials(f.orchestrator.artifact_dir()).is_empty());
    }

    #[tokio::test]
    async fn test_absent_sources_still_complete() {
        let f = fixture().await;

        let result = f
            .orchestrator
            .create_backup("admin", BackupOptions::all(), false, None)
            .await;
        let BackupResult::Success(success) = result else {
            panic!("backup failed");
        };
        assert!(success.size > 0);
        assert!(
            success
                .sources
                .iter()
                .all(|r| r.outcome == SourceOutcome::SkippedMissing)
        );
        let entry = f.database.get_maintenance_log(success.log_id).await.unwrap().unwrap();
        assert_eq!(entry.status, MaintenanceStatus::Completed);
    }

    #[tokio::test]
    async fn test_rapid_backups_have_distinct_names() {
        let f = fixture().await;
        let (a, b) = tokio::join!(
            f.orchestrator.create_backup("admin", BackupOptions::default(), false, None),
            f.orchestrator.create_backup("admin", BackupOptions::default(), false, None),
        );
        assert!(a.is_success() && b.is_success());
        assert_ne!(a.artifact_name(), b.artifact_name());
        assert_eq!(f.orchestrator.list_artifacts().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unwritable_artifact_dir_fails_cleanly() {
        let f = fixture().await;
        populate_sources(&f.root);
        // 备份目录被同名文件占据，无法创建
        std::fs::write(f.root.join("backups"), b"not a directory").unwrap();

        let result = f
            .orchestrator
            .create_backup("admin", BackupOptions::all(), false, None)
            .await;
        assert!(!result.is_success());
        assert_eq!(result.artifact_name(), "");
        assert_eq!(result.size(), 0);
        assert!(!result.error_message().unwrap_or_default().is_empty());

        let logs = f.database.list_maintenance_logs(None).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, MaintenanceStatus::Failed);
        assert!(logs[0].error_message.is_some());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_partial() {
        let f = fixture().await;
        populate_sources(&f.root);
        let name = naming::generate_artifact_name(Utc::now());
        // 目标位置被同名目录占据，归档写完后改名失败
        std::fs::create_dir_all(f.orchestrator.artifact_dir().join(&name).join("occupied")).unwrap();

        let built = f.orchestrator.build_artifact(&name, BackupOptions::all()).await;
        assert!(matches!(built, Err(KeeperError::Backup(_))));
        assert!(leftover_partials(f.orchestrator.artifact_dir()).is_empty());
        assert!(f.orchestrator.artifact_dir().join(&name).is_dir());
    }

    #[tokio::test]
    async fn test_data_store_only_has_single_entry() {
        let f = fixture().await;
        populate_sources(&f.root);

        let options = BackupOptions {
            include_data_store: true,
            ..Default::default()
        };
        let result = f.orchestrator.create_backup("admin", options, false, None).await;
        let BackupResult::Success(success) = result else {
            panic!("backup failed");
        };

        let entries =
            archive::verify_archive(&f.orchestrator.artifact_dir().join(&success.artifact_name)).unwrap();
        assert_eq!(entries, vec!["database/app.db"]);

        let entry = f.database.get_maintenance_log(success.log_id).await.unwrap().unwrap();
        assert_eq!(entry.status.as_str(), "completed");
        assert!(entry.file_size_bytes > 0);
        assert_eq!(entry.artifact_name, success.artifact_name);
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_local_success() {
        let f = fixture().await;
        populate_sources(&f.root);
        let orchestrator = f.orchestrator.clone().with_remote(Arc::new(FakeRemote::new(true)));

        let result = orchestrator
            .create_backup("admin", BackupOptions::all(), true, None)
            .await;
        assert!(result.is_success());
        assert!(result.remote_upload_attempted());
        assert_eq!(result.remote_id(), None);
        let BackupResult::Success(success) = result else {
            unreachable!();
        };
        assert!(matches!(success.remote, RemoteCopy::Failed { .. }));
        let entry = f.database.get_maintenance_log(success.log_id).await.unwrap().unwrap();
        assert_eq!(entry.status, MaintenanceStatus::Completed);
        assert_eq!(entry.remote_artifact_id, None);
    }

    #[tokio::test]
    async fn test_remote_upload_recorded() {
        let f = fixture().await;
        populate_sources(&f.root);
        let remote = Arc::new(FakeRemote::new(false));
        let orchestrator = f.orchestrator.clone().with_remote(remote.clone());
        assert!(orchestrator.remote_ready().await);

        let result = orchestrator
            .create_backup("admin", BackupOptions::all(), true, Some("folder-9"))
            .await;
        assert_eq!(result.remote_id(), Some("remote-1"));

        let uploads = remote.uploads.lock().unwrap().clone();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, result.artifact_name());
        assert_eq!(uploads[0].1 as u64, result.size());
        assert_eq!(uploads[0].2.as_deref(), Some("folder-9"));

        let logs = f.database.list_maintenance_logs(Some(1)).await.unwrap();
        assert_eq!(logs[0].remote_artifact_id.as_deref(), Some("remote-1"));
    }

    #[tokio::test]
    async fn test_upload_without_remote_is_unavailable() {
        let f = fixture().await;
        assert!(!f.orchestrator.remote_ready().await);
        let result = f
            .orchestrator
            .create_backup("admin", BackupOptions::default(), true, None)
            .await;
        let BackupResult::Success(success) = result else {
            panic!("backup failed");
        };
        assert_eq!(success.remote, RemoteCopy::Unavailable);
    }

    #[tokio::test]
    async fn test_restore_local_artifact() {
        let f = fixture().await;
        populate_sources(&f.root);
        let backup = f
            .orchestrator
            .create_backup("admin", BackupOptions::all(), false, None)
            .await;

        let result = f
            .orchestrator
            .restore_backup("admin", backup.artifact_name(), None)
            .await;
        let RestoreResult::Success(success) = result else {
            panic!("restore failed");
        };
        assert_eq!(success.source, RestoreSource::Local);
        assert_eq!(success.entries, 4);
        assert_eq!(success.size, backup.size());

        let entry = f.database.get_maintenance_log(success.log_id).await.unwrap().unwrap();
        assert_eq!(entry.log_type, MaintenanceType::Restore);
        assert_eq!(entry.status, MaintenanceStatus::Completed);
    }

    #[tokio::test]
    async fn test_restore_missing_artifact_fails() {
        let f = fixture().await;
        let result = f
            .orchestrator
            .restore_backup("admin", "backup-2020-01-01T00-00-00-000-deadbeef.tar.gz", None)
            .await;
        assert!(!result.is_success());
        let RestoreResult::Failure(failure) = result else {
            unreachable!();
        };
        assert_eq!(failure.kind, FailureKind::RestoreFetch);

        let entry = f
            .database
            .get_maintenance_log(failure.log_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, MaintenanceStatus::Failed);

        let traversal = f.orchestrator.restore_backup("admin", "../secrets.json", None).await;
        assert!(!traversal.is_success());
    }

    #[tokio::test]
    async fn test_restore_from_remote_is_staged() {
        let f = fixture().await;
        populate_sources(&f.root);
        let backup = f
            .orchestrator
            .create_backup("admin", BackupOptions::all(), false, None)
            .await;
        let bytes = std::fs::read(f.orchestrator.artifact_dir().join(backup.artifact_name())).unwrap();

        let remote = FakeRemote {
            download: bytes,
            ..FakeRemote::new(false)
        };
        let orchestrator = f.orchestrator.clone().with_remote(Arc::new(remote));
        let result = orchestrator
            .restore_backup("admin", backup.artifact_name(), Some("remote-1"))
            .await;
        let RestoreResult::Success(success) = result else {
            panic!("restore failed");
        };
        assert_eq!(success.source, RestoreSource::Remote);
        assert_eq!(success.staged_path, f.root.join("staging").join(backup.artifact_name()));
        assert!(success.staged_path.exists());
        assert!(leftover_partials(&f.root.join("staging")).is_empty());

        // 下载失败是该次恢复的终态失败
        let failing = f.orchestrator.clone().with_remote(Arc::new(FakeRemote::new(true)));
        let result = failing
            .restore_backup("admin", backup.artifact_name(), Some("remote-1"))
            .await;
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired() {
        let f = fixture().await;
        let dir = f.orchestrator.artifact_dir().to_path_buf();
        std::fs::create_dir_all(&dir).unwrap();
        let now = Utc::now();
        for days in [10, 5, 1] {
            let name = naming::generate_artifact_name(now - TimeDelta::days(days));
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        let mut log_ids = Vec::new();
        for _ in 0..2 {
            let id = f
                .database
                .insert_maintenance_log(
                    MaintenanceType::Backup,
                    "old".to_string(),
                    "admin",
                    None,
                    now - TimeDelta::days(10),
                )
                .await
                .unwrap();
            log_ids.push(id);
        }
        f.database
            .finish_maintenance_log(log_ids[0], MaintenanceStatus::Completed, MaintenanceOutcome::default())
            .await
            .unwrap();

        let report = f.orchestrator.cleanup_old_backups(7).await;
        assert_eq!(report.deleted_count, 1);
        assert!(report.errors.is_empty());
        assert_eq!(f.orchestrator.list_artifacts().await.unwrap().len(), 2);
        // 仍在 running 的审计日志不会被清理
        assert_eq!(report.purged_log_count, 1);
        assert!(f.database.get_maintenance_log(log_ids[1]).await.unwrap().is_some());

        let noop = f.orchestrator.cleanup_old_backups(0).await;
        assert_eq!(noop.deleted_count, 0);
    }

    #[tokio::test]
    async fn test_cleanup_with_huge_retention_keeps_everything() {
        let f = fixture().await;
        let dir = f.orchestrator.artifact_dir().to_path_buf();
        std::fs::create_dir_all(&dir).unwrap();
        let name = naming::generate_artifact_name(Utc::now() - TimeDelta::days(400));
        std::fs::write(dir.join(&name), b"x").unwrap();

        for days in [200_000_000, i32::MAX] {
            let report = f.orchestrator.cleanup_old_backups(days).await;
            assert_eq!(report.deleted_count, 0);
            assert!(report.errors.is_empty());
        }
        assert!(dir.join(&name).exists());
    }

    #[tokio::test]
    async fn test_corrupt_remote_download_is_not_staged() {
        let f = fixture().await;
        let remote = FakeRemote {
            download: b"not a gzip tarball".to_vec(),
            ..FakeRemote::new(false)
        };
        let orchestrator = f.orchestrator.clone().with_remote(Arc::new(remote));
        let name = "backup-2026-01-01T02-00-00-000-1a2b3c4d.tar.gz";

        let result = orchestrator.restore_backup("admin", name, Some("remote-1")).await;
        let RestoreResult::Failure(failure) = result else {
            panic!("corrupt download was accepted");
        };
        assert_eq!(failure.kind, FailureKind::RestoreFetch);

        let staging = f.root.join("staging");
        assert!(!staging.join(name).exists());
        assert!(leftover_partials(&staging).is_empty());

        let entry = f
            .database
            .get_maintenance_log(failure.log_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, MaintenanceStatus::Failed);
    }
}
