use crate::{
    KeeperError, Result,
    constants::cron,
    db::{
        BackupConfigurationRow, DuckDbManager, FinishMaintenanceLogRow, MaintenanceLogRow,
        NewMaintenanceLogRow,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// 数据库管理器 - DuckDB适配器
#[derive(Debug, Clone)]
pub struct Database {
    manager: DuckDbManager,
}

/// 备份任务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupConfiguration {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub schedule_enabled: bool,
    pub schedule_pattern: Option<String>,
    pub include_data_store: bool,
    pub include_uploads: bool,
    pub include_config: bool,
    pub include_logs: bool,
    pub remote_folder_id: Option<String>,
    pub retention_days: i32,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 审计日志类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MaintenanceType {
    Backup,
    Restore,
}

/// 审计日志状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MaintenanceStatus {
    Running,
    Completed,
    Failed,
}

/// 审计日志
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceLogEntry {
    pub id: i64,
    pub log_type: MaintenanceType,
    pub status: MaintenanceStatus,
    pub description: String,
    pub artifact_name: String,
    pub file_size_bytes: u64,
    pub file_size_formatted: String,
    pub duration_seconds: f64,
    pub remote_artifact_id: Option<String>,
    pub error_message: Option<String>,
    pub actor_id: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// 审计日志的终态数据
#[derive(Debug, Clone, Default)]
pub struct MaintenanceOutcome {
    pub artifact_name: String,
    pub file_size_bytes: u64,
    pub duration_seconds: f64,
    pub remote_artifact_id: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl MaintenanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceType::Backup => "backup",
            MaintenanceType::Restore => "restore",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "backup" => Ok(MaintenanceType::Backup),
            "restore" => Ok(MaintenanceType::Restore),
            other => Err(KeeperError::DuckDb(format!("未知的审计日志类型: {other}"))),
        }
    }
}

impl MaintenanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceStatus::Running => "running",
            MaintenanceStatus::Completed => "completed",
            MaintenanceStatus::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "running" => Ok(MaintenanceStatus::Running),
            "completed" => Ok(MaintenanceStatus::Completed),
            "failed" => Ok(MaintenanceStatus::Failed),
            other => Err(KeeperError::DuckDb(format!("未知的审计日志状态: {other}"))),
        }
    }
}

impl fmt::Display for MaintenanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BackupConfiguration {
    /// 创建新的备份任务配置，默认启用且不定时
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            is_active: true,
            schedule_enabled: false,
            schedule_pattern: None,
            include_data_store: true,
            include_uploads: true,
            include_config: true,
            include_logs: false,
            remote_folder_id: None,
            retention_days: cron::DEFAULT_RETENTION_DAYS,
            last_backup_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 是否满足注册定时任务的基本条件（不含表达式校验）
    pub fn wants_schedule(&self) -> bool {
        self.is_active
            && self.schedule_enabled
            && self
                .schedule_pattern
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty())
    }

    fn from_row(row: BackupConfigurationRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            is_active: row.is_active,
            schedule_enabled: row.schedule_enabled,
            schedule_pattern: row.schedule_pattern,
            include_data_store: row.include_data_store,
            include_uploads: row.include_uploads,
            include_config: row.include_config,
            include_logs: row.include_logs,
            remote_folder_id: row.remote_folder_id,
            retention_days: row.retention_days,
            last_backup_at: row.last_backup_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn into_row(self) -> BackupConfigurationRow {
        BackupConfigurationRow {
            id: self.id,
            name: self.name,
            is_active: self.is_active,
            schedule_enabled: self.schedule_enabled,
            schedule_pattern: self.schedule_pattern,
            include_data_store: self.include_data_store,
            include_uploads: self.include_uploads,
            include_config: self.include_config,
            include_logs: self.include_logs,
            remote_folder_id: self.remote_folder_id,
            retention_days: self.retention_days,
            last_backup_at: self.last_backup_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl MaintenanceLogEntry {
    fn from_row(row: MaintenanceLogRow) -> Result<Self> {
        let metadata = row
            .metadata
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        Ok(Self {
            id: row.id,
            log_type: MaintenanceType::parse(&row.log_type)?,
            status: MaintenanceStatus::parse(&row.status)?,
            description: row.description,
            artifact_name: row.artifact_name,
            file_size_bytes: row.file_size_bytes.max(0) as u64,
            file_size_formatted: row.file_size_formatted,
            duration_seconds: row.duration_seconds,
            remote_artifact_id: row.remote_artifact_id,
            error_message: row.error_message,
            actor_id: row.actor_id,
            metadata,
            created_at: row.created_at,
            ended_at: row.ended_at,
        })
    }
}

/// 格式化文件大小
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", UNITS[unit])
}

impl Database {
    /// 连接到数据库
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let manager = DuckDbManager::new(db_path).await?;
        Ok(Database { manager })
    }

    /// 连接到内存数据库 (主要用于测试，生产环境建议使用connect()以确保数据持久化)
    pub async fn connect_memory() -> Result<Self> {
        let manager = DuckDbManager::new_memory().await?;
        Ok(Database { manager })
    }

    // ========================================
    // 备份任务配置
    // ========================================

    /// 新建备份任务配置
    pub async fn create_backup_configuration(
        &self,
        config: BackupConfiguration,
    ) -> Result<BackupConfiguration> {
        if self.manager.get_configuration(&config.id).await?.is_some() {
            return Err(KeeperError::InvalidInput(format!(
                "备份任务已存在: {}",
                config.id
            )));
        }
        self.manager.upsert_configuration(config.clone().into_row()).await?;
        Ok(config)
    }

    /// 更新备份任务配置
    pub async fn update_backup_configuration(
        &self,
        mut config: BackupConfiguration,
    ) -> Result<BackupConfiguration> {
        if self.manager.get_configuration(&config.id).await?.is_none() {
            return Err(KeeperError::NotFound(format!("备份任务: {}", config.id)));
        }
        config.updated_at = Utc::now();
        self.manager.upsert_configuration(config.clone().into_row()).await?;
        // 重新读取，返回库中实际的 last_backup_at
        self.get_backup_configuration(&config.id)
            .await?
            .ok_or_else(|| KeeperError::NotFound(format!("备份任务: {}", config.id)))
    }

    /// 根据ID获取备份任务配置
    pub async fn get_backup_configuration(&self, id: &str) -> Result<Option<BackupConfiguration>> {
        Ok(self
            .manager
            .get_configuration(id)
            .await?
            .map(BackupConfiguration::from_row))
    }

    /// 获取所有备份任务配置
    pub async fn list_backup_configurations(&self) -> Result<Vec<BackupConfiguration>> {
        Ok(self
            .manager
            .list_configurations()
            .await?
            .into_iter()
            .map(BackupConfiguration::from_row)
            .collect())
    }

    /// 获取启用了定时的备份任务配置
    pub async fn list_schedulable_configurations(&self) -> Result<Vec<BackupConfiguration>> {
        Ok(self
            .manager
            .list_schedulable_configurations()
            .await?
            .into_iter()
            .map(BackupConfiguration::from_row)
            .collect())
    }

    /// 更新最后备份时间
    pub async fn set_last_backup_at(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if !self.manager.set_last_backup_at(id, at).await? {
            return Err(KeeperError::NotFound(format!("备份任务: {id}")));
        }
        Ok(())
    }

    // ========================================
    // 审计日志
    // ========================================

    /// 创建运行中的审计日志
    pub async fn start_maintenance_log(
        &self,
        log_type: MaintenanceType,
        description: impl Into<String>,
        actor_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<i64> {
        self.insert_maintenance_log(log_type, description.into(), actor_id, metadata, Utc::now())
            .await
    }

    /// 按指定创建时间写入审计日志
    pub async fn insert_maintenance_log(
        &self,
        log_type: MaintenanceType,
        description: String,
        actor_id: &str,
        metadata: Option<serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let metadata = metadata.map(|m| m.to_string());
        self.manager
            .start_maintenance_log(NewMaintenanceLogRow {
                log_type: log_type.as_str().to_string(),
                description,
                actor_id: actor_id.to_string(),
                metadata,
                created_at,
            })
            .await
    }

    /// 把审计日志更新为终态，只允许从 running 迁移一次
    pub async fn finish_maintenance_log(
        &self,
        id: i64,
        status: MaintenanceStatus,
        outcome: MaintenanceOutcome,
    ) -> Result<()> {
        if status == MaintenanceStatus::Running {
            return Err(KeeperError::InvalidInput(
                "审计日志只能更新为 completed 或 failed".to_string(),
            ));
        }

        let row = FinishMaintenanceLogRow {
            status: status.as_str().to_string(),
            file_size_formatted: format_file_size(outcome.file_size_bytes),
            artifact_name: outcome.artifact_name,
            file_size_bytes: outcome.file_size_bytes as i64,
            duration_seconds: outcome.duration_seconds,
            remote_artifact_id: outcome.remote_artifact_id,
            error_message: outcome.error_message,
            metadata: outcome.metadata.map(|m| m.to_string()),
            ended_at: Utc::now(),
        };

        if !self.manager.finish_maintenance_log(id, row).await? {
            return Err(KeeperError::InvalidInput(format!(
                "审计日志 {id} 不存在或已结束"
            )));
        }
        Ok(())
    }

    /// 根据ID获取审计日志
    pub async fn get_maintenance_log(&self, id: i64) -> Result<Option<MaintenanceLogEntry>> {
        self.manager
            .get_maintenance_log(id)
            .await?
            .map(MaintenanceLogEntry::from_row)
            .transpose()
    }

    /// 获取最近的审计日志
    pub async fn list_maintenance_logs(&self, limit: Option<i64>) -> Result<Vec<MaintenanceLogEntry>> {
        self.manager
            .list_maintenance_logs(limit)
            .await?
            .into_iter()
            .map(MaintenanceLogEntry::from_row)
            .collect()
    }

    /// 删除早于指定时间的审计日志
    pub async fn purge_maintenance_logs(&self, before: DateTime<Utc>) -> Result<usize> {
        self.manager.purge_maintenance_logs(before).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.duckdb");
        let db = Database::connect(&db_path).await.unwrap();
        assert!(db.list_backup_configurations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_configuration_crud() {
        let db = Database::connect_memory().await.unwrap();

        let mut config = BackupConfiguration::new("nightly");
        config.schedule_enabled = true;
        config.schedule_pattern = Some("0 2 * * *".to_string());
        let created = db.create_backup_configuration(config.clone()).await.unwrap();

        // 重复创建应失败
        assert!(db.create_backup_configuration(config).await.is_err());

        let loaded = db
            .get_backup_configuration(&created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name, "nightly");
        assert_eq!(loaded.schedule_pattern.as_deref(), Some("0 2 * * *"));
        assert!(loaded.last_backup_at.is_none());

        let mut edited = loaded.clone();
        edited.is_active = false;
        db.update_backup_configuration(edited).await.unwrap();
        let reloaded = db
            .get_backup_configuration(&created.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!reloaded.is_active);
    }

    #[tokio::test]
    async fn test_schedulable_filter() {
        let db = Database::connect_memory().await.unwrap();

        let mut live = BackupConfiguration::new("live");
        live.schedule_enabled = true;
        live.schedule_pattern = Some("*/5 * * * *".to_string());
        db.create_backup_configuration(live.clone()).await.unwrap();

        let mut inactive = BackupConfiguration::new("inactive");
        inactive.is_active = false;
        inactive.schedule_enabled = true;
        inactive.schedule_pattern = Some("*/5 * * * *".to_string());
        db.create_backup_configuration(inactive).await.unwrap();

        let mut no_pattern = BackupConfiguration::new("no-pattern");
        no_pattern.schedule_enabled = true;
        db.create_backup_configuration(no_pattern).await.unwrap();

        db.create_backup_configuration(BackupConfiguration::new("manual"))
            .await
            .unwrap();

        let schedulable = db.list_schedulable_configurations().await.unwrap();
        assert_eq!(schedulable.len(), 1);
        assert_eq!(schedulable[0].id, live.id);
    }

    #[tokio::test]
    async fn test_set_last_backup_at() {
        let db = Database::connect_memory().await.unwrap();
        let config = db
            .create_backup_configuration(BackupConfiguration::new("a"))
            .await
            .unwrap();

        let now = Utc::now();
        db.set_last_backup_at(&config.id, now).await.unwrap();
        let loaded = db.get_backup_configuration(&config.id).await.unwrap().unwrap();
        let stored = loaded.last_backup_at.unwrap();
        assert!((stored - now).num_milliseconds().abs() < 1000);

        assert!(db.set_last_backup_at("missing", now).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_edit_keeps_last_backup_at() {
        let db = Database::connect_memory().await.unwrap();
        let config = db
            .create_backup_configuration(BackupConfiguration::new("nightly"))
            .await
            .unwrap();

        // 编辑前读取的快照，随后定时备份完成
        let mut stale = db.get_backup_configuration(&config.id).await.unwrap().unwrap();
        let now = Utc::now();
        db.set_last_backup_at(&config.id, now).await.unwrap();

        stale.retention_days = 7;
        let returned = db.update_backup_configuration(stale).await.unwrap();
        assert_eq!(returned.retention_days, 7);
        assert!(returned.last_backup_at.is_some());

        let loaded = db.get_backup_configuration(&config.id).await.unwrap().unwrap();
        let stored = loaded.last_backup_at.unwrap();
        assert!((stored - now).num_milliseconds().abs() < 1000);
        assert_eq!(loaded.retention_days, 7);
    }

    #[test]
    fn test_unknown_log_values_are_rejected() {
        assert_eq!(MaintenanceStatus::parse("failed").unwrap(), MaintenanceStatus::Failed);
        assert_eq!(MaintenanceType::parse("restore").unwrap(), MaintenanceType::Restore);
        assert!(matches!(MaintenanceStatus::parse("done"), Err(KeeperError::DuckDb(_))));
        assert!(MaintenanceType::parse("").is_err());
    }

    #[tokio::test]
    async fn test_maintenance_log_transitions_once() {
        let db = Database::connect_memory().await.unwrap();

        let id = db
            .start_maintenance_log(MaintenanceType::Backup, "手动备份", "admin", None)
            .await
            .unwrap();
        let entry = db.get_maintenance_log(id).await.unwrap().unwrap();
        assert_eq!(entry.status, MaintenanceStatus::Running);
        assert!(entry.ended_at.is_none());

        db.finish_maintenance_log(
            id,
            MaintenanceStatus::Completed,
            MaintenanceOutcome {
                artifact_name: "backup-x.tar.gz".to_string(),
                file_size_bytes: 2048,
                duration_seconds: 1.5,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let entry = db.get_maintenance_log(id).await.unwrap().unwrap();
        assert_eq!(entry.status, MaintenanceStatus::Completed);
        assert_eq!(entry.file_size_formatted, "2.00 KB");
        assert!(entry.ended_at.is_some());

        // 终态不能再次迁移
        let second = db
            .finish_maintenance_log(id, MaintenanceStatus::Failed, MaintenanceOutcome::default())
            .await;
        assert!(second.is_err());
        let entry = db.get_maintenance_log(id).await.unwrap().unwrap();
        assert_eq!(entry.status, MaintenanceStatus::Completed);

        // 不能迁移回 running
        let other = db
            .start_maintenance_log(MaintenanceType::Restore, "恢复", "admin", None)
            .await
            .unwrap();
        assert!(
            db.finish_maintenance_log(other, MaintenanceStatus::Running, MaintenanceOutcome::default())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_purge_only_old_finished_logs() {
        let db = Database::connect_memory().await.unwrap();
        let now = Utc::now();

        let old = db
            .insert_maintenance_log(
                MaintenanceType::Backup,
                "old".to_string(),
                "system",
                None,
                now - Duration::days(10),
            )
            .await
            .unwrap();
        db.finish_maintenance_log(old, MaintenanceStatus::Completed, MaintenanceOutcome::default())
            .await
            .unwrap();

        // 仍在运行的旧记录不删除
        db.insert_maintenance_log(
            MaintenanceType::Backup,
            "old-running".to_string(),
            "system",
            None,
            now - Duration::days(10),
        )
        .await
        .unwrap();

        let recent = db
            .start_maintenance_log(MaintenanceType::Backup, "recent", "system", None)
            .await
            .unwrap();
        db.finish_maintenance_log(recent, MaintenanceStatus::Failed, MaintenanceOutcome::default())
            .await
            .unwrap();

        let purged = db
            .purge_maintenance_logs(now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(db.list_maintenance_logs(None).await.unwrap().len(), 2);
        assert_eq!(db.list_maintenance_logs(Some(1)).await.unwrap().len(), 1);
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MB");
    }
}
