use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 备份任务配置行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfigurationRow {
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

/// 审计日志行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceLogRow {
    pub id: i64,
    pub log_type: String,
    pub status: String,
    pub description: String,
    pub artifact_name: String,
    pub file_size_bytes: i64,
    pub file_size_formatted: String,
    pub duration_seconds: f64,
    pub remote_artifact_id: Option<String>,
    pub error_message: Option<String>,
    pub actor_id: String,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// 新建审计日志的参数
#[derive(Debug, Clone)]
pub struct NewMaintenanceLogRow {
    pub log_type: String,
    pub description: String,
    pub actor_id: String,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 审计日志终态更新
#[derive(Debug, Clone)]
pub struct FinishMaintenanceLogRow {
    pub status: String,
    pub artifact_name: String,
    pub file_size_bytes: i64,
    pub file_size_formatted: String,
    pub duration_seconds: f64,
    pub remote_artifact_id: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<String>,
    pub ended_at: DateTime<Utc>,
}
