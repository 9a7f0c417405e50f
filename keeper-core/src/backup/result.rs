use crate::database::BackupConfiguration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 备份选项：未设置即不包含，从不视为错误
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupOptions {
    pub include_data_store: bool,
    pub include_uploads: bool,
    pub include_config: bool,
    pub include_logs: bool,
}

impl BackupOptions {
    pub fn all() -> Self {
        Self {
            include_data_store: true,
            include_uploads: true,
            include_config: true,
            include_logs: true,
        }
    }

    /// 该数据源是否被请求
    pub fn includes(&self, source: SourceKind) -> bool {
        match source {
            SourceKind::DataStore => self.include_data_store,
            SourceKind::Uploads => self.include_uploads,
            SourceKind::Config => self.include_config,
            SourceKind::Logs => self.include_logs,
        }
    }

    /// 简短描述，用于审计日志
    pub fn describe(&self) -> String {
        let parts: Vec<&str> = SourceKind::ALL
            .iter()
            .filter(|s| self.includes(**s))
            .map(|s| s.label())
            .collect();
        if parts.is_empty() {
            "空备份".to_string()
        } else {
            parts.join(" + ")
        }
    }
}

impl From<&BackupConfiguration> for BackupOptions {
    fn from(config: &BackupConfiguration) -> Self {
        Self {
            include_data_store: config.include_data_store,
            include_uploads: config.include_uploads,
            include_config: config.include_config,
            include_logs: config.include_logs,
        }
    }
}

/// 备份数据源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    DataStore,
    Uploads,
    Config,
    Logs,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::DataStore,
        SourceKind::Uploads,
        SourceKind::Config,
        SourceKind::Logs,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::DataStore => "数据库",
            SourceKind::Uploads => "上传文件",
            SourceKind::Config => "配置文件",
            SourceKind::Logs => "日志",
        }
    }
}

/// 单个数据源的收录结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SourceOutcome {
    NotRequested,
    Included { entries: usize },
    SkippedMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: SourceKind,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 写本地备份文件失败
    ArchiveIo,
    /// 恢复时获取备份文件失败
    RestoreFetch,
    /// 审计日志存储不可用
    AuditStore,
}

/// 远程副本状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RemoteCopy {
    /// 调用方没有要求上传
    NotRequested,
    /// 要求上传但没有可用的远程存储客户端
    Unavailable,
    Uploaded { remote_id: String },
    Failed { message: String },
}

/// 备份成功
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSuccess {
    pub artifact_name: String,
    pub size: u64,
    pub duration_seconds: f64,
    pub sha256: String,
    pub remote: RemoteCopy,
    pub sources: Vec<SourceReport>,
    pub log_id: i64,
}

/// 备份或恢复失败
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationFailure {
    pub kind: FailureKind,
    pub message: String,
    pub duration_seconds: f64,
    pub log_id: Option<i64>,
}

/// 备份结果，不会以错误形式越过编排器边界
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BackupResult {
    Success(BackupSuccess),
    Failure(OperationFailure),
}

impl BackupResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BackupResult::Success(_))
    }

    /// 失败时为空字符串
    pub fn artifact_name(&self) -> &str {
        match self {
            BackupResult::Success(s) => &s.artifact_name,
            BackupResult::Failure(_) => "",
        }
    }

    /// 失败时为 0
    pub fn size(&self) -> u64 {
        match self {
            BackupResult::Success(s) => s.size,
            BackupResult::Failure(_) => 0,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        match self {
            BackupResult::Success(s) => s.duration_seconds,
            BackupResult::Failure(f) => f.duration_seconds,
        }
    }

    pub fn remote_id(&self) -> Option<&str> {
        match self {
            BackupResult::Success(BackupSuccess {
                remote: RemoteCopy::Uploaded { remote_id },
                ..
            }) => Some(remote_id),
            _ => None,
        }
    }

    /// 是否尝试过远程上传
    pub fn remote_upload_attempted(&self) -> bool {
        matches!(
            self,
            BackupResult::Success(BackupSuccess {
                remote: RemoteCopy::Uploaded { .. } | RemoteCopy::Failed { .. },
                ..
            })
        )
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            BackupResult::Success(_) => None,
            BackupResult::Failure(f) => Some(&f.message),
        }
    }
}

/// 备份文件来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreSource {
    Local,
    Remote,
}

/// 恢复准备完成：文件已就位并通过校验，解压不在此处进行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSuccess {
    pub artifact_name: String,
    pub staged_path: PathBuf,
    pub size: u64,
    pub entries: usize,
    pub source: RestoreSource,
    pub duration_seconds: f64,
    pub log_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RestoreResult {
    Success(RestoreSuccess),
    Failure(OperationFailure),
}

impl RestoreResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RestoreResult::Success(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RestoreResult::Success(_) => None,
            RestoreResult::Failure(f) => Some(&f.message),
        }
    }
}

/// 保留策略清理结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted_count: usize,
    pub deleted: Vec<String>,
    pub purged_log_count: usize,
    pub errors: Vec<String>,
}
