use crate::Result;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::models::{
    BackupConfigurationRow, FinishMaintenanceLogRow, MaintenanceLogRow, NewMaintenanceLogRow,
};

/// DuckDB数据库操作消息
#[derive(Debug)]
pub enum DbMessage {
    /// 初始化数据库表
    InitTables {
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 备份任务配置 ==========
    /// 新建或覆盖备份任务配置
    UpsertConfiguration {
        row: BackupConfigurationRow,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 根据ID获取备份任务配置
    GetConfiguration {
        id: String,
        respond_to: oneshot::Sender<Result<Option<BackupConfigurationRow>>>,
    },
    /// 获取所有备份任务配置
    ListConfigurations {
        respond_to: oneshot::Sender<Result<Vec<BackupConfigurationRow>>>,
    },
    /// 获取可以注册定时任务的配置
    ListSchedulableConfigurations {
        respond_to: oneshot::Sender<Result<Vec<BackupConfigurationRow>>>,
    },
    /// 更新最后备份时间
    SetLastBackupAt {
        id: String,
        at: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<bool>>,
    },

    // ========== 审计日志 ==========
    /// 创建运行中的审计日志
    StartMaintenanceLog {
        row: NewMaintenanceLogRow,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    /// 把审计日志更新为终态
    FinishMaintenanceLog {
        id: i64,
        row: FinishMaintenanceLogRow,
        respond_to: oneshot::Sender<Result<bool>>,
    },
    /// 根据ID获取审计日志
    GetMaintenanceLog {
        id: i64,
        respond_to: oneshot::Sender<Result<Option<MaintenanceLogRow>>>,
    },
    /// 获取最近的审计日志
    ListMaintenanceLogs {
        limit: Option<i64>,
        respond_to: oneshot::Sender<Result<Vec<MaintenanceLogRow>>>,
    },
    /// 删除早于指定时间的审计日志
    PurgeMaintenanceLogs {
        before: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<usize>>,
    },
}
