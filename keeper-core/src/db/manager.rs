use crate::{KeeperError, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

use super::actor::DuckDbActor;
use super::messages::DbMessage;
use super::models::{
    BackupConfigurationRow, FinishMaintenanceLogRow, MaintenanceLogRow, NewMaintenanceLogRow,
};

/// DuckDB数据库管理器
#[derive(Debug, Clone)]
pub struct DuckDbManager {
    sender: mpsc::Sender<DbMessage>,
}

impl DuckDbManager {
    /// 创建新的DuckDB管理器
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据库文件的父目录存在
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let actor = DuckDbActor::new(db_path)?;
        Self::start(actor).await
    }

    /// 创建内存数据库管理器
    pub async fn new_memory() -> Result<Self> {
        let actor = DuckDbActor::new_memory()?;
        Self::start(actor).await
    }

    async fn start(actor: DuckDbActor) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(100);
        tokio::spawn(actor.run(receiver));

        let manager = Self { sender };

        // 初始化数据库表
        manager
            .ask(|respond_to| DbMessage::InitTables { respond_to })
            .await?;

        Ok(manager)
    }

    /// 发送消息并等待Actor回复
    async fn ask<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> DbMessage,
    ) -> Result<T> {
        let (respond_to, receiver) = oneshot::channel();

        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| KeeperError::custom("数据库Actor已关闭"))?;

        receiver
            .await
            .map_err(|_| KeeperError::custom("等待数据库响应失败"))?
    }

    /// 新建或覆盖备份任务配置
    pub async fn upsert_configuration(&self, row: BackupConfigurationRow) -> Result<()> {
        self.ask(|respond_to| DbMessage::UpsertConfiguration { row, respond_to })
            .await
    }

    /// 根据ID获取备份任务配置
    pub async fn get_configuration(&self, id: &str) -> Result<Option<BackupConfigurationRow>> {
        let id = id.to_string();
        self.ask(|respond_to| DbMessage::GetConfiguration { id, respond_to })
            .await
    }

    /// 获取所有备份任务配置
    pub async fn list_configurations(&self) -> Result<Vec<BackupConfigurationRow>> {
        self.ask(|respond_to| DbMessage::ListConfigurations { respond_to })
            .await
    }

    /// 获取启用且配置了定时表达式的备份任务
    pub async fn list_schedulable_configurations(&self) -> Result<Vec<BackupConfigurationRow>> {
        self.ask(|respond_to| DbMessage::ListSchedulableConfigurations { respond_to })
            .await
    }

    /// 更新最后备份时间
    pub async fn set_last_backup_at(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let id = id.to_string();
        self.ask(|respond_to| DbMessage::SetLastBackupAt { id, at, respond_to })
            .await
    }

    /// 创建运行中的审计日志
    pub async fn start_maintenance_log(&self, row: NewMaintenanceLogRow) -> Result<i64> {
        self.ask(|respond_to| DbMessage::StartMaintenanceLog { row, respond_to })
            .await
    }

    /// 把审计日志更新为终态
    pub async fn finish_maintenance_log(
        &self,
        id: i64,
        row: FinishMaintenanceLogRow,
    ) -> Result<bool> {
        self.ask(|respond_to| DbMessage::FinishMaintenanceLog {
            id,
            row,
            respond_to,
        })
        .await
    }

    /// 根据ID获取审计日志
    pub async fn get_maintenance_log(&self, id: i64) -> Result<Option<MaintenanceLogRow>> {
        self.ask(|respond_to| DbMessage::GetMaintenanceLog { id, respond_to })
            .await
    }

    /// 获取最近的审计日志
    pub async fn list_maintenance_logs(&self, limit: Option<i64>) -> Result<Vec<MaintenanceLogRow>> {
        self.ask(|respond_to| DbMessage::ListMaintenanceLogs { limit, respond_to })
            .await
    }

    /// 删除早于指定时间的审计日志
    pub async fn purge_maintenance_logs(&self, before: DateTime<Utc>) -> Result<usize> {
        self.ask(|respond_to| DbMessage::PurgeMaintenanceLogs { before, respond_to })
            .await
    }
}
