use crate::Result;
use chrono::{DateTime, Utc};
use duckdb::{Connection, Row, params};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::DbMessage;
use super::models::{
    BackupConfigurationRow, FinishMaintenanceLogRow, MaintenanceLogRow, NewMaintenanceLogRow,
};

const CONFIGURATION_COLUMNS: &str = "id, name, is_active, schedule_enabled, schedule_pattern, \
     include_data_store, include_uploads, include_config, include_logs, remote_folder_id, \
     retention_days, last_backup_at, created_at, updated_at";

const MAINTENANCE_LOG_COLUMNS: &str = "id, log_type, status, description, artifact_name, \
     file_size_bytes, file_size_formatted, duration_seconds, remote_artifact_id, error_message, \
     actor_id, metadata, created_at, ended_at";

/// DuckDB Actor - 确保单线程访问DuckDB
pub struct DuckDbActor {
    connection: Connection,
}

impl DuckDbActor {
    /// 创建新的DuckDB Actor
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let connection = Connection::open(db_path)?;
        Ok(Self { connection })
    }

    /// 创建内存DuckDB Actor
    pub fn new_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    /// 运行Actor消息循环
    pub async fn run(mut self, mut receiver: mpsc::Receiver<DbMessage>) {
        info!("DuckDB Actor 已启动");

        while let Some(message) = receiver.recv().await {
            self.handle_message(message);
        }

        info!("DuckDB Actor 已关闭");
    }

    /// 处理数据库消息
    fn handle_message(&mut self, message: DbMessage) {
        match message {
            DbMessage::InitTables { respond_to } => {
                let _ = respond_to.send(self.init_tables());
            }
            DbMessage::UpsertConfiguration { row, respond_to } => {
                let _ = respond_to.send(self.upsert_configuration(&row));
            }
            DbMessage::GetConfiguration { id, respond_to } => {
                let _ = respond_to.send(self.get_configuration(&id));
            }
            DbMessage::ListConfigurations { respond_to } => {
                let _ = respond_to.send(self.list_configurations(false));
            }
            DbMessage::ListSchedulableConfigurations { respond_to } => {
                let _ = respond_to.send(self.list_configurations(true));
            }
            DbMessage::SetLastBackupAt { id, at, respond_to } => {
                let _ = respond_to.send(self.set_last_backup_at(&id, at));
            }
            DbMessage::StartMaintenanceLog { row, respond_to } => {
                let _ = respond_to.send(self.start_maintenance_log(&row));
            }
            DbMessage::FinishMaintenanceLog {
                id,
                row,
                respond_to,
            } => {
                let _ = respond_to.send(self.finish_maintenance_log(id, &row));
            }
            DbMessage::GetMaintenanceLog { id, respond_to } => {
                let _ = respond_to.send(self.get_maintenance_log(id));
            }
            DbMessage::ListMaintenanceLogs { limit, respond_to } => {
                let _ = respond_to.send(self.list_maintenance_logs(limit));
            }
            DbMessage::PurgeMaintenanceLogs { before, respond_to } => {
                let _ = respond_to.send(self.purge_maintenance_logs(before));
            }
        }
    }

    /// 初始化数据库表
    fn init_tables(&mut self) -> Result<()> {
        debug!("正在初始化DuckDB表...");

        let sql_content = include_str!("../../migrations/init_duckdb.sql");

        // 按分号分割SQL语句并执行
        for statement in sql_content.split(';').filter(|s| !s.trim().is_empty()) {
            self.connection.execute(statement.trim(), [])?;
        }

        info!("DuckDB表初始化完成");
        Ok(())
    }

    fn read_configuration(row: &Row<'_>) -> duckdb::Result<BackupConfigurationRow> {
        Ok(BackupConfigurationRow {
            id: row.get(0)?,
            name: row.get(1)?,
            is_active: row.get(2)?,
            schedule_enabled: row.get(3)?,
            schedule_pattern: row.get(4)?,
            include_data_store: row.get(5)?,
            include_uploads: row.get(6)?,
            include_config: row.get(7)?,
            include_logs: row.get(8)?,
            remote_folder_id: row.get(9)?,
            retention_days: row.get(10)?,
            last_backup_at: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn read_maintenance_log(row: &Row<'_>) -> duckdb::Result<MaintenanceLogRow> {
        Ok(MaintenanceLogRow {
            id: row.get(0)?,
            log_type: row.get(1)?,
            status: row.get(2)?,
            description: row.get(3)?,
            artifact_name: row.get(4)?,
            file_size_bytes: row.get(5)?,
            file_size_formatted: row.get(6)?,
            duration_seconds: row.get(7)?,
            remote_artifact_id: row.get(8)?,
            error_message: row.get(9)?,
            actor_id: row.get(10)?,
            metadata: row.get(11)?,
            created_at: row.get(12)?,
            ended_at: row.get(13)?,
        })
    }

    /// 新建或覆盖备份任务配置，已有配置的 last_backup_at 只由 set_last_backup_at 写入
    fn upsert_configuration(&mut self, row: &BackupConfigurationRow) -> Result<()> {
        // 首先尝试更新现有配置
        let updated = self.connection.execute(
            "UPDATE backup_configurations SET name = ?, is_active = ?, schedule_enabled = ?, \
             schedule_pattern = ?, include_data_store = ?, include_uploads = ?, include_config = ?, \
             include_logs = ?, remote_folder_id = ?, retention_days = ?, \
             updated_at = ? WHERE id = ?",
            params![
                row.name,
                row.is_active,
                row.schedule_enabled,
                row.schedule_pattern,
                row.include_data_store,
                row.include_uploads,
                row.include_config,
                row.include_logs,
                row.remote_folder_id,
                row.retention_days,
                row.updated_at,
                row.id,
            ],
        )?;

        // 如果没有更新任何行，则插入新配置
        if updated == 0 {
            self.connection.execute(
                &format!(
                    "INSERT INTO backup_configurations ({CONFIGURATION_COLUMNS}) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                params![
                    row.id,
                    row.name,
                    row.is_active,
                    row.schedule_enabled,
                    row.schedule_pattern,
                    row.include_data_store,
                    row.include_uploads,
                    row.include_config,
                    row.include_logs,
                    row.remote_folder_id,
                    row.retention_days,
                    row.last_backup_at,
                    row.created_at,
                    row.updated_at,
                ],
            )?;
        }
        Ok(())
    }

    /// 根据ID获取备份任务配置
    fn get_configuration(&mut self, id: &str) -> Result<Option<BackupConfigurationRow>> {
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {CONFIGURATION_COLUMNS} FROM backup_configurations WHERE id = ?"
        ))?;
        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::read_configuration(row)?))
        } else {
            Ok(None)
        }
    }

    /// 获取备份任务配置列表
    fn list_configurations(&mut self, schedulable_only: bool) -> Result<Vec<BackupConfigurationRow>> {
        let filter = if schedulable_only {
            "WHERE is_active AND schedule_enabled AND schedule_pattern IS NOT NULL"
        } else {
            ""
        };
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {CONFIGURATION_COLUMNS} FROM backup_configurations {filter} ORDER BY created_at"
        ))?;

        let iter = stmt.query_map([], Self::read_configuration)?;

        let mut configs = Vec::new();
        for config in iter {
            configs.push(config?);
        }

        Ok(configs)
    }

    /// 更新最后备份时间
    fn set_last_backup_at(&mut self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let updated = self.connection.execute(
            "UPDATE backup_configurations SET last_backup_at = ?, updated_at = ? WHERE id = ?",
            params![at, at, id],
        )?;
        Ok(updated > 0)
    }

    /// 创建运行中的审计日志
    fn start_maintenance_log(&mut self, row: &NewMaintenanceLogRow) -> Result<i64> {
        // 插入记录，让数据库自动生成ID
        self.connection.execute(
            "INSERT INTO maintenance_logs (log_type, status, description, actor_id, metadata, created_at) \
             VALUES (?, 'running', ?, ?, ?, ?)",
            params![
                row.log_type,
                row.description,
                row.actor_id,
                row.metadata,
                row.created_at
            ],
        )?;

        // 获取最后插入的ID
        let id: i64 = self.connection.query_row(
            "SELECT currval('maintenance_log_id_seq')",
            [],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// 更新审计日志终态，只有 running 状态的记录会被更新
    fn finish_maintenance_log(&mut self, id: i64, row: &FinishMaintenanceLogRow) -> Result<bool> {
        let updated = self.connection.execute(
            "UPDATE maintenance_logs SET status = ?, artifact_name = ?, file_size_bytes = ?, \
             file_size_formatted = ?, duration_seconds = ?, remote_artifact_id = ?, \
             error_message = ?, metadata = COALESCE(?, metadata), ended_at = ? \
             WHERE id = ? AND status = 'running'",
            params![
                row.status,
                row.artifact_name,
                row.file_size_bytes,
                row.file_size_formatted,
                row.duration_seconds,
                row.remote_artifact_id,
                row.error_message,
                row.metadata,
                row.ended_at,
                id,
            ],
        )?;
        Ok(updated > 0)
    }

    /// 根据ID获取审计日志
    fn get_maintenance_log(&mut self, id: i64) -> Result<Option<MaintenanceLogRow>> {
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {MAINTENANCE_LOG_COLUMNS} FROM maintenance_logs WHERE id = ?"
        ))?;
        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::read_maintenance_log(row)?))
        } else {
            Ok(None)
        }
    }

    /// 获取最近的审计日志
    fn list_maintenance_logs(&mut self, limit: Option<i64>) -> Result<Vec<MaintenanceLogRow>> {
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {MAINTENANCE_LOG_COLUMNS} FROM maintenance_logs \
             ORDER BY created_at DESC, id DESC LIMIT ?"
        ))?;

        let iter = stmt.query_map(params![limit.unwrap_or(i64::MAX)], Self::read_maintenance_log)?;

        let mut logs = Vec::new();
        for log in iter {
            logs.push(log?);
        }

        Ok(logs)
    }

    /// 删除早于指定时间的已结束审计日志
    fn purge_maintenance_logs(&mut self, before: DateTime<Utc>) -> Result<usize> {
        let deleted = self.connection.execute(
            "DELETE FROM maintenance_logs WHERE created_at < ? AND status <> 'running'",
            params![before],
        )?;
        Ok(deleted)
    }
}
