// DuckDB数据库模块
//
// 通过Actor模式保证DuckDB连接只被一个任务访问，对外提供异步API。
// 存储两类数据：
// - backup_configurations: 外部维护的备份任务配置
// - maintenance_logs: 每次备份/恢复尝试的审计记录
//
// 主要组件：
// - DuckDbManager: 高级API接口，供应用程序使用
// - DuckDbActor: 内部Actor，处理实际的数据库操作

mod actor;
mod manager;
mod messages;
mod models;

pub use manager::DuckDbManager;
pub use models::{
    BackupConfigurationRow, FinishMaintenanceLogRow, MaintenanceLogRow, NewMaintenanceLogRow,
};
