use clap::{Args, Parser, Subcommand};
use keeper_core::backup::BackupOptions;
use std::path::PathBuf;

/// 数据源选择，未指定任何数据源时备份全部
#[derive(Args, Debug, Clone, Default)]
pub struct SourceFlags {
    /// 包含数据库文件
    #[arg(long)]
    pub data_store: bool,
    /// 包含上传目录
    #[arg(long)]
    pub uploads: bool,
    /// 包含配置文件
    #[arg(long)]
    pub config_files: bool,
    /// 包含日志目录
    #[arg(long)]
    pub logs: bool,
    /// 包含全部数据源
    #[arg(long, conflicts_with_all = ["data_store", "uploads", "config_files", "logs"])]
    pub all: bool,
}

impl SourceFlags {
    pub fn any(&self) -> bool {
        self.all || self.data_store || self.uploads || self.config_files || self.logs
    }

    pub fn to_options(&self) -> BackupOptions {
        if self.all || !self.any() {
            return BackupOptions::all();
        }
        BackupOptions {
            include_data_store: self.data_store,
            include_uploads: self.uploads,
            include_config: self.config_files,
            include_logs: self.logs,
        }
    }
}

/// 备份任务管理
#[derive(Subcommand, Debug)]
pub enum JobCommand {
    /// 新建备份任务
    Create {
        /// 任务名称
        name: String,
        /// 定时表达式，例如 "0 2 * * *" 表示每天凌晨2点（UTC）
        #[arg(long)]
        schedule: Option<String>,
        /// 保留天数，0 表示不清理
        #[arg(long)]
        retention_days: Option<i32>,
        /// 远程文件夹 ID
        #[arg(long)]
        folder: Option<String>,
        #[command(flatten)]
        sources: SourceFlags,
    },
    /// 修改备份任务
    Update {
        /// 任务 ID
        id: String,
        #[arg(long)]
        name: Option<String>,
        /// 新的定时表达式，同时启用定时
        #[arg(long, conflicts_with = "no_schedule")]
        schedule: Option<String>,
        /// 关闭定时
        #[arg(long)]
        no_schedule: bool,
        /// 启用或停用任务
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        retention_days: Option<i32>,
        #[arg(long)]
        folder: Option<String>,
    },
    /// 显示任务详情
    Show { id: String },
    /// 列出所有任务
    List,
    /// 显示任务接下来的执行时间
    Next {
        id: String,
        #[arg(long, default_value = "5")]
        count: usize,
    },
}

/// 定时调度
#[derive(Subcommand, Debug)]
pub enum ScheduleCommand {
    /// 前台运行调度器，直到收到 Ctrl+C
    Run {
        /// 检查任务配置变更的间隔（秒）
        #[arg(long, default_value = "60")]
        reload_interval: u64,
    },
    /// 列出会被注册的定时任务
    List,
    /// 校验定时表达式并显示接下来的执行时间
    Validate {
        pattern: String,
        #[arg(long, default_value = "5")]
        count: usize,
    },
}

/// 远程存储
#[derive(Subcommand, Debug)]
pub enum RemoteCommand {
    /// 生成授权地址
    AuthUrl,
    /// 用授权码完成授权并保存刷新令牌
    Authorize { code: String },
    /// 检查授权状态
    Check,
    /// 显示存储配额
    Quota,
    /// 列出文件夹
    Folders {
        #[arg(long)]
        parent: Option<String>,
    },
    /// 列出文件
    Files {
        #[arg(long)]
        folder: Option<String>,
        #[arg(long, default_value = "50")]
        limit: u32,
    },
    /// 新建文件夹
    Mkdir {
        name: String,
        #[arg(long)]
        parent: Option<String>,
    },
}

/// Keeper - 定时备份、远程同步与恢复工具
#[derive(Parser, Debug)]
#[command(name = "keeper")]
#[command(about = "定时备份、远程同步与恢复工具")]
#[command(version)]
pub struct Cli {
    /// 配置文件路径，默认在当前目录查找 keeper.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 创建配置文件、目录和数据库
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 立即创建备份
    Backup {
        #[command(flatten)]
        sources: SourceFlags,
        /// 同时上传到远程存储
        #[arg(long)]
        remote: bool,
        /// 远程文件夹 ID
        #[arg(long)]
        folder: Option<String>,
        /// 操作者
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// 列出本地备份文件
    List,
    /// 准备恢复：获取并校验备份文件
    Restore {
        /// 备份文件名
        artifact: String,
        /// 从远程存储下载的文件 ID
        #[arg(long)]
        remote_id: Option<String>,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// 按保留天数清理备份文件和审计日志
    Cleanup {
        #[arg(long)]
        retention_days: i32,
    },
    /// 查看审计日志
    Logs {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// 备份任务管理
    #[command(subcommand)]
    Job(JobCommand),
    /// 定时调度
    #[command(subcommand)]
    Schedule(ScheduleCommand),
    /// 远程存储
    #[command(subcommand)]
    Remote(RemoteCommand),
}
