use keeper_core::{
    KeeperError, Result,
    backup::BackupOrchestrator,
    config::AppConfig,
    database::Database,
    remote::RemoteStorageClient,
    secrets::SecretStore,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cli::{Commands, JobCommand, RemoteCommand, ScheduleCommand};
use crate::commands;

#[derive(Debug, Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub database: Database,
    pub orchestrator: BackupOrchestrator,
    pub remote: Option<RemoteStorageClient>,
}

impl CliApp {
    /// 加载指定配置文件，未指定时在当前目录查找
    pub async fn new_with_config(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => AppConfig::load_from_file(path)?,
            None => AppConfig::find_and_load_config()?,
        };
        Self::from_config(config).await
    }

    pub async fn from_config(config: AppConfig) -> Result<Self> {
        config.ensure_dirs()?;

        let database = Database::connect(config.get_database_path()).await?;
        let mut orchestrator = BackupOrchestrator::from_config(&config, database.clone());

        let remote = if config.remote.enabled {
            let client = RemoteStorageClient::new(config.remote.clone())?;
            load_refresh_token(&config, &client).await;
            orchestrator = orchestrator.with_remote(Arc::new(client.clone()));
            Some(client)
        } else {
            debug!("远程存储未启用");
            None
        };

        Ok(Self {
            config,
            database,
            orchestrator,
            remote,
        })
    }

    /// 远程存储客户端，未启用时报错
    pub fn remote_client(&self) -> Result<&RemoteStorageClient> {
        self.remote.as_ref().ok_or_else(|| {
            KeeperError::custom("远程存储未启用，请在配置文件的 [remote] 中设置 enabled = true")
        })
    }

    /// 运行应用命令
    pub async fn run_command(&mut self, command: Commands) -> Result<()> {
        match command {
            // 已经在 main.rs 中处理
            Commands::Init { .. } => Err(KeeperError::custom("init 命令不需要加载配置")),
            Commands::Backup {
                sources,
                remote,
                folder,
                actor,
            } => commands::run_backup(self, &actor, sources.to_options(), remote, folder).await,
            Commands::List => commands::run_list_artifacts(self).await,
            Commands::Restore {
                artifact,
                remote_id,
                actor,
            } => commands::run_restore(self, &actor, &artifact, remote_id.as_deref()).await,
            Commands::Cleanup { retention_days } => commands::run_cleanup(self, retention_days).await,
            Commands::Logs { limit } => commands::show_logs(self, limit).await,
            Commands::Job(cmd) => self.run_job_command(cmd).await,
            Commands::Schedule(cmd) => self.run_schedule_command(cmd).await,
            Commands::Remote(cmd) => self.run_remote_command(cmd).await,
        }
    }

    async fn run_job_command(&mut self, cmd: JobCommand) -> Result<()> {
        match cmd {
            JobCommand::Create {
                name,
                schedule,
                retention_days,
                folder,
                sources,
            } => {
                commands::create_job(self, name, schedule, retention_days, folder, sources).await
            }
            JobCommand::Update {
                id,
                name,
                schedule,
                no_schedule,
                active,
                retention_days,
                folder,
            } => {
                let changes = commands::JobChanges {
                    name,
                    schedule,
                    disable_schedule: no_schedule,
                    active,
                    retention_days,
                    folder,
                };
                commands::update_job(self, &id, changes).await
            }
            JobCommand::Show { id } => commands::show_job(self, &id).await,
            JobCommand::List => commands::list_jobs(self).await,
            JobCommand::Next { id, count } => commands::show_job_next_runs(self, &id, count).await,
        }
    }

    async fn run_schedule_command(&mut self, cmd: ScheduleCommand) -> Result<()> {
        match cmd {
            ScheduleCommand::Run { reload_interval } => {
                info!("⏰ 启动定时备份调度器...");
                commands::run_scheduler(self, reload_interval).await
            }
            ScheduleCommand::List => commands::list_schedules(self).await,
            ScheduleCommand::Validate { pattern, count } => {
                commands::validate_schedule(&pattern, count)
            }
        }
    }

    async fn run_remote_command(&mut self, cmd: RemoteCommand) -> Result<()> {
        match cmd {
            RemoteCommand::AuthUrl => commands::show_auth_url(self),
            RemoteCommand::Authorize { code } => commands::authorize(self, &code).await,
            RemoteCommand::Check => commands::check_remote(self).await,
            RemoteCommand::Quota => commands::show_quota(self).await,
            RemoteCommand::Folders { parent } => commands::list_folders(self, parent.as_deref()).await,
            RemoteCommand::Files { folder, limit } => {
                commands::list_remote_files(self, folder.as_deref(), limit).await
            }
            RemoteCommand::Mkdir { name, parent } => {
                commands::create_folder(self, &name, parent.as_deref()).await
            }
        }
    }
}

/// 从密钥存储加载刷新令牌，失败时只记录警告，远程上传将不可用
async fn load_refresh_token(config: &AppConfig, client: &RemoteStorageClient) {
    match SecretStore::open_from_env(config.get_secret_store_path()) {
        Ok(Some(store)) => match store.get(&config.remote.account) {
            Ok(Some(token)) => {
                client.set_refresh_token(token).await;
                debug!("已加载远程存储刷新令牌: {}", config.remote.account);
            }
            Ok(None) => debug!("密钥存储中没有账户 {} 的刷新令牌", config.remote.account),
            Err(e) => warn!("读取刷新令牌失败: {}", e),
        },
        Ok(None) => debug!("未设置密钥存储口令，跳过加载刷新令牌"),
        Err(e) => warn!("打开密钥存储失败: {}", e),
    }
}
