use crate::constants::{archive, config, remote, secrets, sources, storage};
use crate::error::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

/// 本地存储配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub artifact_dir: String,
    pub staging_dir: String,
    pub database_path: String,
}

/// 备份数据源配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourcesConfig {
    /// 关系型数据库文件
    pub data_store: String,
    /// 上传目录
    pub uploads_dir: String,
    /// 配置文件列表
    #[serde(default)]
    pub config_files: Vec<String>,
    /// 日志目录
    pub logs_dir: String,
}

/// 压缩配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ArchiveConfig {
    pub compression_level: u32,
}

/// 远程存储配置
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub account: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_base_url: String,
    pub upload_base_url: String,
    pub default_folder_id: Option<String>,
}

/// 密钥存储配置，口令只从环境变量读取
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SecretsConfig {
    pub store_path: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_level: archive::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            account: remote::DEFAULT_ACCOUNT.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: remote::DEFAULT_REDIRECT_URI.to_string(),
            scope: remote::DEFAULT_SCOPE.to_string(),
            auth_url: remote::DEFAULT_AUTH_URL.to_string(),
            token_url: remote::DEFAULT_TOKEN_URL.to_string(),
            api_base_url: remote::DEFAULT_API_BASE_URL.to_string(),
            upload_base_url: remote::DEFAULT_UPLOAD_BASE_URL.to_string(),
            default_folder_id: None,
        }
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            store_path: secrets::DEFAULT_STORE_PATH.to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                artifact_dir: storage::get_default_artifact_dir()
                    .to_string_lossy()
                    .to_string(),
                staging_dir: storage::get_default_staging_dir()
                    .to_string_lossy()
                    .to_string(),
                database_path: storage::get_default_database_path()
                    .to_string_lossy()
                    .to_string(),
            },
            sources: SourcesConfig {
                data_store: sources::DEFAULT_DATA_STORE.to_string(),
                uploads_dir: sources::DEFAULT_UPLOADS_DIR.to_string(),
                config_files: sources::DEFAULT_CONFIG_FILES
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                logs_dir: sources::DEFAULT_LOGS_DIR.to_string(),
            },
            archive: ArchiveConfig::default(),
            remote: RemoteConfig::default(),
            secrets: SecretsConfig::default(),
        }
    }
}

impl AppConfig {
    /// 查找并加载配置文件
    /// 按优先级查找：keeper.toml -> .keeper.toml
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in config::CONFIG_SEARCH_PATHS {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        Err(KeeperError::ConfigNotFound)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            return Err(KeeperError::ConfigNotFound);
        }
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let body = toml::to_string_pretty(self)?;
        let content = format!(
            "# Keeper 配置文件\n# 远程存储的刷新令牌不会写入此文件，请使用 `keeper remote authorize` 保存到加密密钥库\n\n{body}"
        );
        fs::write(&path, content)?;
        Ok(())
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<()> {
        if self.archive.compression_level > 9 {
            return Err(KeeperError::InvalidInput(format!(
                "压缩级别必须在 0-9 之间: {}",
                self.archive.compression_level
            )));
        }
        if self.remote.enabled && self.remote.client_id.is_empty() {
            return Err(KeeperError::InvalidInput(
                "启用远程存储时必须配置 client_id".to_string(),
            ));
        }
        Ok(())
    }

    /// 确保本地目录存在
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.storage.artifact_dir)?;
        fs::create_dir_all(&self.storage.staging_dir)?;
        if let Some(parent) = Path::new(&self.storage.database_path).parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// 获取备份目录路径
    pub fn get_artifact_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.artifact_dir)
    }

    /// 获取恢复暂存目录路径
    pub fn get_staging_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.staging_dir)
    }

    /// 获取数据库路径
    pub fn get_database_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.database_path)
    }

    /// 获取密钥存储路径
    pub fn get_secret_store_path(&self) -> PathBuf {
        PathBuf::from(&self.secrets.store_path)
    }
}
