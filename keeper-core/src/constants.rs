/// 本地存储相关常量
pub mod storage {
    use std::path::{Path, PathBuf};

    /// 备份文件目录名
    pub const ARTIFACT_DIR_NAME: &str = "backups";

    /// 恢复暂存目录名
    pub const STAGING_DIR_NAME: &str = "restore-staging";

    /// 数据库文件名
    pub const DATABASE_FILE_NAME: &str = "keeper.duckdb";

    /// 获取默认备份目录
    pub fn get_default_artifact_dir() -> PathBuf {
        Path::new(".").join(ARTIFACT_DIR_NAME)
    }

    /// 获取默认恢复暂存目录
    pub fn get_default_staging_dir() -> PathBuf {
        Path::new(".").join(ARTIFACT_DIR_NAME).join(STAGING_DIR_NAME)
    }

    /// 获取默认数据库路径
    pub fn get_default_database_path() -> PathBuf {
        Path::new(".").join("data").join(DATABASE_FILE_NAME)
    }
}

/// 备份数据源默认位置
pub mod sources {
    /// 关系型数据库文件
    pub const DEFAULT_DATA_STORE: &str = "./data/app.db";

    /// 用户上传目录
    pub const DEFAULT_UPLOADS_DIR: &str = "./uploads";

    /// 需要备份的配置文件
    pub const DEFAULT_CONFIG_FILES: &[&str] = &["./.env", "./keeper.toml"];

    /// 日志目录
    pub const DEFAULT_LOGS_DIR: &str = "./logs";

    /// 归档内部的分类目录
    pub mod archive_dirs {
        pub const DATA_STORE: &str = "database";
        pub const UPLOADS: &str = "uploads";
        pub const CONFIG: &str = "config";
        pub const LOGS: &str = "logs";
    }
}

/// 备份文件相关常量
pub mod archive {
    /// 备份文件前缀
    pub const ARTIFACT_PREFIX: &str = "backup-";

    /// 备份文件扩展名
    pub const ARTIFACT_EXTENSION: &str = ".tar.gz";

    /// 写入中的临时文件后缀
    pub const PARTIAL_SUFFIX: &str = ".partial";

    /// 文件名中时间戳的格式
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3f";

    /// 文件名随机后缀长度
    pub const SUFFIX_LEN: usize = 8;

    /// 默认压缩级别
    pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

    /// 备份文件的 MIME 类型
    pub const ARTIFACT_MIME_TYPE: &str = "application/gzip";
}

/// 定时任务相关常量
pub mod cron {
    /// 标准cron表达式字段数量 (分 时 日 月 周)
    pub const CRON_FIELDS_COUNT: usize = 5;

    /// 带秒字段的cron表达式字段数量
    pub const CRON_FIELDS_WITH_SECONDS: usize = 6;

    /// 定时任务使用的系统操作者
    pub const SYSTEM_ACTOR: &str = "system";

    /// 默认保留天数
    pub const DEFAULT_RETENTION_DAYS: i32 = 30;

    /// 保留天数上限（约100年）
    pub const MAX_RETENTION_DAYS: i32 = 36_500;
}

/// 远程存储相关常量
pub mod remote {
    /// OAuth 授权地址
    pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

    /// OAuth 令牌地址
    pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

    /// 文件 API 基础地址
    pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

    /// 上传 API 基础地址
    pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/drive/v3";

    /// 默认授权范围
    pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

    /// 默认回调地址
    pub const DEFAULT_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

    /// 默认账户名（密钥存储的键）
    pub const DEFAULT_ACCOUNT: &str = "default";

    /// 文件夹 MIME 类型
    pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

    /// 文件元数据字段
    pub const FILE_FIELDS: &str = "id,name,size,mimeType,createdTime,modifiedTime";

    /// 列表默认分页大小
    pub const DEFAULT_PAGE_SIZE: u32 = 50;

    /// 访问令牌提前刷新的秒数
    pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

    /// 请求超时时间（秒）
    pub const REQUEST_TIMEOUT_SECS: u64 = 300;

    /// User-Agent头
    pub const USER_AGENT: &str = "keeper/0.1";
}

/// 密钥存储相关常量
pub mod secrets {
    /// 默认密钥文件
    pub const DEFAULT_STORE_PATH: &str = "./data/secrets.json";

    /// 口令环境变量
    pub const PASSPHRASE_ENV: &str = "KEEPER_SECRET_PASSPHRASE";

    /// AES-GCM nonce 长度
    pub const NONCE_SIZE: usize = 12;

    /// 派生密钥长度
    pub const KEY_SIZE: usize = 32;

    /// 盐长度
    pub const SALT_SIZE: usize = 16;
}

/// 配置文件相关常量
pub mod config {
    use std::path::PathBuf;

    /// 默认配置文件名
    pub const CONFIG_FILE_NAME: &str = "keeper.toml";

    /// 配置文件查找顺序
    pub const CONFIG_SEARCH_PATHS: &[&str] = &["keeper.toml", ".keeper.toml"];

    /// 日志文件环境变量
    pub const LOG_FILE_ENV: &str = "KEEPER_LOG_FILE";

    /// 获取默认配置文件路径
    pub fn get_config_file_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE_NAME)
    }
}
