use keeper_core::{KeeperError, Result, config::AppConfig, database::Database};
use std::path::Path;
use tracing::{info, warn};

/// 运行独立的初始化流程
pub async fn run_init(force: bool, config_path: &Path) -> Result<()> {
    info!("🗄️  Keeper 初始化");
    info!("================");

    // 检查是否已经初始化过
    if config_path.exists() && !force {
        warn!("⚠️  检测到已存在的配置文件: {}", config_path.display());
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: keeper init --force");
        return Err(KeeperError::InvalidInput(format!(
            "配置文件已存在: {}",
            config_path.display()
        )));
    }

    info!("📋 步骤 1: 创建配置文件和目录结构");

    let config = AppConfig::default();
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    config.save_to_file(config_path)?;
    info!("   ✅ 创建配置文件: {}", config_path.display());

    config.ensure_dirs()?;
    info!("   ✅ 创建目录结构:");
    info!("      - {}  (备份文件目录)", config.storage.artifact_dir);
    info!("      - {}  (恢复暂存目录)", config.storage.staging_dir);

    info!("📋 步骤 2: 初始化数据库");

    let db_path = config.get_database_path();
    Database::connect(&db_path).await?;
    info!("   ✅ 创建DuckDB数据库: {}", db_path.display());

    info!("🎉 初始化完成！");
    info!("💡 接下来可以:");
    info!("   - 编辑 {} 配置备份数据源", config_path.display());
    info!("   - 运行 keeper backup 创建第一个备份");
    info!("   - 运行 keeper job create <名称> --schedule \"0 2 * * *\" 创建定时任务");

    Ok(())
}
