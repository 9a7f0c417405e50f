use crate::app::CliApp;
use crate::utils::truncate;
use keeper_core::{
    KeeperError, Result,
    constants::secrets as secret_consts,
    database::format_file_size,
    secrets::SecretStore,
};
use tracing::{info, warn};

/// 显示授权地址
pub fn show_auth_url(app: &CliApp) -> Result<()> {
    let url = app.remote_client()?.generate_auth_url()?;
    info!("🔑 请在浏览器中打开以下地址完成授权:");
    info!("{}", url);
    info!("💡 授权后运行 keeper remote authorize <授权码>");
    Ok(())
}

/// 用授权码换取令牌，并把刷新令牌保存到加密密钥库
pub async fn authorize(app: &CliApp, code: &str) -> Result<()> {
    let client = app.remote_client()?;
    let tokens = client.exchange_code_for_tokens(code).await?;
    info!("✅ 授权成功");

    let Some(refresh_token) = tokens.refresh_token.or(client.refresh_token().await) else {
        warn!("⚠️  授权响应中没有刷新令牌，请撤销授权后重新授权");
        return Ok(());
    };

    let store_path = app.config.get_secret_store_path();
    match SecretStore::open_from_env(&store_path)? {
        Some(mut store) => {
            store.put(&app.config.remote.account, &refresh_token)?;
            info!(
                "🔒 刷新令牌已保存到密钥库: {} (账户: {})",
                store.path().display(),
                app.config.remote.account
            );
        }
        None => {
            warn!(
                "⚠️  未设置 {}，刷新令牌没有保存，下次运行需要重新授权",
                secret_consts::PASSPHRASE_ENV
            );
        }
    }
    Ok(())
}

/// 检查授权状态
pub async fn check_remote(app: &CliApp) -> Result<()> {
    let client = app.remote_client()?;
    if client.check_auth().await {
        info!("✅ 远程存储授权有效");
        Ok(())
    } else {
        warn!("❌ 远程存储未授权或授权已失效");
        info!("💡 运行 keeper remote auth-url 重新授权");
        Err(KeeperError::auth("远程存储未授权"))
    }
}

/// 显示存储配额
pub async fn show_quota(app: &CliApp) -> Result<()> {
    let quota = app.remote_client()?.get_storage_quota().await?;
    let show = |value: Option<u64>| value.map(format_file_size).unwrap_or_else(|| "-".to_string());
    info!("📊 远程存储配额");
    info!("   总量: {}", show(quota.limit));
    info!("   已用: {}", show(quota.usage));
    info!("   文件: {}", show(quota.usage_in_drive));
    info!("   回收站: {}", show(quota.usage_in_drive_trash));
    Ok(())
}

/// 列出文件夹
pub async fn list_folders(app: &CliApp, parent: Option<&str>) -> Result<()> {
    let folders = app.remote_client()?.list_folders(parent).await?;
    if folders.is_empty() {
        info!("📭 没有文件夹");
        return Ok(());
    }
    info!("📁 文件夹 ({} 个)", folders.len());
    for folder in &folders {
        info!("   {}  {}", folder.id, truncate(&folder.name, 48));
    }
    Ok(())
}

/// 列出文件
pub async fn list_remote_files(app: &CliApp, folder: Option<&str>, limit: u32) -> Result<()> {
    let folder = folder.or(app.config.remote.default_folder_id.as_deref());
    let files = app.remote_client()?.list_files(folder, limit.max(1)).await?;
    if files.is_empty() {
        info!("📭 没有文件");
        return Ok(());
    }
    info!("☁️  远程文件 ({} 个)", files.len());
    for file in &files {
        let size = file.size.map(format_file_size).unwrap_or_else(|| "-".to_string());
        let modified = file
            .modified_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        info!("   {}  {:<52} {:>10}  {}", file.id, truncate(&file.name, 52), size, modified);
    }
    Ok(())
}

/// 新建文件夹
pub async fn create_folder(app: &CliApp, name: &str, parent: Option<&str>) -> Result<()> {
    if name.trim().is_empty() {
        return Err(KeeperError::InvalidInput("文件夹名称不能为空".to_string()));
    }
    let folder = app.remote_client()?.create_folder(name, parent).await?;
    info!("✅ 已创建文件夹: {} ({})", folder.name, folder.id);
    info!("💡 可在配置文件中设置 remote.default_folder_id = \"{}\"", folder.id);
    Ok(())
}
