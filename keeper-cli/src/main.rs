use clap::Parser;
use keeper_cli::{Cli, CliApp, Commands, run_init, setup_logging};
use keeper_core::KeeperError;
use keeper_core::constants::config;
use tracing::error;

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let cli = Cli::parse();

    // 设置日志记录，写文件时 guard 需要保持到进程结束
    let _log_guard = setup_logging(cli.verbose);

    // `init` 命令是特例，它不需要预先加载配置
    if let Commands::Init { force } = cli.command {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(config::get_config_file_path);
        if let Err(e) = run_init(force, &config_path).await {
            error!("❌ 初始化失败: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // 对于其他所有命令，我们需要加载配置并初始化App
    let mut app = match CliApp::new_with_config(cli.config.as_deref()).await {
        Ok(app) => app,
        Err(KeeperError::ConfigNotFound) => {
            match &cli.config {
                Some(path) => error!("❌ 配置文件 '{}' 未找到。", path.display()),
                None => error!(
                    "❌ 当前目录下未找到配置文件 ({})。",
                    config::CONFIG_SEARCH_PATHS.join(", ")
                ),
            }
            error!("👉 请先运行 'keeper init' 命令来创建配置文件。");
            std::process::exit(1);
        }
        Err(e) => {
            error!("❌ 应用初始化失败: {}", e);
            std::process::exit(1);
        }
    };

    // 运行命令
    if let Err(e) = app.run_command(cli.command).await {
        error!("❌ 操作失败: {}", e);
        std::process::exit(1);
    }
}
