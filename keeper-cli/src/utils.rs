use keeper_core::constants::config::LOG_FILE_ENV;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

/// # Keeper 日志配置
///
/// - `-v, --verbose`：启用 DEBUG 级别
/// - `RUST_LOG`：按模块控制日志级别，例如 `RUST_LOG=keeper_core::scheduler=debug`
/// - `KEEPER_LOG_FILE`：日志文件路径，设置后日志写入文件而非终端
///
/// 写文件时返回的 guard 需要保持到进程结束，否则缓冲中的日志会丢失。
pub fn setup_logging(verbose: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::{EnvFilter, fmt};

    // 根据verbose参数和环境变量确定日志级别
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match std::env::var(LOG_FILE_ENV) {
        Ok(log_file) if !log_file.is_empty() => {
            let path = Path::new(&log_file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "keeper.log".into());

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            // 输出到文件 - 使用详细格式便于调试
            fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_line_number(true)
                .init();
            Some(guard)
        }
        _ => {
            // 输出到终端 - 使用简洁格式，用户友好
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_thread_names(false)
                .with_line_number(false)
                .without_time()
                .compact()
                .init();
            None
        }
    }
}

/// 截断过长的文本用于表格显示
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
