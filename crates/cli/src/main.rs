/// Conduit - 命令行客户端
///
/// 连接到服务端，执行一次调用、上传或远程文件读取后退出

use anyhow::Context;
use tracing::{error, info};

mod commands;
mod config;
mod fs;

use commands::Command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenvy::dotenv().ok();
    let cfg = config::Config::from_env()?;

    // 初始化日志
    // RUST_LOG 优先，其次 LOG_LEVEL，例如：
    // RUST_LOG=conduit=debug conduit call ping
    tracing_subscriber::fmt()
        .with_target(false)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_level)),
        )
        .init();

    let command = Command::parse(std::env::args().skip(1))?;

    info!("🎯 连接到 Server: {}", cfg.origin);
    let client = conduit::connect(cfg.connect_options())
        .await
        .with_context(|| format!("连接失败: {}", cfg.origin))?;
    info!("📌 连接 ID: {}", client.id());

    let result = commands::run(&client, command, &mut std::io::stdout().lock()).await;
    if let Err(e) = &result {
        error!("命令执行失败: {:#}", e);
    }

    client.close().await;
    result
}
