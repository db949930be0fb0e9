use anyhow::Result;
use clap::Parser;

use pacman_exporter::config::{Cli, Config};
use pacman_exporter::exporter::Exporter;
use pacman_exporter::package_manager::PackageManager;
use pacman_exporter::server;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 加载配置：默认值 < 配置文件 < 环境变量 < 命令行
    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    log::debug!("配置: {:?}", config);

    let manager = PackageManager::new(config.pacman_path.clone(), config.command_timeout());
    let exporter = Exporter::new(manager, config.variant);

    server::serve(&config.bind_address(), exporter).await
}
