use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::package_manager::DEFAULT_PACMAN;

/// 可通过环境变量覆盖的监听地址
pub const LISTEN_ADDRESS_ENV: &str = "PACMAN_EXPORTER_LISTEN_ADDRESS";

/// 导出哪些指标
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MetricVariant {
    /// installed + upgrade + ignored
    #[default]
    Full,
    /// 只导出 upgrade，标签为 name/installed_version/upgrade_version
    UpgradesOnly,
}

/// 命令行参数，优先级最高
#[derive(Debug, Default, Parser)]
#[command(name = "pacman-exporter", version, about = "Prometheus exporter for pacman package state")]
pub struct Cli {
    /// The address to listen on for HTTP requests.
    #[arg(long, value_name = "ADDR")]
    pub listen_address: Option<String>,

    /// Path to the pacman binary.
    #[arg(long, value_name = "PATH")]
    pub pacman: Option<PathBuf>,

    /// Seconds to wait for each pacman invocation.
    #[arg(long, value_name = "SECONDS")]
    pub command_timeout: Option<u64>,

    /// Which metric families to export.
    #[arg(long, value_enum)]
    pub variant: Option<MetricVariant>,

    /// Config file (TOML).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen_address: String,
    pub pacman_path: PathBuf,
    pub command_timeout_secs: u64,
    pub variant: MetricVariant,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: ":9101".to_string(),
            pacman_path: PathBuf::from(DEFAULT_PACMAN),
            command_timeout_secs: 30,
            variant: MetricVariant::Full,
        }
    }
}

impl Config {
    /// 默认配置文件路径 ~/.config/pacman-exporter/config.toml
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".config/pacman-exporter/config.toml")
    }

    /// 默认值 < 配置文件 < 环境变量 < 命令行
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件 {} 失败", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("解析配置文件 {} 失败", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup(LISTEN_ADDRESS_ENV).filter(|v| !v.is_empty()) {
            self.listen_address = addr;
        }
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(addr) = &cli.listen_address {
            self.listen_address = addr.clone();
        }
        if let Some(path) = &cli.pacman {
            self.pacman_path = path.clone();
        }
        if let Some(secs) = cli.command_timeout {
            self.command_timeout_secs = secs;
        }
        if let Some(variant) = cli.variant {
            self.variant = variant;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            bail!("command_timeout_secs 必须大于 0");
        }
        if !self.listen_address.contains(':') {
            bail!("监听地址 {:?} 缺少端口（应为 host:port 或 :port）", self.listen_address);
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// `:9101` 这种只有端口的写法表示监听所有地址
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }
}
