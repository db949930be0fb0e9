//! 包管理器模块 — 对 pacman 查询命令的封装
//!
//! 这里是唯一启动子进程的地方。每次调用都会重新执行命令，不缓存结果。

pub mod parser;
pub mod types;

// 重新导出常用类型和函数
pub use parser::{parse_installed, parse_upgrades};
pub use types::{IgnoredUpgrade, InstalledPackage, Snapshot, UpgradeCandidate, UpgradeList};

use crate::error::SnapshotError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// 默认的 pacman 路径
pub const DEFAULT_PACMAN: &str = "/usr/bin/pacman";

/// 列出已安装包
const QUERY_INSTALLED: &str = "-Q";
/// 列出可更新的包
const QUERY_UPGRADES: &str = "-Qu";

/// 包管理器状态的来源
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// 获取已安装包列表的原始输出
    async fn read_installed_snapshot(&self) -> Result<Snapshot, SnapshotError>;

    /// 获取可用更新列表的原始输出
    async fn read_upgrade_snapshot(&self) -> Result<Snapshot, SnapshotError>;
}

#[derive(Debug, Clone)]
pub struct PackageManager {
    pub command: PathBuf,
    pub timeout: Duration,
}

impl PackageManager {
    pub fn new(command: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// 执行 `<command> <flag>` 并捕获 stdout。
    ///
    /// 非零退出码不算失败：pacman -Qu 在没有更新时会返回 1，
    /// 此时仍然返回已捕获的输出，由调用方决定如何处理。
    /// 超时后子进程随 future 一起被丢弃并被杀死。
    async fn run(&self, flag: &str) -> Result<Snapshot, SnapshotError> {
        let command_line = format!("{} {}", self.command.display(), flag);

        let child = Command::new(&self.command)
            .arg(flag)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SnapshotError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(Snapshot {
                stdout: output.stdout,
                exit_code: output.status.code(),
            }),
            Ok(Err(source)) => Err(SnapshotError::Io {
                command: command_line,
                source,
            }),
            Err(_) => Err(SnapshotError::Timeout {
                command: command_line,
                timeout: self.timeout,
            }),
        }
    }
}

impl Default for PackageManager {
    fn default() -> Self {
        Self::new(DEFAULT_PACMAN, Duration::from_secs(30))
    }
}

#[async_trait]
impl SnapshotSource for PackageManager {
    async fn read_installed_snapshot(&self) -> Result<Snapshot, SnapshotError> {
        self.run(QUERY_INSTALLED).await
    }

    async fn read_upgrade_snapshot(&self) -> Result<Snapshot, SnapshotError> {
        self.run(QUERY_UPGRADES).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn manager(command: &str) -> PackageManager {
        PackageManager::new(command, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let err = manager("/nonexistent/pacman")
            .read_installed_snapshot()
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/pacman -Q"));
    }

    #[tokio::test]
    async fn non_zero_exit_still_yields_snapshot() {
        let snapshot = manager("false").read_upgrade_snapshot().await.unwrap();
        assert!(!snapshot.success());
        assert_eq!(snapshot.exit_code, Some(1));
        assert!(snapshot.stdout.is_empty());
    }

    #[tokio::test]
    async fn stdout_is_captured_with_query_flag() {
        let snapshot = manager("echo").read_upgrade_snapshot().await.unwrap();
        assert!(snapshot.success());
        assert_eq!(snapshot.stdout, b"-Qu\n");
    }
}
