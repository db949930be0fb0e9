//! PackageManager 相关数据类型定义

/// 一次命令调用捕获到的原始输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub stdout: Vec<u8>,
    /// 进程退出码；被信号终止时为 None
    pub exit_code: Option<i32>,
}

impl Snapshot {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// 已安装包（pacman -Q 的一行）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub installed_version: String,
}

/// 有可用更新的包（pacman -Qu 的一行）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeCandidate {
    pub name: String,
    pub installed_version: String,
    pub upgrade_version: String,
}

/// 被 IgnorePkg 忽略的更新，总有一个同名同版本的 UpgradeCandidate 与之对应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredUpgrade {
    pub name: String,
    pub installed_version: String,
    pub upgrade_version: String,
}

impl From<&UpgradeCandidate> for IgnoredUpgrade {
    fn from(candidate: &UpgradeCandidate) -> Self {
        Self {
            name: candidate.name.clone(),
            installed_version: candidate.installed_version.clone(),
            upgrade_version: candidate.upgrade_version.clone(),
        }
    }
}

/// pacman -Qu 的解析结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeList {
    pub candidates: Vec<UpgradeCandidate>,
    pub ignored: Vec<IgnoredUpgrade>,
}
