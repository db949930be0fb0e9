//! 把 pacman 的状态映射为 Prometheus 指标
//!
//! 每次抓取都重新执行命令、重新解析，并在一个新建的 Registry 上生成输出，
//! 因此已经消失的包不会残留在后续的抓取结果里。

use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::MetricVariant;
use crate::error::{ExportError, SnapshotError};
use crate::package_manager::{
    parse_installed, parse_upgrades, InstalledPackage, Snapshot, SnapshotSource, UpgradeList,
};

pub const NAMESPACE: &str = "archlinux";
pub const SUBSYSTEM: &str = "pacman";

const INSTALLED_LABELS: &[&str] = &["package_name", "installed_version"];
const UPGRADE_LABELS: &[&str] = &["package_name", "installed_version", "upgrade_version"];
const UPGRADES_ONLY_LABELS: &[&str] = &["name", "installed_version", "upgrade_version"];

/// 一次抓取得到的全部记录
#[derive(Debug, Clone, Default)]
pub struct ScrapeReport {
    pub installed: Vec<InstalledPackage>,
    pub upgrades: UpgradeList,
    /// 未读取已安装列表时为 None（upgrades-only）
    pub installed_read: Option<bool>,
    pub upgrades_read: bool,
    pub duration: Duration,
}

pub struct Exporter<S> {
    source: S,
    variant: MetricVariant,
    /// 同一时刻只允许一次抓取在执行 pacman
    scrape_lock: Mutex<()>,
}

impl<S: SnapshotSource> Exporter<S> {
    pub fn new(source: S, variant: MetricVariant) -> Self {
        Self {
            source,
            variant,
            scrape_lock: Mutex::new(()),
        }
    }

    /// 读取快照并解析。命令失败时按空输出处理，抓取本身不会失败。
    pub async fn scrape(&self) -> ScrapeReport {
        let _guard = self.scrape_lock.lock().await;
        let start = Instant::now();

        let (installed, installed_read) = match self.variant {
            MetricVariant::Full => {
                let (stdout, ok) =
                    stdout_or_empty("installed", self.source.read_installed_snapshot().await);
                (parse_installed(&stdout), Some(ok))
            }
            MetricVariant::UpgradesOnly => (Vec::new(), None),
        };

        let (stdout, upgrades_read) =
            stdout_or_empty("upgrades", self.source.read_upgrade_snapshot().await);
        let upgrades = parse_upgrades(&stdout);

        let report = ScrapeReport {
            installed,
            upgrades,
            installed_read,
            upgrades_read,
            duration: start.elapsed(),
        };
        log::debug!(
            "抓取完成: {} 个已安装, {} 个可更新, {} 个已忽略, 耗时 {:?}",
            report.installed.len(),
            report.upgrades.candidates.len(),
            report.upgrades.ignored.len(),
            report.duration
        );
        report
    }

    /// 抓取并编码为文本格式
    pub async fn render(&self) -> Result<String, ExportError> {
        let report = self.scrape().await;
        encode(self.variant, &report)
    }
}

/// 命令执行失败时记录警告并退化为空输出
fn stdout_or_empty(kind: &str, result: Result<Snapshot, SnapshotError>) -> (Vec<u8>, bool) {
    match result {
        Ok(snapshot) => {
            if !snapshot.success() {
                log::debug!(
                    "{} 快照命令退出码 {:?}，使用已捕获的 {} 字节输出",
                    kind,
                    snapshot.exit_code,
                    snapshot.stdout.len()
                );
            }
            (snapshot.stdout, true)
        }
        Err(e) => {
            log::warn!("读取 {} 快照失败，按空输出处理: {}", kind, e);
            (Vec::new(), false)
        }
    }
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE).subsystem(SUBSYSTEM)
}

fn register_gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec, ExportError> {
    let gauge = GaugeVec::new(opts(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// 把一次抓取的记录编码为 Prometheus 文本格式
///
/// 每条记录对应一个值为 1 的样本，不做任何聚合。
/// 字段完全相同的两条记录落在同一个标签组上，只输出一个样本。
pub fn encode(variant: MetricVariant, report: &ScrapeReport) -> Result<String, ExportError> {
    let registry = Registry::new();

    match variant {
        MetricVariant::Full => {
            let installed = register_gauge_vec(
                &registry,
                "installed",
                "Installed packages",
                INSTALLED_LABELS,
            )?;
            let upgrade = register_gauge_vec(
                &registry,
                "upgrade",
                "Packages with available upgrade",
                UPGRADE_LABELS,
            )?;
            let ignored = register_gauge_vec(
                &registry,
                "ignored",
                "Packages with ignored upgrade",
                UPGRADE_LABELS,
            )?;

            for pkg in &report.installed {
                installed
                    .with_label_values(&[pkg.name.as_str(), pkg.installed_version.as_str()])
                    .set(1.0);
            }
            for pkg in &report.upgrades.candidates {
                upgrade
                    .with_label_values(&[
                        pkg.name.as_str(),
                        pkg.installed_version.as_str(),
                        pkg.upgrade_version.as_str(),
                    ])
                    .set(1.0);
            }
            for pkg in &report.upgrades.ignored {
                ignored
                    .with_label_values(&[
                        pkg.name.as_str(),
                        pkg.installed_version.as_str(),
                        pkg.upgrade_version.as_str(),
                    ])
                    .set(1.0);
            }
        }
        MetricVariant::UpgradesOnly => {
            let upgrade = register_gauge_vec(
                &registry,
                "upgrade",
                "Packages with available upgrade",
                UPGRADES_ONLY_LABELS,
            )?;
            for pkg in &report.upgrades.candidates {
                upgrade
                    .with_label_values(&[
                        pkg.name.as_str(),
                        pkg.installed_version.as_str(),
                        pkg.upgrade_version.as_str(),
                    ])
                    .set(1.0);
            }
        }
    }

    let success = register_gauge_vec(
        &registry,
        "snapshot_success",
        "Whether the last pacman invocation for this snapshot completed",
        &["snapshot"],
    )?;
    if let Some(ok) = report.installed_read {
        success.with_label_values(&["installed"]).set(bool_value(ok));
    }
    success
        .with_label_values(&["upgrades"])
        .set(bool_value(report.upgrades_read));

    let duration = Gauge::with_opts(opts(
        "scrape_duration_seconds",
        "Time spent running pacman and parsing its output",
    ))?;
    registry.register(Box::new(duration.clone()))?;
    duration.set(report.duration.as_secs_f64());

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

fn bool_value(ok: bool) -> f64 {
    if ok {
        1.0
    } else {
        0.0
    }
}
