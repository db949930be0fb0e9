//! 输出解析函数
//!
//! pacman 的 `-Q` / `-Qu` 输出是以换行分隔、以单个空格分隔字段的纯文本。
//! 格式不符的行只记录警告并跳过，永远不会中断整次解析。

use std::borrow::Cow;

use super::types::{IgnoredUpgrade, InstalledPackage, UpgradeCandidate, UpgradeList};
use crate::error::MalformedLine;

/// `-Qu` 输出中新旧版本之间的分隔符
const ARROW: &str = "->";
/// `-Qu` 对 IgnorePkg 中的包追加的标记
const IGNORED_MARKER: &str = "[ignored]";

/// 按换行切分，只返回以 `\n` 结尾的完整行（不含换行符）。
///
/// 最后一个换行之后的残余内容视为不完整的行，直接丢弃。
pub fn complete_lines(input: &[u8]) -> impl Iterator<Item = Cow<'_, str>> {
    let end = input
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);

    input[..end]
        .split_inclusive(|&b| b == b'\n')
        .map(|line| String::from_utf8_lossy(&line[..line.len() - 1]))
}

// ========== 已安装包 ==========

/// 解析单行 `<name> <version>`
pub fn decode_installed_line(line: &str) -> Result<InstalledPackage, MalformedLine> {
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.len() != 2 {
        return Err(MalformedLine::FieldCount {
            expected: "2",
            found: fields.len(),
            line: line.to_string(),
        });
    }
    if fields.iter().any(|f| f.is_empty()) {
        return Err(MalformedLine::EmptyField {
            line: line.to_string(),
        });
    }

    Ok(InstalledPackage {
        name: fields[0].to_string(),
        installed_version: fields[1].to_string(),
    })
}

/// 解析 pacman -Q 的输出为 InstalledPackage 列表（保持输入顺序）
pub fn parse_installed(input: &[u8]) -> Vec<InstalledPackage> {
    let mut packages = Vec::new();

    for line in complete_lines(input) {
        match decode_installed_line(&line) {
            Ok(pkg) => packages.push(pkg),
            Err(e) => log::warn!("跳过 pacman -Q 输出中的格式错误行: {}", e),
        }
    }

    packages
}

// ========== 可用更新 ==========

/// 版本号之后的第五个字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrailingMarker {
    /// 没有第五个字段，或者该字段为空
    Absent,
    /// `[ignored]`
    Ignored,
    /// 无法识别的尾部内容，仍然保留更新本身
    Unknown(String),
}

/// 一行 `-Qu` 输出的解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeLine {
    pub candidate: UpgradeCandidate,
    pub marker: TrailingMarker,
}

/// 解析单行 `<name> <installed> -> <upgrade> [ignored]`
pub fn decode_upgrade_line(line: &str) -> Result<UpgradeLine, MalformedLine> {
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.len() < 4 {
        return Err(MalformedLine::FieldCount {
            expected: "at least 4",
            found: fields.len(),
            line: line.to_string(),
        });
    }
    if fields[2] != ARROW {
        return Err(MalformedLine::UnexpectedSeparator {
            token: fields[2].to_string(),
            line: line.to_string(),
        });
    }
    if fields[0].is_empty() || fields[1].is_empty() || fields[3].is_empty() {
        return Err(MalformedLine::EmptyField {
            line: line.to_string(),
        });
    }

    let marker = match &fields[4..] {
        [] | [""] => TrailingMarker::Absent,
        [marker] if *marker == IGNORED_MARKER => TrailingMarker::Ignored,
        rest => TrailingMarker::Unknown(rest.join(" ")),
    };

    Ok(UpgradeLine {
        candidate: UpgradeCandidate {
            name: fields[0].to_string(),
            installed_version: fields[1].to_string(),
            upgrade_version: fields[3].to_string(),
        },
        marker,
    })
}

/// 解析 pacman -Qu 的输出
///
/// 每个合法行产出一个 UpgradeCandidate；带 `[ignored]` 标记的行另外产出
/// 一个 IgnoredUpgrade。尾部内容无法识别时记录警告，但仍保留更新。
pub fn parse_upgrades(input: &[u8]) -> UpgradeList {
    let mut list = UpgradeList::default();

    for line in complete_lines(input) {
        let decoded = match decode_upgrade_line(&line) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("跳过 pacman -Qu 输出中的格式错误行: {}", e);
                continue;
            }
        };

        match &decoded.marker {
            TrailingMarker::Absent => {}
            TrailingMarker::Ignored => list.ignored.push(IgnoredUpgrade::from(&decoded.candidate)),
            TrailingMarker::Unknown(marker) => {
                let e = MalformedLine::UnknownMarker {
                    marker: marker.clone(),
                    line: line.to_string(),
                };
                log::warn!("{}", e);
            }
        }
        list.candidates.push(decoded.candidate);
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::cell::RefCell;
    use std::sync::Once;

    thread_local! {
        static WARNINGS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    /// 按线程收集 warn 级别日志，测试并行运行时互不干扰
    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Warn
        }

        fn log(&self, record: &Record) {
            if record.level() == Level::Warn {
                WARNINGS.with(|w| w.borrow_mut().push(record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;
    static INIT_LOGGER: Once = Once::new();

    fn warnings_during<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        INIT_LOGGER.call_once(|| {
            let _ = log::set_logger(&LOGGER);
            log::set_max_level(LevelFilter::Warn);
        });
        WARNINGS.with(|w| w.borrow_mut().clear());
        let out = f();
        let warnings = WARNINGS.with(|w| w.borrow_mut().drain(..).collect());
        (out, warnings)
    }

    fn installed(name: &str, version: &str) -> InstalledPackage {
        InstalledPackage {
            name: name.to_string(),
            installed_version: version.to_string(),
        }
    }

    fn candidate(name: &str, from: &str, to: &str) -> UpgradeCandidate {
        UpgradeCandidate {
            name: name.to_string(),
            installed_version: from.to_string(),
            upgrade_version: to.to_string(),
        }
    }

    #[test]
    fn installed_lines_keep_input_order() {
        let pkgs = parse_installed(b"bash 5.1.0-1\nvim 9.0.1-2\n");
        assert_eq!(pkgs, vec![installed("bash", "5.1.0-1"), installed("vim", "9.0.1-2")]);
    }

    #[test]
    fn installed_wrong_field_count_is_skipped() {
        let input = b"\nlonely\nbash 5.1.0-1\nthree fields here\nzsh 5.9-4\n";
        let pkgs = parse_installed(input);
        assert_eq!(pkgs, vec![installed("bash", "5.1.0-1"), installed("zsh", "5.9-4")]);
    }

    #[test]
    fn installed_empty_field_is_rejected() {
        assert!(matches!(
            decode_installed_line(" 1.0"),
            Err(MalformedLine::EmptyField { .. })
        ));
        assert!(matches!(
            decode_installed_line("bash "),
            Err(MalformedLine::EmptyField { .. })
        ));
    }

    #[test]
    fn installed_does_not_trim() {
        // 多个空格会产生空字段，整行按字段数错误处理
        assert!(matches!(
            decode_installed_line("bash  5.1.0-1"),
            Err(MalformedLine::FieldCount { found: 3, .. })
        ));
        let pkgs = parse_installed(b"bash 5.1.0-1\r\n");
        assert_eq!(pkgs, vec![installed("bash", "5.1.0-1\r")]);
    }

    #[test]
    fn trailing_partial_line_is_dropped() {
        assert_eq!(
            parse_installed(b"bash 5.1.0-1\nvim 9.0.1-2"),
            vec![installed("bash", "5.1.0-1")]
        );
        assert!(parse_installed(b"vim 9.0.1-2").is_empty());
        assert!(parse_upgrades(b"glibc 2.35-1 -> 2.36-1").candidates.is_empty());
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse_installed(b"").is_empty());
        assert_eq!(parse_upgrades(b""), UpgradeList::default());
    }

    #[test]
    fn plain_upgrade_line() {
        let list = parse_upgrades(b"glibc 2.35-1 -> 2.36-1\n");
        assert_eq!(list.candidates, vec![candidate("glibc", "2.35-1", "2.36-1")]);
        assert!(list.ignored.is_empty());
    }

    #[test]
    fn ignored_upgrade_line_produces_both_records() {
        let list = parse_upgrades(b"linux 5.10-1 -> 5.15-1 [ignored]\n");
        assert_eq!(list.candidates, vec![candidate("linux", "5.10-1", "5.15-1")]);
        assert_eq!(
            list.ignored,
            vec![IgnoredUpgrade::from(&candidate("linux", "5.10-1", "5.15-1"))]
        );
    }

    #[test]
    fn wrong_arrow_token_is_malformed() {
        match decode_upgrade_line("foo 1.0 => 2.0") {
            Err(MalformedLine::UnexpectedSeparator { token, line }) => {
                assert_eq!(token, "=>");
                assert_eq!(line, "foo 1.0 => 2.0");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(parse_upgrades(b"foo 1.0 => 2.0\n"), UpgradeList::default());
    }

    #[test]
    fn malformed_line_does_not_affect_neighbours() {
        let input = b"a 1 -> 2\nfoo 1.0 => 2.0\nshort\nb 3 ->\nc 4 -> 5 [ignored]\n";
        let list = parse_upgrades(input);
        assert_eq!(list.candidates, vec![candidate("a", "1", "2"), candidate("c", "4", "5")]);
        assert_eq!(list.ignored.len(), 1);
        assert_eq!(list.ignored[0].name, "c");
    }

    #[test]
    fn short_upgrade_lines_do_not_panic() {
        for line in ["", "a", "a 1", "a 1 ->"] {
            assert!(matches!(
                decode_upgrade_line(line),
                Err(MalformedLine::FieldCount { .. })
            ));
        }
    }

    #[test]
    fn empty_upgrade_version_is_rejected() {
        assert!(matches!(
            decode_upgrade_line("a 1 -> "),
            Err(MalformedLine::EmptyField { .. })
        ));
    }

    #[test]
    fn unknown_marker_keeps_candidate_only() {
        let decoded = decode_upgrade_line("a 1 -> 2 [held]").unwrap();
        assert_eq!(decoded.marker, TrailingMarker::Unknown("[held]".to_string()));

        let list = parse_upgrades(b"a 1 -> 2 [held]\nb 1 -> 2 [ignored] extra\n");
        assert_eq!(list.candidates, vec![candidate("a", "1", "2"), candidate("b", "1", "2")]);
        assert!(list.ignored.is_empty());
    }

    #[test]
    fn empty_fifth_field_is_not_a_marker() {
        let decoded = decode_upgrade_line("a 1 -> 2 ").unwrap();
        assert_eq!(decoded.marker, TrailingMarker::Absent);
    }

    #[test]
    fn parsing_is_idempotent() {
        let installed_input = b"bash 5.1.0-1\nbroken\nvim 9.0.1-2\n";
        let upgrade_input = b"linux 5.10-1 -> 5.15-1 [ignored]\nglibc 2.35-1 -> 2.36-1\n";
        assert_eq!(parse_installed(installed_input), parse_installed(installed_input));
        assert_eq!(parse_upgrades(upgrade_input), parse_upgrades(upgrade_input));
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let pkgs = parse_installed(b"caf\xe9 1.0\n");
        assert_eq!(pkgs.len(), 1);
        assert_eq!(pkgs[0].name, "caf\u{fffd}");
    }

    #[test]
    fn wrong_arrow_logs_one_warning() {
        let (list, warnings) = warnings_during(|| parse_upgrades(b"foo 1.0 => 2.0\n"));
        assert_eq!(list, UpgradeList::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("\"=>\""));
        assert!(warnings[0].contains("foo 1.0 => 2.0"));
    }

    #[test]
    fn unknown_marker_logs_one_warning() {
        let (list, warnings) = warnings_during(|| parse_upgrades(b"a 1 -> 2 [held]\n"));
        assert_eq!(list.candidates, vec![candidate("a", "1", "2")]);
        assert!(list.ignored.is_empty());
        assert_eq!(warnings, vec!["Unknown format: a 1 -> 2 [held]".to_string()]);
    }

    #[test]
    fn malformed_installed_line_logs_one_warning() {
        let (pkgs, warnings) = warnings_during(|| parse_installed(b"lonely\nbash 5.1.0-1\n"));
        assert_eq!(pkgs, vec![installed("bash", "5.1.0-1")]);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("lonely"));
    }

    #[test]
    fn clean_input_logs_nothing() {
        let (_, warnings) = warnings_during(|| {
            parse_installed(b"bash 5.1.0-1\n");
            parse_upgrades(b"glibc 2.35-1 -> 2.36-1\nlinux 5.10-1 -> 5.15-1 [ignored]\n")
        });
        assert!(warnings.is_empty());
    }
}
