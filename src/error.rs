//! 错误类型

use std::time::Duration;
use thiserror::Error;

/// 调用包管理器失败
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("无法启动 `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("读取 `{command}` 输出失败: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` 在 {timeout:?} 内未退出，已终止")]
    Timeout { command: String, timeout: Duration },
}

/// 无法解析的输出行。Display 文本即日志中的警告内容。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedLine {
    #[error("expected {expected} fields but got {found} in: {line}")]
    FieldCount {
        expected: &'static str,
        found: usize,
        line: String,
    },

    #[error("empty field in: {line}")]
    EmptyField { line: String },

    #[error("expected \"->\" but got \"{token}\" in: {line}")]
    UnexpectedSeparator { token: String, line: String },

    /// 只用于警告：更新本身仍然保留
    #[error("Unknown format: {line}")]
    UnknownMarker { marker: String, line: String },
}

/// 生成 /metrics 响应失败
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("metrics output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
