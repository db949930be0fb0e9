//! HTTP 服务：`/metrics` 供 Prometheus 抓取

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::error::ExportError;
use crate::exporter::Exporter;
use crate::package_manager::SnapshotSource;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

const INDEX_PAGE: &str = "pacman exporter\n\nMetrics are served at /metrics\n";

impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        log::error!("生成指标失败: {}", self);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
    }
}

pub fn router<S: SnapshotSource + 'static>(exporter: Exporter<S>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/metrics", get(metrics_handler::<S>))
        .with_state(Arc::new(exporter))
}

async fn index_handler() -> &'static str {
    INDEX_PAGE
}

async fn metrics_handler<S: SnapshotSource + 'static>(
    State(exporter): State<Arc<Exporter<S>>>,
) -> Result<Response, ExportError> {
    let body = exporter.render().await?;
    Ok(([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response())
}

/// 绑定监听地址并一直运行；绑定失败时返回错误，进程随之退出
pub async fn serve<S: SnapshotSource + 'static>(addr: &str, exporter: Exporter<S>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("无法监听 {}", addr))?;
    log::info!("pacman-exporter 正在监听 {}", listener.local_addr()?);

    axum::serve(listener, router(exporter))
        .await
        .context("HTTP 服务异常退出")?;
    Ok(())
}
