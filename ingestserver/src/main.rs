//! TCP 메시지 수집 서버
//!
//! 여러 클라이언트의 메시지를 기록하고, Ctrl+C(또는 SIGTERM) 수신 시
//! 핸들러들을 드레인한 뒤 기록된 메시지를 출력하고 종료합니다.
//!
//! 환경변수:
//! - ingest_host: 바인드 호스트 (기본값: "localhost")
//! - ingest_port: 바인드 포트 (기본값: "8675")
//! - ingest_drain_timeout_ms: 핸들러당 드레인 대기 시간 (기본값: "100")
//! - RUST_LOG: 로그 필터 (기본값: "info")

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ingestserver::{validate_config, IngestServer, IngestServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 환경 설정 로드 및 검증
    let config = IngestServerConfig::from_env()?;
    validate_config(&config)?;

    info!("=== 수집 서버 설정 ===");
    info!("바인드 주소: {}", config.bind_address());
    info!("드레인 대기: {:?}", config.drain_timeout());
    info!("=====================");

    // 바인드 실패는 치명적
    let server = Arc::new(
        IngestServer::bind(config)
            .await
            .context("수집 서버 시작 실패")?,
    );

    let runner = server.clone();
    let listener_handle = tokio::spawn(async move { runner.run().await });

    shutdown_signal().await?;
    info!("Ctrl+C 수신, 종료를 시작합니다...");

    let report = server.shutdown().await;

    match listener_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("리스너 루프 오류: {}", e),
        Err(e) => error!("리스너 태스크 비정상 종료: {}", e),
    }

    info!(
        "✅ 수집 서버 종료 - 메시지 {}개 기록 (드레인: 종료 {}, 시간 초과 {}, 실패 {} / 연결 에러 {})",
        report.messages.len(),
        report.drain.joined,
        report.drain.timed_out,
        report.drain.failed,
        report.drain.connection_errors
    );
    Ok(())
}

/// 종료 시그널 대기 (Ctrl+C, unix에서는 SIGTERM 포함)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Ctrl+C 핸들러 설치 실패") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("SIGTERM 핸들러 설치 실패")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => result,
        result = terminate => result,
    }
}
