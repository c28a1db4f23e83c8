//! TCP 메시지 수집 서버 라이브러리
//!
//! 여러 TCP 클라이언트로부터 받은 바이트 데이터를 수신 시각, 클라이언트 주소와
//! 함께 공유 메모리 로그에 기록합니다.
//!
//! # 주요 기능
//!
//! - **연결별 핸들러**: 수락한 연결마다 태스크 하나가 수신을 담당
//! - **공유 메시지 로그**: 추가 전용, 뮤텍스로 직렬화된 기록
//! - **협조적 종료**: 취소 토큰으로 대기 중인 accept/read를 즉시 깨움
//! - **드레인**: 핸들러마다 제한 시간을 두고 종료를 기다림
//!
//! # 아키텍처
//!
//! ```text
//! IngestServer (리스너 루프)
//! ├── ShutdownCoordinator (종료 신호 + 핸들러 레지스트리)
//! ├── ConnectionHandler × N (연결별 수신 루프)
//! └── MessageLog (공유 메시지 기록)
//! ```
//!
//! # 사용 예시
//!
//! ```no_run
//! use ingestserver::{IngestServer, IngestServerConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = Arc::new(IngestServer::bind(IngestServerConfig::default()).await?);
//! let runner = server.clone();
//! let listener = tokio::spawn(async move { runner.run().await });
//!
//! tokio::signal::ctrl_c().await?;
//! let report = server.shutdown().await;
//! listener.await??;
//! println!("기록된 메시지: {}개", report.messages.len());
//! # Ok(())
//! # }
//! ```

/// 환경 설정 관리
pub mod config;

/// 데이터 모델
pub mod model;

/// 메시지 로그, 종료 조정, 리스너 루프
pub mod service;

/// 연결 핸들러
pub mod handler;

/// 에러 처리 도구
pub mod tool;

pub use config::{validate_config, IngestServerConfig};
pub use handler::{ConnectionHandler, HandlerExit, HandlerOutcome};
pub use model::Message;
pub use service::{
    DrainReport, IngestServer, MessageLog, ServerStats, ShutdownCoordinator, ShutdownReport,
    ShutdownState,
};
pub use tool::{IngestError, IngestResult};
