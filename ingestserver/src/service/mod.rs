//! 서비스 레이어
//!
//! 메시지 로그, 종료 조정, 리스너 루프를 포함합니다.

pub mod ingest_service;
pub mod message_log;
pub mod shutdown_service;

pub use ingest_service::{IngestServer, ServerStats, LISTEN_BACKLOG, POLL_INTERVAL};
pub use message_log::MessageLog;
pub use shutdown_service::{
    DrainReport, RegisteredHandler, ShutdownCoordinator, ShutdownReport, ShutdownState,
};
