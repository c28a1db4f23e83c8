//! 공통 에러 처리 시스템
//!
//! 수집 서버에서 발생하는 에러를 분류하고, 연결 단위로 격리된 에러를
//! 심각도에 맞는 로그 레벨로 기록합니다.

use std::net::SocketAddr;
use thiserror::Error;
use tracing::{error, warn};

/// 수집 서버 에러 타입
///
/// 시작 시 바인드 실패만 프로세스 치명적이며, 나머지는 해당 연결 또는
/// 리스너 반복 한 번에 국한됩니다.
#[derive(Error, Debug)]
pub enum IngestError {
    /// 주소 해석, 바인드, listen 실패
    #[error("바인드 실패 [{address}]: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// accept 실패 (리스너는 계속 동작)
    #[error("연결 수락 실패: {0}")]
    Accept(#[source] std::io::Error),

    /// 개별 연결의 읽기 실패
    #[error("연결 에러 [{client}]: {source}")]
    Connection {
        client: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// 빈 페이로드로 메시지 생성 시도
    #[error("빈 페이로드 [{client}]")]
    EmptyPayload { client: SocketAddr },

    /// 리스너가 이미 실행되었거나 소켓이 닫힘
    #[error("리스너가 이미 실행 중이거나 종료되었습니다")]
    AlreadyRunning,

    /// 설정 값 오류
    #[error("설정 에러 [키: {key}]: {message}")]
    Configuration { key: String, message: String },
}

impl IngestError {
    /// 설정 에러 생성
    pub fn configuration(key: &str, message: &str) -> Self {
        Self::Configuration {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// 연결 에러 생성
    pub fn connection(client: SocketAddr, source: std::io::Error) -> Self {
        Self::Connection { client, source }
    }
}

/// 결과 타입 별칭
pub type IngestResult<T> = Result<T, IngestError>;

/// 에러 심각도 레벨
///
/// 치명적인 에러(바인드 실패)는 호출자에게 전파되므로 여기서 다루지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// 주의가 필요하지만 서비스는 계속 가능
    Warning,
    /// 기능에 영향을 주지만 복구 가능
    Error,
}

/// 에러 핸들러
///
/// 격리된 에러(연결 단위, 드레인 타임아웃 등)를 한 곳에서 로깅합니다.
pub struct ErrorHandler;

impl ErrorHandler {
    /// 에러를 심각도에 맞는 로그 레벨로 기록합니다.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ingestserver::tool::error::{ErrorHandler, ErrorSeverity, IngestError};
    ///
    /// let error = IngestError::AlreadyRunning;
    /// ErrorHandler::handle_error(&error, ErrorSeverity::Warning, "IngestServer", "run");
    /// ```
    pub fn handle_error(
        error: &IngestError,
        severity: ErrorSeverity,
        component: &str,
        operation: &str,
    ) {
        let log_message = format!("[{}] [{}] {}", component, operation, error);

        match severity {
            ErrorSeverity::Warning => warn!("{}", log_message),
            ErrorSeverity::Error => error!("{}", log_message),
        }
    }

    /// 연결 에러의 심각도를 분류합니다.
    ///
    /// 피어 측 리셋/중단은 흔한 상황이므로 경고로 취급합니다.
    pub fn classify_io(err: &std::io::Error) -> ErrorSeverity {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}
