//! 연결 핸들러
//!
//! 연결 하나의 생명주기를 담당합니다. 데이터를 읽고, 수신 시각을 기록하여
//! 메시지 로그에 추가하며, 종료 신호 또는 피어 종료 시 빠져나옵니다.

use bytes::Bytes;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::model::Message;
use crate::service::MessageLog;
use crate::tool::error::{ErrorHandler, ErrorSeverity, IngestError};

/// 한 번의 읽기에 사용하는 버퍼 크기 (바이트)
pub const READ_BUFFER_SIZE: usize = 1024;

/// 핸들러 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerExit {
    /// 피어가 연결을 닫음 (EOF)
    PeerClosed,
    /// 종료 신호 관찰
    Shutdown,
    /// 복구 불가능한 연결 에러
    Failed,
}

/// 핸들러 실행 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub exit: HandlerExit,
    /// 이 연결에서 기록한 메시지 수
    pub recorded: u64,
}

/// 연결 하나를 담당하는 핸들러
pub struct ConnectionHandler {
    id: u64,
    stream: TcpStream,
    client: SocketAddr,
    message_log: Arc<MessageLog>,
    shutdown: CancellationToken,
    poll_interval: Duration,
}

impl ConnectionHandler {
    /// 새로운 연결 핸들러 생성
    pub fn new(
        id: u64,
        stream: TcpStream,
        client: SocketAddr,
        message_log: Arc<MessageLog>,
        shutdown: CancellationToken,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            stream,
            client,
            message_log,
            shutdown,
            poll_interval,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client(&self) -> SocketAddr {
        self.client
    }

    /// 수신 루프 실행
    ///
    /// 각 읽기는 취소 토큰과 경합하며 폴링 간격으로 제한됩니다.
    /// 시간 초과는 에러가 아니며 종료 신호를 다시 확인하게 합니다.
    pub async fn run(mut self) -> HandlerOutcome {
        info!("🧵 핸들러 #{} 시작 ({})", self.id, self.client);

        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let mut recorded = 0u64;

        let exit = loop {
            if self.shutdown.is_cancelled() {
                break HandlerExit::Shutdown;
            }

            let read = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break HandlerExit::Shutdown,
                result = timeout(self.poll_interval, self.stream.read(&mut buffer)) => result,
            };

            match read {
                Err(_elapsed) => {
                    trace!("핸들러 #{} 수신 대기 시간 초과 - 종료 신호 재확인", self.id);
                }
                Ok(Ok(0)) => break HandlerExit::PeerClosed,
                Ok(Ok(size)) => {
                    let data = Bytes::copy_from_slice(&buffer[..size]);
                    info!("📨 핸들러 #{} 수신 ({}바이트): {:?}", self.id, size, data);

                    match Message::received(self.client, data) {
                        Ok(message) => {
                            self.message_log.append(message);
                            recorded += 1;
                        }
                        Err(e) => {
                            ErrorHandler::handle_error(&e, ErrorSeverity::Error, "ConnectionHandler", "record")
                        }
                    }
                }
                Ok(Err(e)) if e.kind() == ErrorKind::Interrupted => {
                    debug!("핸들러 #{} 읽기 중단됨 - 재시도", self.id);
                }
                Ok(Err(e)) => {
                    let severity = ErrorHandler::classify_io(&e);
                    let error = IngestError::connection(self.client, e);
                    ErrorHandler::handle_error(&error, severity, "ConnectionHandler", "read");
                    break HandlerExit::Failed;
                }
            }
        };

        let outcome = HandlerOutcome { exit, recorded };
        match exit {
            HandlerExit::PeerClosed => {
                info!("핸들러 #{} 연결 종료 ({}) - 메시지 {}개", self.id, self.client, recorded)
            }
            HandlerExit::Shutdown => {
                info!("핸들러 #{} 종료 신호로 중지 ({}) - 메시지 {}개", self.id, self.client, recorded)
            }
            HandlerExit::Failed => {
                info!("핸들러 #{} 에러로 중지 ({}) - 메시지 {}개", self.id, self.client, recorded)
            }
        }

        outcome
    }
}
