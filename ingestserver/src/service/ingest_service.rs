//! 수집 서버 메인 서비스
//!
//! 리스너 루프와 서버의 생명주기를 담당합니다. 연결을 수락할 때마다
//! 핸들러 태스크를 하나씩 띄우고 종료 조정자에 등록합니다.
//!
//! 연결 수에 상한이 없으므로 연결마다 태스크가 하나씩 늘어납니다.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::io::{Error as IoError, ErrorKind};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::IngestServerConfig;
use crate::handler::ConnectionHandler;
use crate::service::shutdown_service::{RegisteredHandler, ShutdownCoordinator, ShutdownReport, ShutdownState};
use crate::service::MessageLog;
use crate::tool::error::{ErrorHandler, ErrorSeverity, IngestError, IngestResult};

/// 대기 연결 큐 크기
pub const LISTEN_BACKLOG: u32 = 20;
/// accept/read 대기 상한. 이 간격마다 종료 신호를 다시 확인합니다.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// accept 실패 후 재시도까지 대기 시간
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// 리스닝 소켓 소유 상태
#[derive(Debug)]
enum ListenerSlot {
    /// 바인드 완료, 리스너 루프 시작 전
    Ready(TcpListener),
    /// 리스너 루프가 소켓을 가져감
    Running,
    /// 리스너 루프 종료 또는 종료 처리로 소켓이 닫힘
    Closed,
}

/// TCP 메시지 수집 서버
pub struct IngestServer {
    config: IngestServerConfig,
    listener: Mutex<ListenerSlot>,
    listener_stopped: watch::Sender<bool>,
    local_addr: SocketAddr,
    message_log: Arc<MessageLog>,
    coordinator: Arc<ShutdownCoordinator>,
    accepted: AtomicU64,
    started_at: DateTime<Utc>,
}

impl IngestServer {
    /// 설정된 주소에 바인드하고 listen 상태로 전환합니다.
    ///
    /// 주소 해석, 바인드, listen 중 하나라도 실패하면 `IngestError::Bind`를 반환합니다.
    pub async fn bind(config: IngestServerConfig) -> IngestResult<Self> {
        let address = config.bind_address();
        let bind_error = |source: IoError| IngestError::Bind {
            address: address.clone(),
            source,
        };

        let candidates: Vec<SocketAddr> = lookup_host((config.host.as_str(), config.port))
            .await
            .map_err(bind_error)?
            .collect();

        // localhost가 IPv6로 먼저 해석되더라도 IPv4를 우선 사용
        let socket_addr = candidates
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| candidates.first())
            .copied()
            .ok_or_else(|| bind_error(IoError::new(ErrorKind::AddrNotAvailable, "주소를 해석할 수 없습니다")))?;

        let socket = if socket_addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;

        #[cfg(unix)]
        socket.set_reuseaddr(true).map_err(bind_error)?;

        socket.bind(socket_addr).map_err(bind_error)?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        info!("✅ 수집 서버가 {}에서 대기 중입니다 (backlog {})", local_addr, LISTEN_BACKLOG);

        let message_log = Arc::new(MessageLog::new());
        let coordinator = Arc::new(ShutdownCoordinator::new(message_log.clone()));

        Ok(Self {
            config,
            listener: Mutex::new(ListenerSlot::Ready(listener)),
            listener_stopped: watch::channel(false).0,
            local_addr,
            message_log,
            coordinator,
            accepted: AtomicU64::new(0),
            started_at: Utc::now(),
        })
    }

    /// 리스너 루프 실행
    ///
    /// 종료 신호가 설정될 때까지 연결을 수락합니다. 반환 시 리스닝 소켓은 닫힙니다.
    /// 루프가 시작되기 전에 이미 종료 처리가 소켓을 닫았다면 바로 `Ok(())`를 반환합니다.
    pub async fn run(&self) -> IngestResult<()> {
        let listener = {
            let mut slot = self.listener.lock();
            match std::mem::replace(&mut *slot, ListenerSlot::Running) {
                ListenerSlot::Ready(listener) => listener,
                ListenerSlot::Running => return Err(IngestError::AlreadyRunning),
                ListenerSlot::Closed => {
                    *slot = ListenerSlot::Closed;
                    if self.coordinator.is_signaled() {
                        debug!("종료 처리로 리스닝 소켓이 이미 닫혔습니다 ({})", self.local_addr);
                        return Ok(());
                    }
                    return Err(IngestError::AlreadyRunning);
                }
            }
        };
        let shutdown = self.coordinator.token();

        info!("🚀 수집 서버 리스너 루프 시작 ({})", self.local_addr);

        while !shutdown.is_cancelled() {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = timeout(POLL_INTERVAL, listener.accept()) => result,
            };

            match accepted {
                Err(_elapsed) => {
                    trace!("클라이언트 대기 시간 초과 - 종료 신호 재확인");
                }
                Ok(Ok((stream, client))) => {
                    if shutdown.is_cancelled() {
                        info!("종료 중이므로 연결을 처리하지 않습니다: {}", client);
                        break;
                    }
                    self.spawn_handler(stream, client, &shutdown);
                }
                Ok(Err(e)) => {
                    let error = IngestError::Accept(e);
                    ErrorHandler::handle_error(&error, ErrorSeverity::Warning, "IngestServer", "accept");

                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        drop(listener);
        *self.listener.lock() = ListenerSlot::Closed;
        self.listener_stopped.send_replace(true);
        info!(
            "🛑 리스너 루프 종료 ({}) - 수락한 연결 {}개",
            self.local_addr,
            self.accepted.load(Ordering::Relaxed)
        );
        Ok(())
    }

    /// 수락한 연결에 핸들러 태스크를 띄우고 레지스트리에 등록합니다.
    fn spawn_handler(&self, stream: TcpStream, client: SocketAddr, shutdown: &CancellationToken) {
        let id = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        info!("새 클라이언트 연결: {} (핸들러 #{})", client, id);

        let handler = ConnectionHandler::new(
            id,
            stream,
            client,
            self.message_log.clone(),
            shutdown.child_token(),
            POLL_INTERVAL,
        );
        let handle = tokio::spawn(handler.run());

        self.coordinator.register(RegisteredHandler { id, client, handle });
    }

    /// 종료 신호를 보내고 모든 핸들러를 드레인합니다.
    ///
    /// 리스너 루프가 실행 중이면 루프가 끝난 뒤에 드레인하므로, 신호 직전에
    /// 수락된 연결의 핸들러도 레지스트리에서 빠지지 않습니다.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.coordinator.signal();

        let running = {
            let mut slot = self.listener.lock();
            match &*slot {
                ListenerSlot::Ready(_) => {
                    warn!("리스너 루프가 실행되지 않은 채 종료합니다");
                    *slot = ListenerSlot::Closed;
                    false
                }
                ListenerSlot::Running => true,
                ListenerSlot::Closed => false,
            }
        };

        if running {
            let mut stopped = self.listener_stopped.subscribe();
            // 취소 토큰으로 즉시 깨어나므로 폴링 간격 안에 끝나야 함
            match timeout(POLL_INTERVAL, stopped.wait_for(|done| *done)).await {
                Ok(_) => debug!("리스너 루프 종료 확인"),
                Err(_) => warn!("리스너 루프 종료 대기 시간 초과 - 드레인을 계속합니다"),
            };
        }

        self.coordinator.await_all(self.config.drain_timeout()).await
    }

    /// 실제 바인드된 주소 (임시 포트 포함)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn message_log(&self) -> Arc<MessageLog> {
        self.message_log.clone()
    }

    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    pub fn config(&self) -> &IngestServerConfig {
        &self.config
    }

    /// 서버 통계 조회
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            state: self.coordinator.state(),
            bound_address: self.local_addr,
            accepted_connections: self.accepted.load(Ordering::Relaxed),
            pending_handlers: self.coordinator.registered(),
            message_count: self.message_log.len(),
            total_bytes: self.message_log.total_bytes(),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
        }
    }
}

/// 서버 통계 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    pub state: ShutdownState,
    pub bound_address: SocketAddr,
    pub accepted_connections: u64,
    /// 아직 드레인되지 않은 핸들러 수
    pub pending_handlers: usize,
    pub message_count: usize,
    pub total_bytes: u64,
    pub uptime_seconds: i64,
}
