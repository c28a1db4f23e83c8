//! 종료 조정 서비스
//!
//! 공유 취소 신호와 실행 중인 핸들러 태스크 목록을 관리합니다.
//!
//! 상태 전이: `Running` → (`signal()`) → `Draining` → (`await_all()`) → `Stopped`

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handler::{HandlerExit, HandlerOutcome};
use crate::model::Message;
use crate::service::MessageLog;
use crate::tool::error::{ErrorHandler, ErrorSeverity, IngestError};

const STATE_RUNNING: u8 = 0;
const STATE_DRAINING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// 서버 생명주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// 연결 수락 및 수신 중
    Running,
    /// 종료 신호 이후, 핸들러들이 빠져나가는 중
    Draining,
    /// 드레인 완료
    Stopped,
}

impl ShutdownState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_RUNNING => Self::Running,
            STATE_DRAINING => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// 레지스트리에 등록된 핸들러 태스크
#[derive(Debug)]
pub struct RegisteredHandler {
    pub id: u64,
    pub client: SocketAddr,
    pub handle: JoinHandle<HandlerOutcome>,
}

/// 드레인 결과 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// 제한 시간 안에 종료된 핸들러 수
    pub joined: usize,
    /// 제한 시간을 넘겨 버려진 핸들러 수
    pub timed_out: usize,
    /// 패닉 등으로 비정상 종료된 핸들러 수
    pub failed: usize,
    /// 종료된 핸들러 중 피어가 먼저 연결을 닫은 수
    pub peer_closed: usize,
    /// 종료된 핸들러 중 종료 신호로 멈춘 수
    pub stopped_by_signal: usize,
    /// 종료된 핸들러 중 읽기 에러로 멈춘 수
    pub connection_errors: usize,
    /// 종료된 핸들러들이 기록한 메시지 수
    pub recorded: u64,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.joined + self.timed_out + self.failed
    }

    fn record_outcome(&mut self, outcome: HandlerOutcome) {
        self.joined += 1;
        self.recorded += outcome.recorded;
        match outcome.exit {
            HandlerExit::PeerClosed => self.peer_closed += 1,
            HandlerExit::Shutdown => self.stopped_by_signal += 1,
            HandlerExit::Failed => self.connection_errors += 1,
        }
    }
}

/// 종료 완료 보고서
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub drain: DrainReport,
    pub messages: Vec<Message>,
}

/// 종료 조정자
///
/// 취소 토큰은 리스너와 각 핸들러에 주입되며, 한 번 취소되면 되돌릴 수 없습니다.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    state: AtomicU8,
    registry: Mutex<Vec<RegisteredHandler>>,
    message_log: Arc<MessageLog>,
}

impl ShutdownCoordinator {
    /// 새로운 종료 조정자 생성
    pub fn new(message_log: Arc<MessageLog>) -> Self {
        Self {
            token: CancellationToken::new(),
            state: AtomicU8::new(STATE_RUNNING),
            registry: Mutex::new(Vec::new()),
            message_log,
        }
    }

    /// 리스너/핸들러에 주입할 자식 토큰
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// 종료 신호를 설정합니다.
    ///
    /// 여러 번, 여러 태스크에서 동시에 호출해도 안전합니다.
    /// 이 호출이 `Running` → `Draining` 전이를 수행했으면 `true`를 반환합니다.
    pub fn signal(&self) -> bool {
        let transitioned = self
            .state
            .compare_exchange(STATE_RUNNING, STATE_DRAINING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        self.token.cancel();

        if transitioned {
            info!("🛑 종료 신호 수신 - 드레인 시작 (핸들러 {}개)", self.registered());
        } else {
            debug!("종료 신호가 이미 설정되어 있습니다");
        }

        transitioned
    }

    /// 종료 신호 설정 여부 (논블로킹)
    pub fn is_signaled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// 핸들러 태스크를 레지스트리에 등록합니다.
    pub fn register(&self, handler: RegisteredHandler) {
        debug!("핸들러 #{} 등록 ({})", handler.id, handler.client);
        self.registry.lock().push(handler);
    }

    /// 아직 드레인되지 않은 등록 핸들러 수
    pub fn registered(&self) -> usize {
        self.registry.lock().len()
    }

    /// 등록된 모든 핸들러의 종료를 기다립니다.
    ///
    /// 핸들러마다 `timeout_per_task`까지만 기다리며, 넘긴 핸들러는 강제 종료하지
    /// 않고 버립니다. 드레인 도중 등록된 핸들러도 함께 처리합니다.
    pub async fn await_all(&self, timeout_per_task: Duration) -> ShutdownReport {
        if !self.is_signaled() {
            warn!("종료 신호 없이 드레인 요청 - 신호를 먼저 설정합니다");
            self.signal();
        }

        let started = Instant::now();
        let mut drain = DrainReport::default();

        loop {
            let batch = std::mem::take(&mut *self.registry.lock());
            if batch.is_empty() {
                break;
            }

            for handler in batch {
                match timeout(timeout_per_task, handler.handle).await {
                    Ok(Ok(outcome)) => {
                        drain.record_outcome(outcome);
                        debug!(
                            "핸들러 #{} 종료 확인 ({}) - {:?}, 메시지 {}개",
                            handler.id, handler.client, outcome.exit, outcome.recorded
                        );
                    }
                    Ok(Err(join_error)) => {
                        drain.failed += 1;
                        warn!(
                            "핸들러 #{} 비정상 종료 ({}): {}",
                            handler.id, handler.client, join_error
                        );
                    }
                    Err(_) => {
                        drain.timed_out += 1;
                        let error = IngestError::connection(
                            handler.client,
                            std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                format!("핸들러 #{} 드레인 시간 초과 ({:?})", handler.id, timeout_per_task),
                            ),
                        );
                        ErrorHandler::handle_error(
                            &error,
                            ErrorSeverity::Warning,
                            "ShutdownCoordinator",
                            "await_all",
                        );
                    }
                }
            }
        }

        self.state.store(STATE_STOPPED, Ordering::Release);

        let messages = self.message_log.snapshot();
        info!(
            "✅ 드레인 완료: 종료 {}개, 시간 초과 {}개, 실패 {}개 ({:?})",
            drain.joined,
            drain.timed_out,
            drain.failed,
            started.elapsed()
        );
        info!(
            "종료 사유: 피어 종료 {}개, 종료 신호 {}개, 연결 에러 {}개",
            drain.peer_closed, drain.stopped_by_signal, drain.connection_errors
        );
        info!("기록된 메시지 {}개", messages.len());
        for message in &messages {
            info!("\t{}", message);
        }

        ShutdownReport { drain, messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn coordinator() -> Arc<ShutdownCoordinator> {
        Arc::new(ShutdownCoordinator::new(Arc::new(MessageLog::new())))
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// 종료 신호를 기다렸다가 주어진 결과를 돌려주는 핸들러 태스크
    fn cooperative(token: CancellationToken, exit: HandlerExit, recorded: u64) -> JoinHandle<HandlerOutcome> {
        tokio::spawn(async move {
            token.cancelled().await;
            HandlerOutcome { exit, recorded }
        })
    }

    #[test]
    fn test_initial_state() {
        let coordinator = coordinator();
        assert_eq!(coordinator.state(), ShutdownState::Running);
        assert!(!coordinator.is_signaled());
        assert_eq!(coordinator.registered(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_signal_is_idempotent() {
        let coordinator = coordinator();
        let token = coordinator.token();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.signal() })
            })
            .collect();

        let mut transitions = 0;
        for handle in handles {
            if handle.await.unwrap() {
                transitions += 1;
            }
        }

        assert_eq!(transitions, 1, "전이는 정확히 한 번만 일어나야 함");
        assert!(coordinator.is_signaled());
        assert!(token.is_cancelled());
        assert_eq!(coordinator.state(), ShutdownState::Draining);
        assert!(!coordinator.signal());
    }

    #[tokio::test]
    async fn test_await_all_empty_registry() {
        let coordinator = coordinator();
        coordinator.signal();

        let report = coordinator.await_all(Duration::from_millis(100)).await;
        assert_eq!(report.drain, DrainReport::default());
        assert!(report.messages.is_empty());
        assert_eq!(coordinator.state(), ShutdownState::Stopped);
    }

    #[tokio::test]
    async fn test_await_all_joins_cooperative_handlers() {
        let coordinator = coordinator();

        for id in 0..5u64 {
            let handle = cooperative(coordinator.token(), HandlerExit::Shutdown, 0);
            coordinator.register(RegisteredHandler {
                id,
                client: peer(20_000 + id as u16),
                handle,
            });
        }
        assert_eq!(coordinator.registered(), 5);

        coordinator.signal();
        let report = coordinator.await_all(Duration::from_secs(1)).await;

        assert_eq!(report.drain.joined, 5);
        assert_eq!(report.drain.stopped_by_signal, 5);
        assert_eq!(report.drain.timed_out, 0);
        assert_eq!(report.drain.total(), 5);
        assert_eq!(coordinator.registered(), 0);
    }

    #[tokio::test]
    async fn test_straggler_is_abandoned() {
        let coordinator = coordinator();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            HandlerOutcome { exit: HandlerExit::PeerClosed, recorded: 0 }
        });
        coordinator.register(RegisteredHandler { id: 1, client: peer(30_000), handle });

        coordinator.signal();
        let started = Instant::now();
        let report = coordinator.await_all(Duration::from_millis(50)).await;

        assert_eq!(report.drain.timed_out, 1);
        assert_eq!(report.drain.joined, 0);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(coordinator.state(), ShutdownState::Stopped);
    }

    #[tokio::test]
    #[allow(unreachable_code)]
    async fn test_panicked_handler_counts_as_failed() {
        let coordinator = coordinator();
        let handle = tokio::spawn(async {
            panic!("핸들러 패닉");
            HandlerOutcome { exit: HandlerExit::Shutdown, recorded: 0 }
        });
        coordinator.register(RegisteredHandler { id: 7, client: peer(30_001), handle });

        coordinator.signal();
        let report = coordinator.await_all(Duration::from_secs(1)).await;
        assert_eq!(report.drain.failed, 1);
        assert_eq!(report.drain.joined, 0);
    }

    #[tokio::test]
    async fn test_drain_report_counts_exit_reasons() {
        let coordinator = coordinator();
        let finished = [
            (HandlerExit::PeerClosed, 3),
            (HandlerExit::PeerClosed, 1),
            (HandlerExit::Failed, 2),
            (HandlerExit::Shutdown, 0),
        ];
        for (id, (exit, recorded)) in finished.into_iter().enumerate() {
            let handle = cooperative(coordinator.token(), exit, recorded);
            coordinator.register(RegisteredHandler {
                id: id as u64,
                client: peer(31_000 + id as u16),
                handle,
            });
        }

        coordinator.signal();
        let report = coordinator.await_all(Duration::from_secs(1)).await;

        assert_eq!(report.drain.joined, 4);
        assert_eq!(report.drain.peer_closed, 2);
        assert_eq!(report.drain.connection_errors, 1);
        assert_eq!(report.drain.stopped_by_signal, 1);
        assert_eq!(report.drain.recorded, 6);
    }

    #[tokio::test]
    async fn test_await_all_without_signal_signals_first() {
        let coordinator = coordinator();
        let handle = cooperative(coordinator.token(), HandlerExit::Shutdown, 0);
        coordinator.register(RegisteredHandler { id: 1, client: peer(30_002), handle });

        let report = coordinator.await_all(Duration::from_secs(1)).await;
        assert!(coordinator.is_signaled());
        assert_eq!(report.drain.joined, 1);
    }

    #[tokio::test]
    async fn test_report_contains_logged_messages() {
        let log = Arc::new(MessageLog::new());
        let coordinator = ShutdownCoordinator::new(log.clone());
        log.append(Message::received(peer(40_000), Bytes::from_static(b"hello")).unwrap());

        coordinator.signal();
        let report = coordinator.await_all(Duration::from_millis(100)).await;
        assert_eq!(report.messages.len(), 1);
        assert_eq!(report.messages[0].data().as_ref(), b"hello");
    }
}
