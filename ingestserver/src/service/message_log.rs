//! 메시지 로그 서비스
//!
//! 모든 연결 핸들러가 공유하는 추가 전용(append-only) 메시지 저장소입니다.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::model::Message;

/// 스레드 안전한 추가 전용 메시지 로그
///
/// 추가는 하나의 뮤텍스로 직렬화되며, 한 번 추가된 항목은 제거되거나
/// 재정렬되지 않습니다.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Mutex<Vec<Message>>,
    total_bytes: AtomicU64,
}

impl MessageLog {
    /// 빈 메시지 로그 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 메시지를 로그 끝에 추가하고, 추가 후 항목 수를 반환합니다.
    pub fn append(&self, message: Message) -> usize {
        let size = message.len() as u64;
        let count = {
            let mut messages = self.messages.lock();
            messages.push(message);
            messages.len()
        };
        self.total_bytes.fetch_add(size, Ordering::Relaxed);

        debug!("메시지 로그 추가: {}번째 항목 ({}바이트)", count, size);
        count
    }

    /// 현재 내용의 일관된 복사본
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// 특정 클라이언트가 보낸 메시지만 수신 순서대로 반환합니다.
    pub fn messages_from(&self, client: SocketAddr) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|message| message.client() == client)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// 지금까지 기록된 총 바이트 수
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }
}
