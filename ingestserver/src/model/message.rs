//! 수신 메시지 모델

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::net::SocketAddr;

use crate::tool::error::{IngestError, IngestResult};

/// 한 번의 읽기로 수신한 데이터 기록
///
/// 생성 후 변경되지 않으며, 서버 수명 동안 로그에 보관됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    receipt_time: DateTime<Utc>,
    client: SocketAddr,
    data: Bytes,
}

impl Message {
    /// 방금 읽은 데이터로 메시지를 생성합니다.
    ///
    /// 수신 시각은 호출 시점으로 기록됩니다.
    pub fn received(client: SocketAddr, data: Bytes) -> IngestResult<Self> {
        Self::with_receipt_time(Utc::now(), client, data)
    }

    /// 수신 시각을 지정하여 메시지를 생성합니다.
    pub fn with_receipt_time(
        receipt_time: DateTime<Utc>,
        client: SocketAddr,
        data: Bytes,
    ) -> IngestResult<Self> {
        if data.is_empty() {
            return Err(IngestError::EmptyPayload { client });
        }

        Ok(Self {
            receipt_time,
            client,
            data,
        })
    }

    pub fn receipt_time(&self) -> DateTime<Utc> {
        self.receipt_time
    }

    pub fn client(&self) -> SocketAddr {
        self.client
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// 페이로드 크기 (바이트)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 항상 false (빈 메시지는 생성되지 않음)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({} bytes) {:?}",
            self.receipt_time.format("%Y-%m-%d %H:%M:%S%.6f"),
            self.client,
            self.data.len(),
            self.data
        )
    }
}
