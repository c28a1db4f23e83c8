//! 핸들러 레이어
//!
//! 연결 단위 수신 처리를 담당합니다.

pub mod connection_handler;

pub use connection_handler::{ConnectionHandler, HandlerExit, HandlerOutcome, READ_BUFFER_SIZE};
