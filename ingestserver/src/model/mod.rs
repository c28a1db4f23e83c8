//! 데이터 모델

pub mod message;

pub use message::Message;
