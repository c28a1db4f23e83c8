//! 공통 도구 모듈

pub mod error;

pub use error::{ErrorHandler, ErrorSeverity, IngestError, IngestResult};
