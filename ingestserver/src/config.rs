//! 수집 서버 환경 설정 모듈
//!
//! .env 파일과 환경변수에서 설정을 로드하고 관리합니다.

use anyhow::Result;
use std::path::Path;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::tool::error::IngestError;

/// 기본 바인드 호스트
pub const DEFAULT_HOST: &str = "localhost";
/// 기본 바인드 포트
pub const DEFAULT_PORT: u16 = 8675;
/// 기본 핸들러당 드레인 대기 시간 (밀리초)
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 100;

/// 수집 서버 설정 구조체
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestServerConfig {
    /// 바인드 호스트 주소
    pub host: String,
    /// 바인드 포트 번호 (0이면 임시 포트)
    pub port: u16,
    /// 종료 시 핸들러 하나를 기다리는 최대 시간 (밀리초)
    pub drain_timeout_ms: u64,
}

impl Default for IngestServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl IngestServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. 상위 디렉토리의 .env 파일
    /// 2. 현재 디렉토리의 .env 파일
    /// 3. 시스템 환경변수
    /// 4. 기본값
    ///
    /// 환경변수:
    /// - ingest_host: 바인드 호스트 (기본값: "localhost")
    /// - ingest_port: 바인드 포트 (기본값: 8675)
    /// - ingest_drain_timeout_ms: 핸들러당 드레인 대기 시간 (기본값: 100)
    pub fn from_env() -> Result<Self> {
        Self::load_env_file();

        let config = Self {
            host: std::env::var("ingest_host").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: Self::parse_var("ingest_port", DEFAULT_PORT)?,
            drain_timeout_ms: Self::parse_var("ingest_drain_timeout_ms", DEFAULT_DRAIN_TIMEOUT_MS)?,
        };

        info!("수집 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 핸들러당 드레인 대기 시간
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// 환경변수 값을 파싱합니다. 값이 없으면 기본값을 사용합니다.
    fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
        match std::env::var(key) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| IngestError::configuration(key, &format!("숫자가 아닌 값: {:?}", raw)).into()),
            Err(_) => Ok(default),
        }
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        let env_paths = ["../.env", ".env", "../../.env"];

        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                return;
            }
        }

        warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
    }
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &IngestServerConfig) -> Result<()> {
    if config.host.trim().is_empty() {
        return Err(IngestError::configuration("ingest_host", "호스트 주소가 비어있습니다").into());
    }

    if config.port == 0 {
        return Err(IngestError::configuration("ingest_port", "유효하지 않은 포트 번호: 0").into());
    }

    if config.drain_timeout_ms == 0 {
        return Err(IngestError::configuration(
            "ingest_drain_timeout_ms",
            "드레인 대기 시간은 0보다 커야 합니다",
        )
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IngestServerConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8675);
        assert_eq!(config.bind_address(), "localhost:8675");
        assert_eq!(config.drain_timeout(), Duration::from_millis(100));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty_host = IngestServerConfig {
            host: "  ".to_string(),
            ..Default::default()
        };
        assert!(validate_config(&empty_host).is_err());

        let zero_port = IngestServerConfig {
            port: 0,
            ..Default::default()
        };
        let error = validate_config(&zero_port).unwrap_err();
        assert!(error.to_string().contains("ingest_port"));

        let zero_drain = IngestServerConfig {
            drain_timeout_ms: 0,
            ..Default::default()
        };
        assert!(validate_config(&zero_drain).is_err());
    }

    #[test]
    fn test_parse_var_falls_back_and_rejects_garbage() {
        let missing: u16 = IngestServerConfig::parse_var("ingest_test_missing_var", 42).unwrap();
        assert_eq!(missing, 42);

        std::env::set_var("ingest_test_garbage_var", "not-a-number");
        let garbage = IngestServerConfig::parse_var::<u16>("ingest_test_garbage_var", 1);
        assert!(garbage.is_err());

        std::env::set_var("ingest_test_valid_var", " 9000 ");
        let valid = IngestServerConfig::parse_var::<u16>("ingest_test_valid_var", 1).unwrap();
        assert_eq!(valid, 9000);
    }
}
