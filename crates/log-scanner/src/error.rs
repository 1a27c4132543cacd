//! 로그 스캐너 에러 타입
//!
//! [`ScannerError`]는 스캐너 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<ScannerError> for RattleError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use rattle_core::error::{ConfigError, ContainerError, RattleError, StoreError};

/// 로그 스캐너 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Docker 소켓 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// 로그 스트림 세션 실패 (일시적)
    #[error("log stream error for container '{container_id}': {reason}")]
    Stream {
        /// 대상 컨테이너 ID
        container_id: String,
        /// 실패 사유
        reason: String,
    },

    /// 재시도 한도 초과 (종료)
    #[error(
        "log stream for container '{container_id}' failed {attempts} times, giving up: {last_error}"
    )]
    RetriesExhausted {
        /// 대상 컨테이너 ID
        container_id: String,
        /// 실패한 세션 수
        attempts: u32,
        /// 마지막 실패 사유
        last_error: String,
    },

    /// 설정 저장소 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<ScannerError> for RattleError {
    fn from(err: ScannerError) -> Self {
        match err {
            ScannerError::DockerApi(msg) | ScannerError::DockerConnection(msg) => {
                RattleError::Container(ContainerError::RuntimeApi(msg))
            }
            ScannerError::ContainerNotFound(id) => {
                RattleError::Container(ContainerError::NotFound(id))
            }
            ScannerError::Stream {
                container_id,
                reason,
            } => RattleError::Container(ContainerError::StreamFailed {
                container_id,
                reason,
            }),
            ScannerError::RetriesExhausted {
                container_id,
                attempts,
                last_error,
            } => RattleError::Container(ContainerError::StreamFailed {
                container_id,
                reason: format!("gave up after {attempts} attempts: {last_error}"),
            }),
            ScannerError::Store(e) => RattleError::Store(e),
            ScannerError::Config { field, reason } => {
                RattleError::Config(ConfigError::InvalidValue { field, reason })
            }
            ScannerError::Channel(msg) => RattleError::Container(ContainerError::RuntimeApi(
                format!("channel error: {msg}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_exhausted_display() {
        let err = ScannerError::RetriesExhausted {
            container_id: "abc123".to_owned(),
            attempts: 4,
            last_error: "connection reset".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("4 times"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn converts_to_rattle_error_container() {
        let err: RattleError = ScannerError::DockerConnection("socket not found".to_owned()).into();
        assert!(matches!(
            err,
            RattleError::Container(ContainerError::RuntimeApi(_))
        ));
    }

    #[test]
    fn converts_not_found() {
        let err: RattleError = ScannerError::ContainerNotFound("abc".to_owned()).into();
        assert!(matches!(
            err,
            RattleError::Container(ContainerError::NotFound(_))
        ));
    }

    #[test]
    fn converts_store_error() {
        let err: RattleError =
            ScannerError::Store(StoreError::Query("timeout".to_owned())).into();
        assert!(matches!(err, RattleError::Store(_)));
    }

    #[test]
    fn converts_config_error() {
        let err: RattleError = ScannerError::Config {
            field: "max_line_bytes".to_owned(),
            reason: "too small".to_owned(),
        }
        .into();
        assert!(matches!(err, RattleError::Config(_)));
    }

    #[test]
    fn retries_exhausted_maps_to_stream_failed() {
        let err: RattleError = ScannerError::RetriesExhausted {
            container_id: "abc".to_owned(),
            attempts: 2,
            last_error: "eof".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            RattleError::Container(ContainerError::StreamFailed { .. })
        ));
    }
}
