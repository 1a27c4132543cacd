//! 에러 타입 — 도메인별 에러 정의

/// rattle 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum RattleError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 컨테이너 런타임 관련 에러
    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    /// 설정 저장소 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 컨테이너 런타임 에러
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// 런타임 API 호출 실패
    #[error("runtime api error: {0}")]
    RuntimeApi(String),

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    NotFound(String),

    /// 로그 스트림 실패 (재시도 한도 초과 포함)
    #[error("log stream failed for '{container_id}': {reason}")]
    StreamFailed {
        container_id: String,
        reason: String,
    },
}

/// 설정 저장소(영속 계층 경계) 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 저장된 값이 도메인 값으로 해석되지 않음
    #[error("invalid record in '{resource}': {reason}")]
    InvalidRecord { resource: String, reason: String },
}
