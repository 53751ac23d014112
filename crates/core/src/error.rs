//! 에러 타입 -- 도메인별 에러 정의
//!
//! [`DeptraceError`]는 워크스페이스 전체의 최상위 에러입니다.
//! 각 크레이트는 자기 도메인 에러를 정의하고 `From` 구현으로
//! 이 타입으로 변환하여 `?` 연산자로 전파합니다.

/// deptrace 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum DeptraceError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스캔 태스크 에러
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

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

/// 스캔 태스크 에러
///
/// 데이터 소스 수준의 치명적 실패만 이 타입으로 표현됩니다.
/// 분석기 오류나 중첩 압축 해제 실패는 로그로만 남습니다.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// 데이터 소스를 읽을 수 없음
    #[error("origin unavailable: {0}")]
    Origin(String),

    /// 압축 컨테이너 해제 실패
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// 태스크가 취소됨 (명시적 취소 또는 타임아웃)
    #[error("task cancelled")]
    Cancelled,

    /// 분석기 오류 (태스크 결과에는 기록되지 않음)
    #[error("analyzer fault: {0}")]
    Analyzer(String),

    /// 내부 채널 에러
    #[error("channel error: {0}")]
    Channel(String),
}
