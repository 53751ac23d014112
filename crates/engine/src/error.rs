//! 탐지 엔진 에러 타입
//!
//! [`EngineError`]는 엔진 내부에서 발생할 수 있는 모든 에러를 나타냅니다.
//! `From<EngineError> for DeptraceError` 구현을 통해 `?` 연산자로
//! 상위 에러 타입으로 전파됩니다.
//!
//! # 에러 카테고리
//!
//! - **데이터 소스**: `Origin`, `UnsupportedScheme`, `Fetch` -- 태스크 치명적
//! - **압축 해제**: `Extraction`, `ExtractionLimit`
//! - **취소**: `Cancelled`
//! - **분석기**: `Analyzer` -- 호출 단위로 격리되며 전파되지 않음
//! - **분석기 레지스트리**: `AlreadyRegistered`, `UnknownAnalyzer`
//! - **설정/채널/I/O**: `Config`, `Channel`, `Io`

use deptrace_core::error::{ConfigError, DeptraceError, ScanError};

/// 탐지 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 데이터 소스를 읽을 수 없음
    #[error("origin unavailable: {origin}: {reason}")]
    Origin {
        /// 데이터 소스 경로 또는 URL
        origin: String,
        /// 실패 사유
        reason: String,
    },

    /// 지원하지 않는 URL 스킴
    #[error("unsupported origin scheme: '{scheme}' in {origin}")]
    UnsupportedScheme {
        /// 스킴 (예: ftp)
        scheme: String,
        /// 데이터 소스 원문
        origin: String,
    },

    /// 원격 데이터 소스 다운로드 실패
    #[error("fetch failed: {url}: {reason}")]
    Fetch {
        /// 요청 URL
        url: String,
        /// 실패 사유
        reason: String,
    },

    /// 압축 컨테이너 해제 실패
    #[error("extraction failed: {path}: {reason}")]
    Extraction {
        /// 컨테이너 상대 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 압축 해제 실패 누적 한도 초과
    #[error("too many extraction failures: {failures} (limit: {limit})")]
    ExtractionLimit {
        /// 누적 실패 수
        failures: usize,
        /// 설정된 한도
        limit: usize,
    },

    /// 태스크 취소 (명시적 취소 또는 타임아웃)
    #[error("task cancelled")]
    Cancelled,

    /// 분석기 내부 오류
    #[error("analyzer fault: {analyzer}: {reason}")]
    Analyzer {
        /// 분석기 이름
        analyzer: String,
        /// 오류 사유
        reason: String,
    },

    /// 같은 이름의 분석기가 이미 등록됨
    #[error("analyzer already registered: {name}")]
    AlreadyRegistered {
        /// 분석기 이름
        name: String,
    },

    /// 등록되지 않은 분석기
    #[error("unknown analyzer: {name}")]
    UnknownAnalyzer {
        /// 분석기 이름
        name: String,
    },

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

    /// 파일 I/O 에러
    #[error("io error: {path}: {source}")]
    Io {
        /// 관련 파일 경로
        path: String,
        /// 원본 I/O 에러
        source: std::io::Error,
    },
}

impl EngineError {
    /// 경로 문맥을 붙여 I/O 에러를 만듭니다.
    pub(crate) fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    /// 분석기 오류를 만듭니다.
    pub fn analyzer(analyzer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Analyzer {
            analyzer: analyzer.into(),
            reason: reason.into(),
        }
    }
}

impl From<EngineError> for DeptraceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Origin { .. }
            | EngineError::UnsupportedScheme { .. }
            | EngineError::Fetch { .. } => DeptraceError::Scan(ScanError::Origin(err.to_string())),
            EngineError::Extraction { .. } | EngineError::ExtractionLimit { .. } => {
                DeptraceError::Scan(ScanError::Extraction(err.to_string()))
            }
            EngineError::Cancelled => DeptraceError::Scan(ScanError::Cancelled),
            EngineError::Analyzer { .. } => {
                DeptraceError::Scan(ScanError::Analyzer(err.to_string()))
            }
            EngineError::Channel(msg) => DeptraceError::Scan(ScanError::Channel(msg)),
            EngineError::AlreadyRegistered { .. } | EngineError::UnknownAnalyzer { .. } => {
                DeptraceError::Config(ConfigError::InvalidValue {
                    field: "scan.analyzers".to_owned(),
                    reason: err.to_string(),
                })
            }
            EngineError::Config { field, reason } => {
                DeptraceError::Config(ConfigError::InvalidValue { field, reason })
            }
            EngineError::Io { source, .. } => DeptraceError::Io(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_error_display() {
        let err = EngineError::Origin {
            origin: "/srv/app".to_owned(),
            reason: "no such file or directory".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/srv/app"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn unsupported_scheme_display() {
        let err = EngineError::UnsupportedScheme {
            scheme: "ftp".to_owned(),
            origin: "ftp://example.com/a.zip".to_owned(),
        };
        assert!(err.to_string().contains("'ftp'"));
    }

    #[test]
    fn extraction_limit_display() {
        let err = EngineError::ExtractionLimit {
            failures: 3,
            limit: 3,
        };
        assert_eq!(err.to_string(), "too many extraction failures: 3 (limit: 3)");
    }

    #[test]
    fn analyzer_helper_builds_variant() {
        let err = EngineError::analyzer("npm", "bad json");
        assert!(matches!(err, EngineError::Analyzer { .. }));
        assert_eq!(err.to_string(), "analyzer fault: npm: bad json");
    }

    #[test]
    fn converts_origin_errors_to_scan_origin() {
        let err = EngineError::UnsupportedScheme {
            scheme: "ftp".to_owned(),
            origin: "ftp://x".to_owned(),
        };
        let top: DeptraceError = err.into();
        assert!(matches!(top, DeptraceError::Scan(ScanError::Origin(_))));
    }

    #[test]
    fn converts_cancelled() {
        let top: DeptraceError = EngineError::Cancelled.into();
        assert!(matches!(top, DeptraceError::Scan(ScanError::Cancelled)));
    }

    #[test]
    fn converts_config_error() {
        let top: DeptraceError = EngineError::Config {
            field: "emit_queue_capacity".to_owned(),
            reason: "must be > 0".to_owned(),
        }
        .into();
        assert!(matches!(
            top,
            DeptraceError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn converts_unknown_analyzer_to_config_error() {
        let top: DeptraceError = EngineError::UnknownAnalyzer {
            name: "maven".to_owned(),
        }
        .into();
        match top {
            DeptraceError::Config(ConfigError::InvalidValue { field, reason }) => {
                assert_eq!(field, "scan.analyzers");
                assert!(reason.contains("maven"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn converts_io_error() {
        let err = EngineError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let top: DeptraceError = err.into();
        assert!(matches!(top, DeptraceError::Io(_)));
    }
}
