//! 설정 관리 -- deptrace.toml 파싱 및 런타임 설정
//!
//! [`DeptraceConfig`]는 모든 설정 섹션을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`DEPTRACE_SCAN_TIMEOUT_SECS=60` 형식)
//! 3. 설정 파일 (`deptrace.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), deptrace_core::error::DeptraceError> {
//! use deptrace_core::config::DeptraceConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = DeptraceConfig::load("deptrace.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = DeptraceConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, DeptraceError};

/// 타임아웃 상한 (24시간)
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// 압축 해제 중첩 깊이 상한
const MAX_EXTRACT_DEPTH_LIMIT: usize = 64;

/// 압축 엔트리 크기 상한 (8 GB)
const MAX_ARCHIVE_ENTRY_SIZE_LIMIT: u64 = 8 * 1024 * 1024 * 1024;

/// deptrace 통합 설정
///
/// `deptrace.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeptraceConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 스캔 설정
    #[serde(default)]
    pub scan: ScanConfig,
}

impl DeptraceConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DeptraceError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DeptraceError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeptraceError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DeptraceError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, DeptraceError> {
        toml::from_str(toml_str).map_err(|e| {
            DeptraceError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `DEPTRACE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "DEPTRACE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DEPTRACE_GENERAL_LOG_FORMAT");

        override_u64(&mut self.scan.timeout_secs, "DEPTRACE_SCAN_TIMEOUT_SECS");
        override_csv(&mut self.scan.analyzers, "DEPTRACE_SCAN_ANALYZERS");
        override_usize(
            &mut self.scan.max_extract_depth,
            "DEPTRACE_SCAN_MAX_EXTRACT_DEPTH",
        );
        override_usize(
            &mut self.scan.max_extraction_failures,
            "DEPTRACE_SCAN_MAX_EXTRACTION_FAILURES",
        );
        override_u64(
            &mut self.scan.max_archive_entry_size,
            "DEPTRACE_SCAN_MAX_ARCHIVE_ENTRY_SIZE",
        );
        override_u64(
            &mut self.scan.fetch_timeout_secs,
            "DEPTRACE_SCAN_FETCH_TIMEOUT_SECS",
        );
        override_string(&mut self.scan.work_dir, "DEPTRACE_SCAN_WORK_DIR");
        override_bool(&mut self.scan.vuln_only, "DEPTRACE_SCAN_VULN_ONLY");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DeptraceError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        self.scan.validate()
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 스캔 설정
///
/// 태스크 기본값과 압축 해제/다운로드 한도를 담습니다.
/// 엔진은 이 섹션을 `EngineConfig::from_core()`로 읽어 확장합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 태스크 전체 타임아웃 (초). 0이면 무제한
    pub timeout_secs: u64,
    /// 사용할 분석기 이름 목록. 비어 있으면 등록된 전체 분석기
    pub analyzers: Vec<String>,
    /// 압축 컨테이너 최대 중첩 깊이
    pub max_extract_depth: usize,
    /// 중첩 압축 해제 실패 허용 횟수. 0이면 실패해도 태스크를 중단하지 않음
    pub max_extraction_failures: usize,
    /// 압축 엔트리 하나의 최대 해제 크기 (바이트)
    pub max_archive_entry_size: u64,
    /// 원격 데이터 소스 다운로드 타임아웃 (초)
    pub fetch_timeout_secs: u64,
    /// 임시 작업 디렉토리. 비어 있으면 시스템 임시 디렉토리
    pub work_dir: String,
    /// 보고서에 취약 컴포넌트만 남길지 여부
    pub vuln_only: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            analyzers: Vec::new(),
            max_extract_depth: 8,
            max_extraction_failures: 0,
            max_archive_entry_size: 2 * 1024 * 1024 * 1024, // 2 GB
            fetch_timeout_secs: 300,
            work_dir: String::new(),
            vuln_only: false,
        }
    }
}

impl ScanConfig {
    /// 스캔 섹션의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DeptraceError> {
        if self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "scan.timeout_secs".to_owned(),
                reason: format!("must be 0 (unbounded) or 1-{MAX_TIMEOUT_SECS}"),
            }
            .into());
        }

        if self.max_extract_depth > MAX_EXTRACT_DEPTH_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "scan.max_extract_depth".to_owned(),
                reason: format!("must be 0-{MAX_EXTRACT_DEPTH_LIMIT}"),
            }
            .into());
        }

        if self.max_archive_entry_size == 0
            || self.max_archive_entry_size > MAX_ARCHIVE_ENTRY_SIZE_LIMIT
        {
            return Err(ConfigError::InvalidValue {
                field: "scan.max_archive_entry_size".to_owned(),
                reason: format!("must be 1-{MAX_ARCHIVE_ENTRY_SIZE_LIMIT}"),
            }
            .into());
        }

        if self.fetch_timeout_secs == 0 || self.fetch_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "scan.fetch_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_TIMEOUT_SECS}"),
            }
            .into());
        }

        if self.analyzers.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "scan.analyzers".to_owned(),
                reason: "analyzer names must not be empty".to_owned(),
            }
            .into());
        }

        if Path::new(&self.work_dir)
            .components()
            .any(|c| c == std::path::Component::ParentDir)
        {
            return Err(ConfigError::InvalidValue {
                field: "scan.work_dir".to_owned(),
                reason: "work_dir contains path traversal pattern '..'".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = DeptraceConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.scan.timeout_secs, 0);
        assert!(config.scan.analyzers.is_empty());
        assert_eq!(config.scan.max_extract_depth, 8);
        assert_eq!(config.scan.max_extraction_failures, 0);
        assert!(!config.scan.vuln_only);
    }

    #[test]
    fn default_config_passes_validation() {
        DeptraceConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = DeptraceConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.scan.fetch_timeout_secs, 300);
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[scan]
timeout_secs = 120
analyzers = ["npm"]
"#;
        let config = DeptraceConfig::parse(toml).unwrap();
        assert_eq!(config.scan.timeout_secs, 120);
        assert_eq!(config.scan.analyzers, vec!["npm"]);
        // 나머지 필드는 기본값 유지
        assert_eq!(config.scan.max_extract_depth, 8);
        assert_eq!(config.general.log_format, "pretty");
    }

    #[test]
    fn parse_invalid_toml_fails() {
        let err = DeptraceConfig::parse("[scan\ntimeout_secs = ").unwrap_err();
        assert!(matches!(
            err,
            DeptraceError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_unknown_log_level() {
        let mut config = DeptraceConfig::default();
        config.general.log_level = "verbose".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_log_format() {
        let mut config = DeptraceConfig::default();
        config.general.log_format = "xml".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_excessive_timeout() {
        let mut config = DeptraceConfig::default();
        config.scan.timeout_secs = MAX_TIMEOUT_SECS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_entry_size() {
        let mut config = DeptraceConfig::default();
        config.scan.max_archive_entry_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_fetch_timeout() {
        let mut config = DeptraceConfig::default();
        config.scan.fetch_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_analyzer_name() {
        let mut config = DeptraceConfig::default();
        config.scan.analyzers = vec!["npm".to_owned(), " ".to_owned()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_work_dir_traversal() {
        let mut config = DeptraceConfig::default();
        config.scan.work_dir = "/tmp/../etc".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_overrides_take_precedence() {
        // SAFETY: serial 테스트로 환경변수 동시 접근을 막는다
        unsafe {
            std::env::set_var("DEPTRACE_SCAN_TIMEOUT_SECS", "45");
            std::env::set_var("DEPTRACE_SCAN_ANALYZERS", "npm, cargo");
        }

        let mut config = DeptraceConfig::parse("[scan]\ntimeout_secs = 10").unwrap();
        config.apply_env_overrides();

        unsafe {
            std::env::remove_var("DEPTRACE_SCAN_TIMEOUT_SECS");
            std::env::remove_var("DEPTRACE_SCAN_ANALYZERS");
        }

        assert_eq!(config.scan.timeout_secs, 45);
        assert_eq!(config.scan.analyzers, vec!["npm", "cargo"]);
    }

    #[test]
    #[serial]
    fn env_override_with_bad_number_is_ignored() {
        unsafe {
            std::env::set_var("DEPTRACE_SCAN_MAX_EXTRACT_DEPTH", "deep");
        }

        let mut config = DeptraceConfig::default();
        config.apply_env_overrides();

        unsafe {
            std::env::remove_var("DEPTRACE_SCAN_MAX_EXTRACT_DEPTH");
        }

        assert_eq!(config.scan.max_extract_depth, 8);
    }

    #[test]
    #[serial]
    fn env_override_vuln_only() {
        unsafe {
            std::env::set_var("DEPTRACE_SCAN_VULN_ONLY", "true");
        }

        let mut config = DeptraceConfig::parse("[scan]\nvuln_only = false").unwrap();
        config.apply_env_overrides();

        unsafe {
            std::env::set_var("DEPTRACE_SCAN_VULN_ONLY", "yes");
        }

        // bool로 해석되지 않는 값은 무시
        let mut ignored = DeptraceConfig::parse("[scan]\nvuln_only = true").unwrap();
        ignored.apply_env_overrides();

        unsafe {
            std::env::remove_var("DEPTRACE_SCAN_VULN_ONLY");
        }

        assert!(config.scan.vuln_only);
        assert!(ignored.scan.vuln_only);
    }

    #[tokio::test]
    async fn from_file_missing_returns_file_not_found() {
        let err = DeptraceConfig::from_file("/nonexistent/deptrace.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeptraceError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deptrace.toml");
        std::fs::write(&path, "[general]\nlog_level = \"debug\"\n").unwrap();

        let config = DeptraceConfig::from_file(&path).await.unwrap();
        assert_eq!(config.general.log_level, "debug");
    }
}
