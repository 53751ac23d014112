//! 탐지 엔진 설정
//!
//! [`EngineConfig`]는 core의 [`ScanConfig`](deptrace_core::config::ScanConfig)를
//! 확장하여 엔진 고유 설정(큐 용량, 취소 유예 시간)을 추가합니다.
//!
//! # 사용 예시
//!
//! ```
//! use deptrace_engine::EngineConfig;
//!
//! // 기본값으로 생성
//! let config = EngineConfig::default();
//! config.validate().unwrap();
//!
//! // 빌더로 생성
//! use deptrace_engine::EngineConfigBuilder;
//!
//! let config = EngineConfigBuilder::new()
//!     .timeout_secs(60)
//!     .max_extract_depth(4)
//!     .build()
//!     .unwrap();
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// 탐지 엔진 설정
///
/// core의 `ScanConfig`에서 파생되며, 엔진 고유 확장 필드를 포함합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 태스크 기본 타임아웃 (초). 0이면 무제한
    pub timeout_secs: u64,
    /// 사용할 분석기 이름 목록. 비어 있으면 전체
    pub analyzers: Vec<String>,
    /// 압축 컨테이너 최대 중첩 깊이
    pub max_extract_depth: usize,
    /// 중첩 압축 해제 실패 허용 횟수. 0이면 중단하지 않음
    pub max_extraction_failures: usize,
    /// 압축 엔트리 최대 해제 크기 (바이트)
    pub max_archive_entry_size: u64,
    /// 원격 다운로드 타임아웃 (초)
    pub fetch_timeout_secs: u64,
    /// 임시 작업 디렉토리. `None`이면 시스템 임시 디렉토리
    pub work_dir: Option<PathBuf>,

    // --- 엔진 고유 확장 ---
    /// 순회기 -> 오케스트레이터 그룹 큐 용량
    pub group_queue_capacity: usize,
    /// 분석기 -> 오케스트레이터 방출 큐 용량
    pub emit_queue_capacity: usize,
    /// 취소 후 분석기 중단까지 유예 시간 (밀리초)
    pub cancel_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            analyzers: Vec::new(),
            max_extract_depth: 8,
            max_extraction_failures: 0,
            max_archive_entry_size: 2 * 1024 * 1024 * 1024, // 2 GB
            fetch_timeout_secs: 300,
            work_dir: None,
            group_queue_capacity: 16,
            emit_queue_capacity: 256,
            cancel_grace_ms: 500,
        }
    }
}

/// 설정 상한값 상수
const MAX_TIMEOUT_SECS: u64 = 86_400; // 1 day
const MAX_EXTRACT_DEPTH_LIMIT: usize = 64;
const MAX_QUEUE_CAPACITY: usize = 65_536;
const MAX_CANCEL_GRACE_MS: u64 = 60_000;

impl EngineConfig {
    /// core의 `ScanConfig`에서 엔진 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값을 사용합니다.
    pub fn from_core(core: &deptrace_core::config::ScanConfig) -> Self {
        let work_dir = if core.work_dir.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(&core.work_dir))
        };

        Self {
            timeout_secs: core.timeout_secs,
            analyzers: core.analyzers.clone(),
            max_extract_depth: core.max_extract_depth,
            max_extraction_failures: core.max_extraction_failures,
            max_archive_entry_size: core.max_archive_entry_size,
            fetch_timeout_secs: core.fetch_timeout_secs,
            work_dir,
            ..Self::default()
        }
    }

    /// 태스크 기본 타임아웃. 0이면 `None`
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// 원격 다운로드 타임아웃
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// 취소 유예 시간
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    /// 설정 값의 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    ///
    /// - `timeout_secs`: 0-86400
    /// - `max_extract_depth`: 0-64
    /// - `max_archive_entry_size`: 1 이상
    /// - `fetch_timeout_secs`: 1-86400
    /// - `group_queue_capacity`, `emit_queue_capacity`: 1-65536
    /// - `cancel_grace_ms`: 0-60000
    /// - `work_dir`: `..` 포함 금지
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(EngineError::Config {
                field: "timeout_secs".to_owned(),
                reason: format!("must be 0 (unbounded) or 1-{MAX_TIMEOUT_SECS}"),
            });
        }

        if self.max_extract_depth > MAX_EXTRACT_DEPTH_LIMIT {
            return Err(EngineError::Config {
                field: "max_extract_depth".to_owned(),
                reason: format!("must be 0-{MAX_EXTRACT_DEPTH_LIMIT}"),
            });
        }

        if self.max_archive_entry_size == 0 {
            return Err(EngineError::Config {
                field: "max_archive_entry_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.fetch_timeout_secs == 0 || self.fetch_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(EngineError::Config {
                field: "fetch_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_TIMEOUT_SECS}"),
            });
        }

        for (field, value) in [
            ("group_queue_capacity", self.group_queue_capacity),
            ("emit_queue_capacity", self.emit_queue_capacity),
        ] {
            if value == 0 || value > MAX_QUEUE_CAPACITY {
                return Err(EngineError::Config {
                    field: field.to_owned(),
                    reason: format!("must be 1-{MAX_QUEUE_CAPACITY}"),
                });
            }
        }

        if self.cancel_grace_ms > MAX_CANCEL_GRACE_MS {
            return Err(EngineError::Config {
                field: "cancel_grace_ms".to_owned(),
                reason: format!("must be 0-{MAX_CANCEL_GRACE_MS}"),
            });
        }

        let traverses = self.work_dir.as_ref().is_some_and(|dir| {
            dir.components()
                .any(|c| c == std::path::Component::ParentDir)
        });
        if traverses {
            return Err(EngineError::Config {
                field: "work_dir".to_owned(),
                reason: "work_dir contains path traversal pattern '..'".to_owned(),
            });
        }

        Ok(())
    }
}

/// [`EngineConfig`] 빌더
///
/// 유연한 설정 구성 및 빌드 시 유효성 검증을 제공합니다.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// 기본값을 가진 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 태스크 기본 타임아웃(초)을 설정합니다.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    /// 사용할 분석기 이름 목록을 설정합니다.
    pub fn analyzers(mut self, names: Vec<String>) -> Self {
        self.config.analyzers = names;
        self
    }

    /// 최대 중첩 깊이를 설정합니다.
    pub fn max_extract_depth(mut self, depth: usize) -> Self {
        self.config.max_extract_depth = depth;
        self
    }

    /// 압축 해제 실패 허용 횟수를 설정합니다.
    pub fn max_extraction_failures(mut self, limit: usize) -> Self {
        self.config.max_extraction_failures = limit;
        self
    }

    /// 압축 엔트리 최대 크기(바이트)를 설정합니다.
    pub fn max_archive_entry_size(mut self, size: u64) -> Self {
        self.config.max_archive_entry_size = size;
        self
    }

    /// 원격 다운로드 타임아웃(초)을 설정합니다.
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    /// 임시 작업 디렉토리를 설정합니다.
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    /// 그룹 큐 용량을 설정합니다.
    pub fn group_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.group_queue_capacity = capacity;
        self
    }

    /// 방출 큐 용량을 설정합니다.
    pub fn emit_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.emit_queue_capacity = capacity;
        self
    }

    /// 취소 유예 시간(밀리초)을 설정합니다.
    pub fn cancel_grace_ms(mut self, ms: u64) -> Self {
        self.config.cancel_grace_ms = ms;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    ///
    /// # Errors
    ///
    /// 유효성 검증 실패 시 `EngineError::Config` 반환
    pub fn build(self) -> Result<EngineConfig, EngineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_preserves_values() {
        let core = deptrace_core::config::ScanConfig {
            timeout_secs: 120,
            analyzers: vec!["npm-lock".to_owned()],
            max_extract_depth: 3,
            max_extraction_failures: 2,
            max_archive_entry_size: 1024,
            fetch_timeout_secs: 30,
            work_dir: "/var/tmp/deptrace".to_owned(),
            vuln_only: false,
        };
        let config = EngineConfig::from_core(&core);
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.analyzers, vec!["npm-lock"]);
        assert_eq!(config.max_extract_depth, 3);
        assert_eq!(config.max_extraction_failures, 2);
        assert_eq!(config.max_archive_entry_size, 1024);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.work_dir, Some(PathBuf::from("/var/tmp/deptrace")));
        // extended fields use defaults
        assert_eq!(config.emit_queue_capacity, 256);
        assert_eq!(config.cancel_grace_ms, 500);
    }

    #[test]
    fn from_core_blank_work_dir_is_none() {
        let core = deptrace_core::config::ScanConfig::default();
        assert!(EngineConfig::from_core(&core).work_dir.is_none());
    }

    #[test]
    fn timeout_zero_is_unbounded() {
        assert!(EngineConfig::default().timeout().is_none());
        let config = EngineConfig {
            timeout_secs: 5,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn validate_rejects_excessive_timeout() {
        let config = EngineConfig {
            timeout_secs: MAX_TIMEOUT_SECS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_emit_queue() {
        let config = EngineConfig {
            emit_queue_capacity: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("emit_queue_capacity"));
    }

    #[test]
    fn validate_rejects_zero_group_queue() {
        let config = EngineConfig {
            group_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_excessive_grace() {
        let config = EngineConfig {
            cancel_grace_ms: MAX_CANCEL_GRACE_MS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_work_dir_traversal() {
        let config = EngineConfig {
            work_dir: Some(PathBuf::from("/tmp/../etc")),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_all_setters() {
        let config = EngineConfigBuilder::new()
            .timeout_secs(60)
            .analyzers(vec!["cargo-lock".to_owned()])
            .max_extract_depth(2)
            .max_extraction_failures(5)
            .max_archive_entry_size(4096)
            .fetch_timeout_secs(10)
            .work_dir("/tmp/work")
            .group_queue_capacity(4)
            .emit_queue_capacity(8)
            .cancel_grace_ms(100)
            .build()
            .unwrap();

        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.analyzers, vec!["cargo-lock"]);
        assert_eq!(config.max_extract_depth, 2);
        assert_eq!(config.max_extraction_failures, 5);
        assert_eq!(config.max_archive_entry_size, 4096);
        assert_eq!(config.fetch_timeout_secs, 10);
        assert_eq!(config.work_dir, Some(PathBuf::from("/tmp/work")));
        assert_eq!(config.group_queue_capacity, 4);
        assert_eq!(config.emit_queue_capacity, 8);
        assert_eq!(config.cancel_grace_ms, 100);
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let result = EngineConfigBuilder::new().fetch_timeout_secs(0).build();
        assert!(result.is_err());
    }
}
