//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 취약점과 위험 등급처럼 엔진과 리포팅이 함께 읽는 데이터 구조를 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 위험 등급
///
/// 숫자가 낮을수록 심각합니다 (`Critical = 1` ... `Low = 4`).
/// `Ord`도 같은 방향이므로 `min()`이 가장 심각한 등급을 돌려줍니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    /// 긴급
    Critical = 1,
    /// 높음
    High = 2,
    /// 중간
    Medium = 3,
    /// 낮음
    Low = 4,
}

impl Severity {
    /// 취약점이 없는 컴포넌트에 쓰는 등급 번호
    pub const SAFE_LEVEL: u8 = 5;

    /// 등급 번호를 반환합니다 (1-4).
    pub fn level_id(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// 컴포넌트에 부착된 취약점
///
/// 취약점 주석 단계(외부)에서 채워지며, 부착된 뒤에는 변경되지 않습니다.
/// 동일성은 `id`로만 판단합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// 취약점 고유 ID
    pub id: String,
    /// 취약점 이름
    pub name: String,
    /// CVE ID (있을 경우)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    /// CWE ID (있을 경우)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    /// 설명
    #[serde(default)]
    pub description: String,
    /// 조치 방안
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// 심각도
    pub severity: Severity,
}

impl Vulnerability {
    /// ID와 심각도만으로 취약점을 생성합니다.
    pub fn new(id: impl Into<String>, severity: Severity) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            cve: None,
            cwe: None,
            description: String::new(),
            suggestion: None,
            severity,
        }
    }
}

impl fmt::Display for Vulnerability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_lower_level_is_more_severe() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::Medium < Severity::Low);
        let worst = [Severity::Low, Severity::Critical, Severity::Medium]
            .into_iter()
            .min()
            .unwrap();
        assert_eq!(worst, Severity::Critical);
    }

    #[test]
    fn severity_level_ids() {
        let levels: Vec<u8> = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low]
            .into_iter()
            .map(Severity::level_id)
            .collect();
        assert_eq!(levels, vec![1, 2, 3, 4]);
        assert!(levels.iter().all(|&level| level < Severity::SAFE_LEVEL));
    }

    #[test]
    fn vulnerability_new_uses_id_as_name() {
        let vuln = Vulnerability::new("DT-2024-0001", Severity::High);
        assert_eq!(vuln.name, "DT-2024-0001");
        assert_eq!(vuln.to_string(), "DT-2024-0001 [high]");
    }

    #[test]
    fn vulnerability_serde_skips_empty_options() {
        let vuln = Vulnerability::new("V-1", Severity::Low);
        let json = serde_json::to_string(&vuln).unwrap();
        assert!(!json.contains("cve"));
        let back: Vulnerability = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vuln);
    }
}
