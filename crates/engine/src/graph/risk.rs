//! 위험도 요약 -- 컴포넌트/취약점 심각도별 집계
//!
//! 그래프를 방문 집합 기반으로 한 번 순회하며 식별 키마다 한 번씩 집계합니다.
//! 컴포넌트 위험도는 직접 부착된 취약점 중 가장 심각한 등급이며,
//! 취약점이 없으면 안전(5)입니다. 여러 컴포넌트가 공유하는 취약점은
//! 전역적으로 한 번만 셉니다.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use deptrace_core::types::Severity;

use super::DepGraph;

/// 심각도별 개수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    /// 치명적
    pub critical: usize,
    /// 높음
    pub high: usize,
    /// 중간
    pub medium: usize,
    /// 낮음
    pub low: usize,
    /// 안전 (컴포넌트 전용)
    pub safe: usize,
    /// 전체
    pub total: usize,
}

impl SeverityCounts {
    fn record(&mut self, severity: Option<Severity>) {
        match severity {
            Some(Severity::Critical) => self.critical += 1,
            Some(Severity::High) => self.high += 1,
            Some(Severity::Medium) => self.medium += 1,
            Some(Severity::Low) => self.low += 1,
            None => self.safe += 1,
        }
        self.total += 1;
    }
}

/// 위험도 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    /// 컴포넌트 위험도 분포
    pub components: SeverityCounts,
    /// 고유 취약점 심각도 분포
    pub vulnerabilities: SeverityCounts,
}

impl RiskSummary {
    /// 그래프를 한 번 순회하여 요약을 계산합니다.
    ///
    /// 플레이스홀더 노드는 집계에서 제외됩니다.
    pub fn from_graph(graph: &DepGraph) -> Self {
        let mut summary = Self::default();
        let mut seen_components = HashSet::new();
        let mut seen_vulns: HashSet<&str> = HashSet::new();

        for id in graph.dfs_order() {
            let node = graph.node(id);
            if node.is_placeholder() || !seen_components.insert(node.key()) {
                continue;
            }

            let mut risk: Option<Severity> = None;
            for vuln in &node.vulnerabilities {
                if seen_vulns.insert(vuln.id.as_str()) {
                    summary.vulnerabilities.record(Some(vuln.severity));
                }
                risk = Some(risk.map_or(vuln.severity, |r| r.min(vuln.severity)));
            }
            summary.components.record(risk);
        }

        summary
    }

    /// 취약한 컴포넌트가 하나라도 있는지 확인합니다.
    pub fn has_vulnerable_components(&self) -> bool {
        self.components.total > self.components.safe
    }
}

impl fmt::Display for RiskSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.components;
        let v = &self.vulnerabilities;
        writeln!(
            f,
            "Components:{} C:{} H:{} M:{} L:{}",
            c.total, c.critical, c.high, c.medium, c.low
        )?;
        write!(
            f,
            "Vulnerabilities:{} C:{} H:{} M:{} L:{}",
            v.total, v.critical, v.high, v.medium, v.low
        )
    }
}

#[cfg(test)]
mod tests {
    use deptrace_core::types::Vulnerability;

    use super::*;
    use crate::graph::Node;
    use crate::types::Language;

    #[test]
    fn empty_graph_has_zero_counts() {
        let summary = DepGraph::placeholder().risk_summary();
        assert_eq!(summary, RiskSummary::default());
        assert!(!summary.has_vulnerable_components());
    }

    #[test]
    fn component_risk_is_most_severe_vulnerability() {
        let mut graph = DepGraph::new(Node::placeholder());
        let a = graph.add_node(
            Node::new("a", "1")
                .with_vulnerability(Vulnerability::new("DT-1", Severity::Low))
                .with_vulnerability(Vulnerability::new("DT-2", Severity::High)),
        );
        let b = graph.add_node(Node::new("b", "1"));
        graph.add_child(graph.root(), a);
        graph.add_child(graph.root(), b);
        graph.build(false, Language::Rust);

        let summary = graph.risk_summary();
        assert_eq!(summary.components.total, 2);
        assert_eq!(summary.components.high, 1);
        assert_eq!(summary.components.safe, 1);
        assert_eq!(summary.vulnerabilities.total, 2);
        assert_eq!(summary.vulnerabilities.high, 1);
        assert_eq!(summary.vulnerabilities.low, 1);
        assert!(summary.has_vulnerable_components());
    }

    #[test]
    fn shared_vulnerability_counts_once_globally() {
        let shared = Vulnerability::new("DT-7", Severity::Critical);
        let mut graph = DepGraph::new(Node::placeholder());
        let a = graph.add_node(Node::new("a", "1").with_vulnerability(shared.clone()));
        let b = graph.add_node(Node::new("b", "1").with_vulnerability(shared));
        graph.add_child(graph.root(), a);
        graph.add_child(graph.root(), b);
        graph.build(false, Language::Rust);

        let summary = graph.risk_summary();
        assert_eq!(summary.components.critical, 2);
        assert_eq!(summary.vulnerabilities.total, 1);
        assert_eq!(summary.vulnerabilities.critical, 1);
    }

    #[test]
    fn cyclic_graph_counts_each_component_once() {
        let mut graph = DepGraph::new(Node::new("a", "1"));
        let b = graph.add_node(Node::new("b", "1"));
        let root = graph.root();
        graph.add_child(root, b);
        graph.add_child(b, root);
        graph.build(false, Language::Rust);

        assert_eq!(graph.risk_summary().components.total, 2);
    }

    #[test]
    fn display_format() {
        let summary = RiskSummary {
            components: SeverityCounts {
                critical: 1,
                high: 2,
                medium: 0,
                low: 1,
                safe: 6,
                total: 10,
            },
            vulnerabilities: SeverityCounts {
                critical: 1,
                high: 3,
                medium: 0,
                low: 1,
                safe: 0,
                total: 5,
            },
        };
        assert_eq!(
            summary.to_string(),
            "Components:10 C:1 H:2 M:0 L:1\nVulnerabilities:5 C:1 H:3 M:0 L:1"
        );
    }
}
