#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 타입 (`EngineError`)
//! - [`config`]: 엔진 설정 (`EngineConfig`, 빌더)
//! - [`types`]: 도메인 타입 (`Language`, `File`, `DirectoryGroup`)
//! - [`graph`]: 의존성 그래프 (`DepGraph`, `Node`, `RiskSummary`)
//! - [`walk`]: 파일 트리 순회와 압축 해제 (`Walker`, `ExtractFilter`)
//! - [`analyzer`]: 분석기 trait과 레지스트리 (`Analyzer`, `AnalyzerSet`, `Emitter`)
//! - [`task`]: 오케스트레이터 (`TaskRunner`, `TaskArg`, `TaskResult`)
//!
//! # Architecture
//!
//! ```text
//! origin --> Walker --> DirectoryGroup --> TaskRunner --> Analyzer x N
//!                                              ^               |
//!                                              +-- Emission ---+
//!                                              |
//!                                        DepGraph::build --> TaskResult.deps
//!                                                                 |
//!                                                   DepGraph::unify / RiskSummary
//! ```

pub mod analyzer;
pub mod config;
pub mod error;
pub mod graph;
pub mod task;
pub mod types;
pub mod walk;

// --- Public API Re-exports ---

// Orchestrator
pub use task::{ResultCallback, TaskArg, TaskResult, TaskRunner, TaskRunnerBuilder};

// Configuration
pub use config::{EngineConfig, EngineConfigBuilder};

// Error
pub use error::EngineError;

// Types
pub use types::{DirectoryGroup, File, Language};

// Graph
pub use graph::{DepGraph, DepKey, Node, NodeId, RiskSummary, SeverityCounts};

// Walker
pub use walk::{ArchiveFilter, ArchiveKind, ExtractFilter, WalkOptions, WalkStats, Walker};

// Analyzer
pub use analyzer::{
    Analyzer, AnalyzerSet, CargoLockAnalyzer, Detection, DynAnalyzer, Emission, Emitter,
    NpmLockAnalyzer,
};
