//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 익스포터 설치는 바이너리의 몫입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `deptrace_`
//! - 영역: `walk_`, `analyzer_`, `task_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(deptrace_core::metrics::WALK_FILES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 분석기 레이블 키
pub const LABEL_ANALYZER: &str = "analyzer";

/// 언어(생태계) 레이블 키
pub const LABEL_LANGUAGE: &str = "language";

/// 결과 레이블 키 (complete, partial, fault, panic)
pub const LABEL_OUTCOME: &str = "outcome";

// ─── Walker 메트릭 ──────────────────────────────────────────────────

/// Walker: 순회한 파일 수 (counter)
pub const WALK_FILES_TOTAL: &str = "deptrace_walk_files_total";

/// Walker: 생성한 디렉토리 그룹 수 (counter)
pub const WALK_GROUPS_TOTAL: &str = "deptrace_walk_groups_total";

/// Walker: 해제한 압축 컨테이너 수 (counter)
pub const WALK_CONTAINERS_EXTRACTED_TOTAL: &str = "deptrace_walk_containers_extracted_total";

/// Walker: 압축 해제 실패 수 (counter)
pub const WALK_EXTRACTION_FAILURES_TOTAL: &str = "deptrace_walk_extraction_failures_total";

// ─── Analyzer 메트릭 ────────────────────────────────────────────────

/// Analyzer: 분석기 호출 수 (counter, label: analyzer, outcome)
pub const ANALYZER_INVOCATIONS_TOTAL: &str = "deptrace_analyzer_invocations_total";

/// Analyzer: 방출된 의존성 그래프 조각 수 (counter, label: language)
pub const ANALYZER_FRAGMENTS_TOTAL: &str = "deptrace_analyzer_fragments_total";

// ─── Task 메트릭 ────────────────────────────────────────────────────

/// Task: 완료된 태스크 수 (counter, label: outcome)
pub const TASK_RUNS_TOTAL: &str = "deptrace_task_runs_total";

/// Task: 태스크 소요 시간 (histogram, 초)
pub const TASK_DURATION_SECONDS: &str = "deptrace_task_duration_seconds";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 익스포터를 설치한 뒤 한 번 호출합니다. 여러 번 호출해도 안전합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(WALK_FILES_TOTAL, "Files visited by the walker");
    describe_counter!(WALK_GROUPS_TOTAL, "Directory groups produced by the walker");
    describe_counter!(
        WALK_CONTAINERS_EXTRACTED_TOTAL,
        "Archive containers unpacked during the walk"
    );
    describe_counter!(
        WALK_EXTRACTION_FAILURES_TOTAL,
        "Archive containers that failed to unpack"
    );
    describe_counter!(
        ANALYZER_INVOCATIONS_TOTAL,
        "Analyzer detection invocations by outcome"
    );
    describe_counter!(
        ANALYZER_FRAGMENTS_TOTAL,
        "Dependency graph fragments emitted by analyzers"
    );
    describe_counter!(TASK_RUNS_TOTAL, "Detection tasks finished by outcome");
    describe_histogram!(
        TASK_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Wall-clock duration of detection tasks"
    );
}
