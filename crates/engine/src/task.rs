//! 태스크 오케스트레이터 -- 순회, 분석기 디스패치, 결과 수집
//!
//! [`TaskRunner::run_task`]는 데이터 소스 하나를 끝까지 처리하여 [`TaskResult`]를 반환합니다.
//!
//! # 처리 흐름
//!
//! ```text
//! Walker --(DirectoryGroup, bounded)--> Orchestrator --spawn--> Analyzer x N
//!                                            ^                      |
//!                                            +---(Emission, bounded)+
//! ```
//!
//! 1. 순회기는 블로킹 스레드에서 디렉토리 그룹을 만들어 그룹 큐로 보냅니다.
//! 2. 오케스트레이터는 그룹을 하나씩 꺼내, 필터에 맞는 파일이 있는 분석기마다
//!    정확히 그 부분 집합으로 분석 태스크를 띄웁니다 (그룹 내에서는 동시 실행).
//! 3. 분석기는 [`Emitter`]로 조각을 방출하고, 오케스트레이터가 유일한 소비자로서
//!    조각을 빌드하고 결과에 추가합니다.
//!
//! # 격리와 취소
//!
//! - 분석기의 `Err`와 패닉은 호출 단위로 잡혀 로그와 `analyzer_faults`에만 남습니다.
//! - 데드라인 또는 호출자 토큰이 발동하면 새 그룹을 받지 않고, 실행 중인 분석기에
//!   `cancel_grace_ms` 동안 정리할 시간을 준 뒤 중단합니다. 순회기는 더 기다리지 않습니다.
//! - 이미 방출된 조각은 유지됩니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use deptrace_core::metrics as m;

use crate::analyzer::{AnalyzerSet, Detection, Emission, Emitter};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::{DepGraph, RiskSummary};
use crate::types::{DirectoryGroup, File};
use crate::walk::{AcceptFn, ArchiveFilter, ExtractFilter, WalkOptions, Walker};

/// 빌드된 조각마다 동기적으로 호출되는 결과 콜백
pub type ResultCallback = Arc<dyn Fn(&File, &DepGraph) + Send + Sync>;

/// 데드라인이 없을 때 쓰는 먼 미래 (30년)
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 86_400);

/// 태스크 인자
///
/// 시작 이후에는 읽기 전용입니다.
#[derive(Clone, Default)]
pub struct TaskArg {
    /// 데이터 소스 (경로, `file://`, `http(s)://`)
    pub origin: String,
    /// 표시 이름. 없으면 데이터 소스의 마지막 경로 요소
    pub name: Option<String>,
    /// 타임아웃. 없으면 엔진 설정의 기본값, 0이면 무제한
    pub timeout: Option<Duration>,
    /// 사용할 분석기 이름. 비어 있으면 등록된 전체
    pub analyzers: Vec<String>,
    /// 압축 해제 필터. 없으면 [`ArchiveFilter`]
    pub extract_filter: Option<Arc<dyn ExtractFilter>>,
    /// 결과 콜백
    pub callback: Option<ResultCallback>,
}

impl TaskArg {
    /// 데이터 소스로 인자를 생성합니다.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    /// 표시 이름을 지정합니다.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 타임아웃을 지정합니다. 0이면 무제한입니다.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 사용할 분석기를 지정합니다.
    pub fn with_analyzers(mut self, names: Vec<String>) -> Self {
        self.analyzers = names;
        self
    }

    /// 압축 해제 필터를 교체합니다.
    pub fn with_extract_filter(mut self, filter: Arc<dyn ExtractFilter>) -> Self {
        self.extract_filter = Some(filter);
        self
    }

    /// 결과 콜백을 지정합니다.
    pub fn with_callback(mut self, callback: ResultCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl fmt::Debug for TaskArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskArg")
            .field("origin", &self.origin)
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("analyzers", &self.analyzers)
            .field("extract_filter", &self.extract_filter.is_some())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// 태스크 결과
///
/// 실행 중에는 오케스트레이터만 수정하며, 반환 이후에는 불변입니다.
#[derive(Debug)]
pub struct TaskResult {
    /// 태스크 ID
    pub task_id: Uuid,
    /// 표시 이름
    pub name: String,
    /// 데이터 소스
    pub origin: String,
    /// 결과 콜백 호출 수
    pub file_count: usize,
    /// 순회한 디스크 파일 크기 합계 (바이트)
    pub size: u64,
    /// 빌드된 루트 조각 (수신 순)
    pub deps: Vec<DepGraph>,
    /// 순회 수준의 치명적 실패
    pub error: Option<EngineError>,
    /// 시작 시각
    pub start: SystemTime,
    /// 종료 시각
    pub end: SystemTime,
    /// 격리된 분석기 결함(에러/패닉) 수
    pub analyzer_faults: usize,
    /// 건너뛴 중첩 컨테이너 수
    pub extraction_failures: usize,
}

impl TaskResult {
    fn new(name: String, origin: String) -> Self {
        let now = SystemTime::now();
        Self {
            task_id: Uuid::new_v4(),
            name,
            origin,
            file_count: 0,
            size: 0,
            deps: Vec::new(),
            error: None,
            start: now,
            end: now,
            analyzer_faults: 0,
            extraction_failures: 0,
        }
    }

    /// 치명적 실패 없이 끝났는지 확인합니다.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// 소요 시간
    pub fn elapsed(&self) -> Duration {
        self.end.duration_since(self.start).unwrap_or_default()
    }

    /// 모든 조각을 플레이스홀더 루트 아래 하나의 그래프로 통합합니다.
    pub fn graph(&self) -> DepGraph {
        DepGraph::unify(&self.deps)
    }

    /// 통합 그래프의 위험도 요약
    pub fn summary(&self) -> RiskSummary {
        self.graph().risk_summary()
    }
}

/// 태스크 실행기
///
/// 엔진 설정과 분석기 레지스트리를 묶어 태스크를 실행합니다.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    config: EngineConfig,
    analyzers: AnalyzerSet,
}

/// [`TaskRunner`] 빌더
#[derive(Default)]
pub struct TaskRunnerBuilder {
    config: Option<EngineConfig>,
    analyzers: Option<AnalyzerSet>,
}

impl TaskRunnerBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 분석기 레지스트리를 지정합니다. 지정하지 않으면 [`AnalyzerSet::builtin`]
    pub fn analyzers(mut self, analyzers: AnalyzerSet) -> Self {
        self.analyzers = Some(analyzers);
        self
    }

    /// 설정을 검증하고 실행기를 빌드합니다.
    ///
    /// 설정에 분석기 이름 목록이 있으면 레지스트리를 그 부분 집합으로 좁힙니다.
    ///
    /// # Errors
    ///
    /// - 설정 검증 실패 시 `EngineError::Config`
    /// - 알 수 없는 분석기 이름이면 `EngineError::UnknownAnalyzer`
    pub fn build(self) -> Result<TaskRunner, EngineError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let analyzers = self
            .analyzers
            .unwrap_or_else(AnalyzerSet::builtin)
            .select(&config.analyzers)?;
        Ok(TaskRunner { config, analyzers })
    }
}

/// 실행 중인 분석기 호출 정보
struct Invocation {
    analyzer: String,
    parent: String,
}

impl TaskRunner {
    /// 빌더를 생성합니다.
    pub fn builder() -> TaskRunnerBuilder {
        TaskRunnerBuilder::new()
    }

    /// 엔진 설정
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 분석기 레지스트리
    pub fn analyzers(&self) -> &AnalyzerSet {
        &self.analyzers
    }

    /// 태스크를 실행합니다.
    ///
    /// 치명적 실패는 `TaskResult::error`로만 보고되며, 이 함수는 실패하지 않습니다.
    pub async fn run_task(&self, cancel: &CancellationToken, arg: TaskArg) -> TaskResult {
        let started = Instant::now();
        let name = arg
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_name(&arg.origin));
        let mut result = TaskResult::new(name, arg.origin.clone());

        info!(task_id = %result.task_id, name = %result.name, origin = %result.origin, "task started");

        match self.analyzers.select(&arg.analyzers) {
            Ok(analyzers) => self.drive(cancel, &arg, analyzers, &mut result).await,
            Err(e) => {
                warn!(task_id = %result.task_id, error = %e, "invalid analyzer selection");
                result.error = Some(e);
            }
        }

        result.end = SystemTime::now();
        let outcome = match &result.error {
            None => "ok",
            Some(EngineError::Cancelled) => "cancelled",
            Some(_) => "failed",
        };
        metrics::counter!(m::TASK_RUNS_TOTAL, m::LABEL_OUTCOME => outcome).increment(1);
        metrics::histogram!(m::TASK_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        info!(
            task_id = %result.task_id,
            outcome,
            files = result.file_count,
            fragments = result.deps.len(),
            size = result.size,
            analyzer_faults = result.analyzer_faults,
            extraction_failures = result.extraction_failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "task finished"
        );
        result
    }

    async fn drive(
        &self,
        cancel: &CancellationToken,
        arg: &TaskArg,
        analyzers: AnalyzerSet,
        result: &mut TaskResult,
    ) {
        let token = cancel.child_token();
        let timeout = match arg.timeout {
            Some(timeout) => (!timeout.is_zero()).then_some(timeout),
            None => self.config.timeout(),
        };
        let has_deadline = timeout.is_some();
        let deadline = tokio::time::sleep_until(Instant::now() + timeout.unwrap_or(FAR_FUTURE));
        tokio::pin!(deadline);

        let extract: Arc<dyn ExtractFilter> = arg
            .extract_filter
            .clone()
            .unwrap_or_else(|| Arc::new(ArchiveFilter));
        let accept: AcceptFn = {
            let extract = Arc::clone(&extract);
            let analyzers = analyzers.clone();
            Arc::new(move |relpath: &str| {
                extract.is_container(relpath) || analyzers.any_accepts(relpath)
            })
        };
        let walker = Walker::new(result.name.clone(), WalkOptions::from(&self.config))
            .with_extract_filter(extract)
            .with_accept(accept);
        let stats = walker.stats();

        let (group_tx, mut group_rx) = mpsc::channel(self.config.group_queue_capacity);
        let (frag_tx, mut frag_rx) = mpsc::channel(self.config.emit_queue_capacity);

        let mut walk = {
            let token = token.clone();
            let origin = arg.origin.clone();
            tokio::spawn(async move { walker.walk(&token, &origin, group_tx).await })
        };

        let callback = arg.callback.as_ref();
        let mut detections: JoinSet<Result<Detection, EngineError>> = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, Invocation> = HashMap::new();
        let mut walk_outcome: Option<Result<u64, EngineError>> = None;
        let mut groups_open = true;
        let mut groups_received = 0usize;
        let mut cancelled_at: Option<Instant> = None;

        loop {
            if cancelled_at.is_some() {
                if detections.is_empty() {
                    break;
                }
            } else if walk_outcome.is_some() && !groups_open && detections.is_empty() {
                break;
            }

            let grace_end = cancelled_at.map_or_else(
                || Instant::now() + FAR_FUTURE,
                |at| at + self.config.cancel_grace(),
            );

            tokio::select! {
                biased;

                Some(emission) = frag_rx.recv() => {
                    accept_emission(result, emission, callback);
                }

                _ = token.cancelled(), if cancelled_at.is_none() => {
                    info!(task_id = %result.task_id, running = detections.len(), "task cancelled");
                    cancelled_at = Some(Instant::now());
                }

                _ = &mut deadline, if has_deadline && cancelled_at.is_none() => {
                    warn!(task_id = %result.task_id, timeout = ?timeout, "task deadline reached");
                    token.cancel();
                    cancelled_at = Some(Instant::now());
                }

                Some(joined) = detections.join_next_with_id(), if !detections.is_empty() => {
                    match joined {
                        Ok((id, outcome)) => {
                            let invocation = running.remove(&id);
                            record_outcome(result, invocation, outcome);
                        }
                        Err(join_err) => {
                            let invocation = running.remove(&join_err.id());
                            record_join_error(result, invocation, join_err);
                        }
                    }
                }

                joined = &mut walk, if walk_outcome.is_none() => {
                    walk_outcome = Some(joined.unwrap_or_else(|e| {
                        Err(EngineError::Channel(format!("walk task failed: {e}")))
                    }));
                }

                group = group_rx.recv(), if groups_open && detections.is_empty() && cancelled_at.is_none() => {
                    match group {
                        Some(group) => {
                            groups_received += 1;
                            dispatch(&analyzers, &token, &frag_tx, group, &mut detections, &mut running);
                        }
                        None => groups_open = false,
                    }
                }

                _ = tokio::time::sleep_until(grace_end), if cancelled_at.is_some() => {
                    warn!(
                        task_id = %result.task_id,
                        aborted = detections.len(),
                        "cancel grace elapsed, aborting analyzers"
                    );
                    detections.abort_all();
                    break;
                }
            }
        }

        if walk_outcome.is_none() {
            walk.abort();
        }

        // 이미 방출된 조각은 유지
        drop(frag_tx);
        while let Ok(emission) = frag_rx.try_recv() {
            accept_emission(result, emission, callback);
        }

        result.size = stats.size();
        result.extraction_failures = stats.extraction_failures();
        let cancelled = cancelled_at.is_some() || token.is_cancelled();
        result.error = match walk_outcome {
            Some(Ok(_)) => None,
            Some(Err(EngineError::Cancelled)) | None if cancelled => {
                // 그룹이 하나라도 나왔으면 부분 결과로 간주
                (groups_received == 0).then_some(EngineError::Cancelled)
            }
            Some(Err(e)) => Some(e),
            None => None,
        };
    }
}

/// 그룹의 파일을 분석기별 부분 집합으로 나눠 분석 태스크를 띄웁니다.
fn dispatch(
    analyzers: &AnalyzerSet,
    token: &CancellationToken,
    frag_tx: &mpsc::Sender<Emission>,
    group: DirectoryGroup,
    detections: &mut JoinSet<Result<Detection, EngineError>>,
    running: &mut HashMap<tokio::task::Id, Invocation>,
) {
    for analyzer in analyzers.iter() {
        let files: Vec<File> = group
            .files
            .iter()
            .filter(|f| analyzer.filter(f.relpath()))
            .cloned()
            .collect();
        if files.is_empty() {
            continue;
        }

        debug!(
            analyzer = analyzer.name(),
            parent = %group.parent,
            files = files.len(),
            "analyzer dispatched"
        );

        let analyzer = Arc::clone(analyzer);
        let emitter = Emitter::new(Arc::from(analyzer.name()), analyzer.language(), frag_tx.clone());
        let parent = group.parent.clone();
        let token = token.clone();
        let invocation = Invocation {
            analyzer: analyzer.name().to_owned(),
            parent: parent.relpath().to_owned(),
        };

        let handle = detections.spawn(async move {
            analyzer.detect(&token, &parent, &files, &emitter).await
        });
        running.insert(handle.id(), invocation);
    }
}

/// 방출된 조각을 빌드하고 결과에 추가합니다.
fn accept_emission(result: &mut TaskResult, emission: Emission, callback: Option<&ResultCallback>) {
    let Emission {
        analyzer,
        language,
        file,
        mut root,
    } = emission;

    let deps = root.dfs_order().len();
    info!(file = %file, deps, language = %language, analyzer = %analyzer, "fragment received");

    root.build(false, language);
    if root.root_node().path.is_none() {
        root.root_node_mut().path = Some(file.relpath().to_owned());
    }
    metrics::counter!(m::ANALYZER_FRAGMENTS_TOTAL, m::LABEL_LANGUAGE => language.to_string())
        .increment(1);

    if let Some(callback) = callback {
        callback(&file, &root);
        result.file_count += 1;
    }
    result.deps.push(root);
}

fn record_outcome(
    result: &mut TaskResult,
    invocation: Option<Invocation>,
    outcome: Result<Detection, EngineError>,
) {
    let (analyzer, parent) = invocation
        .map(|i| (i.analyzer, i.parent))
        .unwrap_or_default();
    let label = match &outcome {
        Ok(Detection::Complete) => {
            debug!(analyzer = %analyzer, parent = %parent, "analyzer finished");
            "complete"
        }
        Ok(Detection::Partial(reason)) => {
            info!(analyzer = %analyzer, parent = %parent, reason = %reason, "analyzer finished partially");
            "partial"
        }
        Err(e) => {
            result.analyzer_faults += 1;
            warn!(analyzer = %analyzer, parent = %parent, error = %e, "analyzer fault isolated");
            "fault"
        }
    };
    metrics::counter!(
        m::ANALYZER_INVOCATIONS_TOTAL,
        m::LABEL_ANALYZER => analyzer,
        m::LABEL_OUTCOME => label
    )
    .increment(1);
}

fn record_join_error(
    result: &mut TaskResult,
    invocation: Option<Invocation>,
    join_err: tokio::task::JoinError,
) {
    let (analyzer, parent) = invocation
        .map(|i| (i.analyzer, i.parent))
        .unwrap_or_default();
    if join_err.is_panic() {
        result.analyzer_faults += 1;
        error!(analyzer = %analyzer, parent = %parent, "analyzer panicked, fault isolated");
        metrics::counter!(
            m::ANALYZER_INVOCATIONS_TOTAL,
            m::LABEL_ANALYZER => analyzer,
            m::LABEL_OUTCOME => "panic"
        )
        .increment(1);
    } else {
        debug!(analyzer = %analyzer, parent = %parent, "analyzer aborted");
    }
}

/// 데이터 소스의 마지막 경로 요소를 표시 이름으로 씁니다.
pub(crate) fn default_name(origin: &str) -> String {
    let path = match origin.split_once("://") {
        Some((_, rest)) => rest.split(['?', '#']).next().unwrap_or(rest),
        None => origin,
    };
    let trimmed = path.trim_end_matches(['/', '\\']);
    match trimmed.rsplit(['/', '\\']).next() {
        Some(base) if !base.is_empty() => base.to_owned(),
        _ => ".".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name_uses_last_segment() {
        assert_eq!(default_name("/srv/app"), "app");
        assert_eq!(default_name("/srv/app/"), "app");
        assert_eq!(default_name("./"), ".");
        assert_eq!(default_name("release.tar.gz"), "release.tar.gz");
        assert_eq!(default_name("file:///srv/app.jar"), "app.jar");
        assert_eq!(
            default_name("https://example.com/dl/app-1.0.zip?sig=abc"),
            "app-1.0.zip"
        );
        assert_eq!(default_name("C:\\work\\proj"), "proj");
    }

    #[test]
    fn builder_defaults_to_builtin_analyzers() {
        let runner = TaskRunner::builder().build().unwrap();
        assert_eq!(runner.analyzers().list(), vec!["npm-lock", "cargo-lock"]);
    }

    #[test]
    fn builder_narrows_analyzers_from_config() {
        let config = EngineConfig {
            analyzers: vec!["cargo-lock".to_owned()],
            ..Default::default()
        };
        let runner = TaskRunner::builder().config(config).build().unwrap();
        assert_eq!(runner.analyzers().list(), vec!["cargo-lock"]);
    }

    #[test]
    fn builder_rejects_unknown_analyzer() {
        let config = EngineConfig {
            analyzers: vec!["maven".to_owned()],
            ..Default::default()
        };
        let err = TaskRunner::builder().config(config).build().unwrap_err();
        assert!(matches!(err, EngineError::UnknownAnalyzer { .. }));
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let config = EngineConfig {
            emit_queue_capacity: 0,
            ..Default::default()
        };
        assert!(TaskRunner::builder().config(config).build().is_err());
    }

    #[test]
    fn task_arg_builder() {
        let arg = TaskArg::new("/srv/app")
            .with_name("app")
            .with_timeout(Duration::from_secs(3))
            .with_analyzers(vec!["npm-lock".to_owned()]);
        assert_eq!(arg.origin, "/srv/app");
        assert_eq!(arg.name.as_deref(), Some("app"));
        assert_eq!(arg.timeout, Some(Duration::from_secs(3)));
        assert_eq!(arg.analyzers, vec!["npm-lock"]);
        assert!(format!("{arg:?}").contains("callback: false"));
    }

    #[test]
    fn empty_result_summary_is_zero() {
        let result = TaskResult::new("app".to_owned(), "/srv/app".to_owned());
        assert!(result.is_ok());
        assert_eq!(result.summary(), RiskSummary::default());
        assert!(result.graph().is_empty());
    }
}
