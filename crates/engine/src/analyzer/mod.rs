//! 분석기 -- 생태계별 의존성 탐지기
//!
//! [`Analyzer`] trait은 각 생태계 분석기가 구현해야 하는 인터페이스입니다.
//! 분석기는 디렉토리 그룹 중 자기 필터에 맞는 파일만 받아 의존성 그래프 조각을
//! [`Emitter`]로 방출합니다.
//!
//! # Trait 구조
//!
//! - [`Analyzer`]: 구현용 trait (RPITIT async 메서드, 정적 디스패치)
//! - [`DynAnalyzer`]: 동적 디스패치 trait (`BoxFuture` 반환, `Arc<dyn DynAnalyzer>`로 저장)
//!
//! `Analyzer`를 구현하면 blanket implementation으로 `DynAnalyzer`가 자동 구현됩니다.
//!
//! # 결과
//!
//! `detect`는 [`Detection::Complete`], [`Detection::Partial`] 또는 `Err`(결함)를 반환합니다.
//! 결함과 패닉은 호출 단위로 격리되어 태스크 결과에 영향을 주지 않습니다.
//!
//! # 내장 분석기
//!
//! - `package-lock.json` (v2/v3) -- [`NpmLockAnalyzer`]
//! - `Cargo.lock` -- [`CargoLockAnalyzer`]

pub mod cargo;
pub mod npm;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::graph::DepGraph;
use crate::types::{File, Language};

pub use cargo::CargoLockAnalyzer;
pub use npm::NpmLockAnalyzer;

/// 박싱된 Future 타입 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 분석기 호출 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// 맡은 파일을 모두 처리함
    Complete,
    /// 일부만 처리함 (사유)
    Partial(String),
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Partial(reason) => write!(f, "partial: {reason}"),
        }
    }
}

/// 분석기가 방출한 의존성 그래프 조각 하나
#[derive(Debug, Clone)]
pub struct Emission {
    /// 방출한 분석기 이름
    pub analyzer: Arc<str>,
    /// 분석기 생태계 태그
    pub language: Language,
    /// 조각이 발견된 파일
    pub file: File,
    /// 루트 조각 (빌드 전)
    pub root: DepGraph,
}

/// 조각 방출기
///
/// 태스크마다 하나의 bounded 큐로 이어지며, 오케스트레이터가 유일한 소비자입니다.
/// 복제해서 분석기 내부의 동시 작업에 나눠줄 수 있습니다.
#[derive(Clone)]
pub struct Emitter {
    analyzer: Arc<str>,
    language: Language,
    tx: mpsc::Sender<Emission>,
}

impl Emitter {
    /// 새 방출기를 생성합니다.
    pub fn new(analyzer: Arc<str>, language: Language, tx: mpsc::Sender<Emission>) -> Self {
        Self {
            analyzer,
            language,
            tx,
        }
    }

    /// 파일 하나에서 찾은 루트 조각들을 방출합니다.
    ///
    /// 큐가 가득 차면 대기하며, 태스크가 종료 중일 때만 실패합니다.
    pub async fn emit(
        &self,
        file: &File,
        roots: impl IntoIterator<Item = DepGraph>,
    ) -> Result<(), EngineError> {
        for root in roots {
            let emission = Emission {
                analyzer: Arc::clone(&self.analyzer),
                language: self.language,
                file: file.clone(),
                root,
            };
            self.tx
                .send(emission)
                .await
                .map_err(|_| EngineError::Channel("task is shutting down".to_owned()))?;
        }
        Ok(())
    }

    /// 방출기가 속한 분석기 이름
    pub fn analyzer(&self) -> &str {
        &self.analyzer
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("analyzer", &self.analyzer)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// 생태계 분석기 trait
///
/// # 구현 예시
///
/// ```ignore
/// struct MyAnalyzer;
///
/// impl Analyzer for MyAnalyzer {
///     fn name(&self) -> &str { "my-analyzer" }
///     fn language(&self) -> Language { Language::Python }
///     fn filter(&self, relpath: &str) -> bool { relpath.ends_with("requirements.txt") }
///
///     async fn detect(
///         &self,
///         cancel: &CancellationToken,
///         parent: &File,
///         files: &[File],
///         emit: &Emitter,
///     ) -> Result<Detection, EngineError> {
///         Ok(Detection::Complete)
///     }
/// }
/// ```
pub trait Analyzer: Send + Sync {
    /// 분석기 이름 (레지스트리 키, 로그 문맥)
    fn name(&self) -> &str;

    /// 방출하는 노드에 찍힐 생태계 태그
    fn language(&self) -> Language;

    /// 상대 경로의 파일을 이 분석기가 처리하는지 판단합니다.
    fn filter(&self, relpath: &str) -> bool;

    /// 필터에 맞는 파일들에서 의존성을 탐지합니다.
    ///
    /// `files`는 같은 디렉토리에서 이 분석기 필터를 통과한 파일만 담습니다.
    /// 긴 작업은 `cancel`을 확인해 빠르게 빠져나가야 합니다.
    fn detect(
        &self,
        cancel: &CancellationToken,
        parent: &File,
        files: &[File],
        emit: &Emitter,
    ) -> impl Future<Output = Result<Detection, EngineError>> + Send;
}

/// dyn-compatible 분석기 trait
///
/// [`Analyzer`]를 구현하면 자동으로 구현됩니다.
/// [`AnalyzerSet`]이 `Arc<dyn DynAnalyzer>`로 분석기를 저장할 때 사용합니다.
pub trait DynAnalyzer: Send + Sync {
    /// 분석기 이름
    fn name(&self) -> &str;

    /// 생태계 태그
    fn language(&self) -> Language;

    /// 파일 필터
    fn filter(&self, relpath: &str) -> bool;

    /// 의존성 탐지
    fn detect<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        parent: &'a File,
        files: &'a [File],
        emit: &'a Emitter,
    ) -> BoxFuture<'a, Result<Detection, EngineError>>;
}

impl<T: Analyzer> DynAnalyzer for T {
    fn name(&self) -> &str {
        Analyzer::name(self)
    }

    fn language(&self) -> Language {
        Analyzer::language(self)
    }

    fn filter(&self, relpath: &str) -> bool {
        Analyzer::filter(self, relpath)
    }

    fn detect<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        parent: &'a File,
        files: &'a [File],
        emit: &'a Emitter,
    ) -> BoxFuture<'a, Result<Detection, EngineError>> {
        Box::pin(Analyzer::detect(self, cancel, parent, files, emit))
    }
}

/// 분석기 레지스트리
///
/// 오케스트레이터에 명시적으로 전달되는 분석기 집합입니다.
/// 등록 순서가 디스패치 순서입니다.
#[derive(Clone, Default)]
pub struct AnalyzerSet {
    analyzers: Vec<Arc<dyn DynAnalyzer>>,
}

impl AnalyzerSet {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 내장 분석기를 모두 등록한 레지스트리를 생성합니다.
    pub fn builtin() -> Self {
        Self {
            analyzers: vec![Arc::new(NpmLockAnalyzer), Arc::new(CargoLockAnalyzer)],
        }
    }

    /// 분석기를 등록합니다.
    ///
    /// # Errors
    ///
    /// 같은 이름이 이미 있으면 `EngineError::AlreadyRegistered`
    pub fn register(&mut self, analyzer: Arc<dyn DynAnalyzer>) -> Result<(), EngineError> {
        let name = analyzer.name().to_owned();
        if self.analyzers.iter().any(|a| a.name() == name) {
            return Err(EngineError::AlreadyRegistered { name });
        }
        self.analyzers.push(analyzer);
        Ok(())
    }

    /// 분석기 등록을 해제하고 반환합니다.
    pub fn unregister(&mut self, name: &str) -> Result<Arc<dyn DynAnalyzer>, EngineError> {
        let pos = self.analyzers.iter().position(|a| a.name() == name);
        match pos {
            Some(idx) => Ok(self.analyzers.remove(idx)),
            None => Err(EngineError::UnknownAnalyzer {
                name: name.to_owned(),
            }),
        }
    }

    /// 이름으로 분석기를 조회합니다.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DynAnalyzer>> {
        self.analyzers.iter().find(|a| a.name() == name).cloned()
    }

    /// 등록된 분석기 이름 목록 (등록 순)
    pub fn list(&self) -> Vec<&str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    /// 이름 목록에 해당하는 분석기만 담은 부분 집합을 만듭니다.
    ///
    /// 빈 목록이면 전체 사본을 반환합니다. 순서는 이 레지스트리의 등록 순을 따릅니다.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<AnalyzerSet, EngineError> {
        if names.is_empty() {
            return Ok(self.clone());
        }
        if let Some(unknown) = names
            .iter()
            .map(AsRef::as_ref)
            .find(|name| self.get(name).is_none())
        {
            return Err(EngineError::UnknownAnalyzer {
                name: unknown.to_owned(),
            });
        }
        Ok(Self {
            analyzers: self
                .analyzers
                .iter()
                .filter(|a| names.iter().any(|n| n.as_ref() == a.name()))
                .cloned()
                .collect(),
        })
    }

    /// 등록된 분석기 수
    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    /// 비어 있는지 확인
    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// 분석기를 등록 순으로 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DynAnalyzer>> {
        self.analyzers.iter()
    }

    /// 어느 분석기든 이 파일을 처리하는지 확인합니다.
    pub fn any_accepts(&self, relpath: &str) -> bool {
        self.analyzers.iter().any(|a| a.filter(relpath))
    }
}

impl fmt::Debug for AnalyzerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerSet")
            .field("analyzers", &self.list())
            .finish()
    }
}

/// 상대 경로의 마지막 요소
pub(crate) fn file_name(relpath: &str) -> &str {
    relpath.rsplit('/').next().unwrap_or(relpath)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    struct Stub(&'static str);

    impl Analyzer for Stub {
        fn name(&self) -> &str {
            self.0
        }

        fn language(&self) -> Language {
            Language::Python
        }

        fn filter(&self, relpath: &str) -> bool {
            relpath.ends_with(".stub")
        }

        async fn detect(
            &self,
            _cancel: &CancellationToken,
            _parent: &File,
            files: &[File],
            emit: &Emitter,
        ) -> Result<Detection, EngineError> {
            for file in files {
                emit.emit(file, [DepGraph::new(Node::new(file.name(), "1"))])
                    .await?;
            }
            Ok(Detection::Complete)
        }
    }

    #[test]
    fn builtin_registers_bundled_analyzers() {
        let set = AnalyzerSet::builtin();
        assert_eq!(set.list(), vec!["npm-lock", "cargo-lock"]);
        assert!(set.any_accepts("app/Cargo.lock"));
        assert!(set.any_accepts("app/package-lock.json"));
        assert!(!set.any_accepts("app/README.md"));
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut set = AnalyzerSet::new();
        set.register(Arc::new(Stub("a"))).unwrap();
        let err = set.register(Arc::new(Stub("a"))).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRegistered { .. }));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn unregister_removes_by_name() {
        let mut set = AnalyzerSet::new();
        set.register(Arc::new(Stub("a"))).unwrap();
        set.register(Arc::new(Stub("b"))).unwrap();
        let removed = set.unregister("a").unwrap();
        assert_eq!(removed.name(), "a");
        assert_eq!(set.list(), vec!["b"]);
        assert!(set.unregister("a").is_err());
    }

    #[test]
    fn select_keeps_registration_order() {
        let mut set = AnalyzerSet::new();
        for name in ["a", "b", "c"] {
            set.register(Arc::new(Stub(name))).unwrap();
        }
        let subset = set.select(&["c", "a"]).unwrap();
        assert_eq!(subset.list(), vec!["a", "c"]);

        let all = set.select::<&str>(&[]).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn select_rejects_unknown_names() {
        let set = AnalyzerSet::builtin();
        let err = set.select(&["maven"]).unwrap_err();
        assert!(matches!(err, EngineError::UnknownAnalyzer { name } if name == "maven"));
    }

    #[tokio::test]
    async fn dyn_dispatch_emits_through_queue() {
        let (tx, mut rx) = mpsc::channel(4);
        let analyzer: Arc<dyn DynAnalyzer> = Arc::new(Stub("stub"));
        let emitter = Emitter::new(Arc::from("stub"), analyzer.language(), tx);
        let parent = File::new("app", "/tmp", 0);
        let files = vec![File::new("app/x.stub", "/tmp/x.stub", 1)];

        let outcome = analyzer
            .detect(&CancellationToken::new(), &parent, &files, &emitter)
            .await
            .unwrap();
        assert_eq!(outcome, Detection::Complete);

        let emission = rx.recv().await.unwrap();
        assert_eq!(&*emission.analyzer, "stub");
        assert_eq!(emission.language, Language::Python);
        assert_eq!(emission.file.relpath(), "app/x.stub");
        assert_eq!(emission.root.root_node().name, "x.stub");
    }

    #[tokio::test]
    async fn emit_fails_when_queue_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let emitter = Emitter::new(Arc::from("stub"), Language::Rust, tx);
        let file = File::new("app/Cargo.lock", "/tmp/Cargo.lock", 0);
        let err = emitter
            .emit(&file, [DepGraph::placeholder()])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Channel(_)));
    }

    #[test]
    fn detection_display() {
        assert_eq!(Detection::Complete.to_string(), "complete");
        assert_eq!(
            Detection::Partial("1 file unreadable".to_owned()).to_string(),
            "partial: 1 file unreadable"
        );
    }
}
