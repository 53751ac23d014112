//! Cargo.lock 분석기
//!
//! [`CargoLockAnalyzer`]는 `Cargo.lock`의 `[[package]]` 테이블을 파싱하여
//! 워크스페이스 멤버(`source`가 없는 패키지)마다 의존성 그래프 조각을 방출합니다.
//!
//! # Cargo.lock 형식 예시
//!
//! ```toml
//! version = 3
//!
//! [[package]]
//! name = "my-app"
//! version = "0.1.0"
//! dependencies = ["serde", "log 0.4.22"]
//!
//! [[package]]
//! name = "serde"
//! version = "1.0.204"
//! source = "registry+https://github.com/rust-lang/crates.io-index"
//! ```

use std::collections::{HashMap, VecDeque};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Analyzer, Detection, Emitter, file_name};
use crate::error::EngineError;
use crate::graph::{DepGraph, Node, NodeId};
use crate::types::{File, Language};

const ANALYZER_NAME: &str = "cargo-lock";

/// Cargo.lock 분석기
pub struct CargoLockAnalyzer;

/// Cargo.lock 구조 (파싱용)
#[derive(Deserialize)]
struct CargoLockFile {
    #[serde(default)]
    package: Vec<CargoPackage>,
}

/// Cargo.lock 내 개별 패키지 (파싱용)
#[derive(Deserialize)]
struct CargoPackage {
    name: String,
    version: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

impl Analyzer for CargoLockAnalyzer {
    fn name(&self) -> &str {
        ANALYZER_NAME
    }

    fn language(&self) -> Language {
        Language::Rust
    }

    fn filter(&self, relpath: &str) -> bool {
        file_name(relpath) == "Cargo.lock"
    }

    async fn detect(
        &self,
        cancel: &CancellationToken,
        _parent: &File,
        files: &[File],
        emit: &Emitter,
    ) -> Result<Detection, EngineError> {
        let mut skipped = Vec::new();

        for file in files {
            if cancel.is_cancelled() {
                return Ok(Detection::Partial("cancelled".to_owned()));
            }

            let parsed = file
                .read_to_string_async()
                .await
                .and_then(|content| parse_lockfile(&content, file.relpath()));
            match parsed {
                Ok(roots) => {
                    debug!(file = %file, roots = roots.len(), "Cargo.lock parsed");
                    emit.emit(file, roots).await?;
                }
                Err(e) => {
                    warn!(file = %file, error = %e, "cannot analyze Cargo.lock");
                    skipped.push(file.relpath().to_owned());
                }
            }
        }

        if skipped.is_empty() {
            Ok(Detection::Complete)
        } else {
            Ok(Detection::Partial(format!("skipped: {}", skipped.join(", "))))
        }
    }
}

/// Cargo.lock 내용을 워크스페이스 멤버별 조각으로 변환합니다.
///
/// 멤버를 찾을 수 없으면 플레이스홀더 루트 아래 모든 패키지를 둔 조각 하나를 반환합니다.
pub(crate) fn parse_lockfile(content: &str, source: &str) -> Result<Vec<DepGraph>, EngineError> {
    let lock: CargoLockFile = toml::from_str(content)
        .map_err(|e| EngineError::analyzer(ANALYZER_NAME, format!("{source}: {e}")))?;

    let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, pkg) in lock.package.iter().enumerate() {
        by_name.entry(pkg.name.as_str()).or_default().push(idx);
    }

    let members: Vec<usize> = lock
        .package
        .iter()
        .enumerate()
        .filter(|(_, pkg)| pkg.source.is_none())
        .map(|(idx, _)| idx)
        .collect();

    if members.is_empty() {
        let mut graph = DepGraph::new(Node::placeholder());
        let root = graph.root();
        let all: Vec<usize> = (0..lock.package.len()).collect();
        let ids = expand(&lock.package, &by_name, &mut graph, &all, source);
        for idx in all {
            if let Some(id) = ids.get(&idx) {
                graph.add_child(root, *id);
            }
        }
        return Ok(vec![graph]);
    }

    Ok(members
        .iter()
        .map(|&member| {
            let pkg = &lock.package[member];
            let mut graph = DepGraph::new(Node::new(&pkg.name, &pkg.version));
            let root = graph.root();
            expand_from(&lock.package, &by_name, &mut graph, member, root, source);
            graph
        })
        .collect())
}

/// `start` 목록의 패키지를 모두 노드로 만들고 의존성 간선을 잇습니다.
fn expand(
    packages: &[CargoPackage],
    by_name: &HashMap<&str, Vec<usize>>,
    graph: &mut DepGraph,
    start: &[usize],
    source: &str,
) -> HashMap<usize, NodeId> {
    let mut ids = HashMap::new();
    for &idx in start {
        let pkg = &packages[idx];
        ids.insert(idx, graph.add_node(Node::new(&pkg.name, &pkg.version)));
    }
    for &idx in start {
        let parent = ids[&idx];
        for dep in &packages[idx].dependencies {
            match lookup(packages, by_name, dep).and_then(|child| ids.get(&child)) {
                Some(&child_id) => graph.add_child(parent, child_id),
                None => debug!(source, dep = dep.as_str(), "unresolved dependency"),
            }
        }
    }
    ids
}

/// 멤버 하나에서 도달 가능한 패키지를 너비 우선으로 펼칩니다.
fn expand_from(
    packages: &[CargoPackage],
    by_name: &HashMap<&str, Vec<usize>>,
    graph: &mut DepGraph,
    member: usize,
    root: NodeId,
    source: &str,
) {
    let mut ids: HashMap<usize, NodeId> = HashMap::from([(member, root)]);
    let mut queue = VecDeque::from([member]);

    while let Some(idx) = queue.pop_front() {
        let parent = ids[&idx];
        for dep in &packages[idx].dependencies {
            let Some(child) = lookup(packages, by_name, dep) else {
                debug!(source, dep = dep.as_str(), "unresolved dependency");
                continue;
            };
            let child_id = match ids.get(&child) {
                Some(id) => *id,
                None => {
                    let pkg = &packages[child];
                    let node = Node::new(&pkg.name, &pkg.version).with_direct(idx == member);
                    let id = graph.add_node(node);
                    ids.insert(child, id);
                    queue.push_back(child);
                    id
                }
            };
            graph.add_child(parent, child_id);
        }
    }
}

/// 의존성 문자열 `name`, `name version`, `name version (source)`를 패키지 인덱스로 해석합니다.
fn lookup(
    packages: &[CargoPackage],
    by_name: &HashMap<&str, Vec<usize>>,
    dep: &str,
) -> Option<usize> {
    let mut parts = dep.split_whitespace();
    let name = parts.next()?;
    let version = parts.next();
    let candidates = by_name.get(name)?;
    match version {
        Some(version) => candidates
            .iter()
            .copied()
            .find(|&idx| packages[idx].version == version),
        None => candidates.first().copied(),
    }
}
