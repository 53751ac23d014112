//! package-lock.json 분석기
//!
//! [`NpmLockAnalyzer`]는 NPM의 package-lock.json (v2/v3) 파일을 파싱하여
//! 루트 프로젝트를 정점으로 하는 의존성 그래프 조각을 방출합니다.
//!
//! # package-lock.json v3 형식 예시
//!
//! ```json
//! {
//!   "name": "my-app",
//!   "lockfileVersion": 3,
//!   "packages": {
//!     "": { "name": "my-app", "version": "1.0.0", "dependencies": { "lodash": "^4.17.21" } },
//!     "node_modules/lodash": { "version": "4.17.21", "license": "MIT" }
//!   }
//! }
//! ```
//!
//! 의존성 이름은 Node의 모듈 해석 규칙대로 가장 가까운 `node_modules`부터 찾습니다.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Analyzer, Detection, Emitter, file_name};
use crate::error::EngineError;
use crate::graph::{DepGraph, Node, NodeId};
use crate::types::{File, Language};

const ANALYZER_NAME: &str = "npm-lock";

/// package-lock.json 분석기
pub struct NpmLockAnalyzer;

/// package-lock.json 구조 (파싱용)
#[derive(Deserialize)]
struct NpmLockFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default, rename = "lockfileVersion")]
    lockfile_version: Option<u32>,
    #[serde(default)]
    packages: BTreeMap<String, NpmPackageEntry>,
}

/// package-lock.json 내 개별 패키지 (파싱용)
#[derive(Deserialize, Default)]
struct NpmPackageEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    license: Option<serde_json::Value>,
    #[serde(default)]
    dev: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, String>,
}

impl NpmPackageEntry {
    /// 의존성 이름 (일반 -> 선택 -> 개발 순)
    fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .keys()
            .chain(self.optional_dependencies.keys())
            .chain(self.dev_dependencies.keys())
            .map(String::as_str)
    }

    fn license(&self) -> Option<&str> {
        match &self.license {
            Some(serde_json::Value::String(s)) => Some(s.as_str()),
            Some(serde_json::Value::Object(obj)) => obj.get("type").and_then(|t| t.as_str()),
            _ => None,
        }
    }
}

impl Analyzer for NpmLockAnalyzer {
    fn name(&self) -> &str {
        ANALYZER_NAME
    }

    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn filter(&self, relpath: &str) -> bool {
        file_name(relpath) == "package-lock.json"
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

            let content = match file.read_to_string_async().await {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %file, error = %e, "cannot read lockfile");
                    skipped.push(file.relpath().to_owned());
                    continue;
                }
            };

            match parse_lockfile(&content, file.relpath()) {
                Ok(Some(graph)) => {
                    debug!(file = %file, nodes = graph.len(), "package-lock parsed");
                    emit.emit(file, [graph]).await?;
                }
                Ok(None) => {
                    debug!(file = %file, "legacy lockfile without packages section, skipping");
                    skipped.push(file.relpath().to_owned());
                }
                Err(e) => {
                    warn!(file = %file, error = %e, "cannot parse lockfile");
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

/// package-lock.json 내용을 의존성 그래프 조각으로 변환합니다.
///
/// `packages` 섹션이 없는 v1 lockfile은 `Ok(None)`입니다.
pub(crate) fn parse_lockfile(content: &str, source: &str) -> Result<Option<DepGraph>, EngineError> {
    let lock: NpmLockFile = serde_json::from_str(content)
        .map_err(|e| EngineError::analyzer(ANALYZER_NAME, format!("{source}: {e}")))?;

    if lock.packages.is_empty() && lock.lockfile_version.unwrap_or(1) < 2 {
        return Ok(None);
    }

    let empty = NpmPackageEntry::default();
    let root_entry = lock.packages.get("").unwrap_or(&empty);
    let root_name = root_entry
        .name
        .clone()
        .or_else(|| lock.name.clone())
        .unwrap_or_default();
    let root_version = root_entry
        .version
        .clone()
        .or_else(|| lock.version.clone())
        .unwrap_or_default();

    let mut graph = DepGraph::new(Node::new(root_name, root_version));
    let mut ids: HashMap<&str, NodeId> = HashMap::new();
    ids.insert("", graph.root());
    let mut queue: VecDeque<&str> = VecDeque::from([""]);

    while let Some(key) = queue.pop_front() {
        let entry = lock.packages.get(key).unwrap_or(&empty);
        let parent = ids[key];

        for dep in entry.dependency_names() {
            let Some(dep_key) = resolve(&lock.packages, key, dep) else {
                debug!(source, from = key, dep, "unresolved dependency");
                continue;
            };
            let child = match ids.get(dep_key) {
                Some(id) => *id,
                None => {
                    let Some(dep_entry) = lock.packages.get(dep_key) else {
                        continue;
                    };
                    let id = graph.add_node(package_node(dep_key, dep_entry, key.is_empty()));
                    ids.insert(dep_key, id);
                    queue.push_back(dep_key);
                    id
                }
            };
            graph.add_child(parent, child);
        }
    }

    Ok(Some(graph))
}

fn package_node(key: &str, entry: &NpmPackageEntry, direct: bool) -> Node {
    let name = entry
        .name
        .clone()
        .unwrap_or_else(|| extract_package_name(key).to_owned());
    let mut node = Node::new(name, entry.version.clone().unwrap_or_default())
        .with_direct(direct)
        .with_develop(entry.dev);
    if let Some(license) = entry.license() {
        node = node.with_license(license);
    }
    node
}

/// `from` 위치에서 `dep`를 Node 모듈 해석 규칙으로 찾아 packages 키를 반환합니다.
fn resolve<'a>(
    packages: &'a BTreeMap<String, NpmPackageEntry>,
    from: &str,
    dep: &str,
) -> Option<&'a str> {
    let mut base = from;
    loop {
        let candidate = if base.is_empty() {
            format!("node_modules/{dep}")
        } else {
            format!("{base}/node_modules/{dep}")
        };
        if let Some((key, _)) = packages.get_key_value(&candidate) {
            return Some(key.as_str());
        }
        if base.is_empty() {
            return None;
        }
        base = base.rfind("/node_modules/").map_or("", |pos| &base[..pos]);
    }
}

/// "node_modules/@scope/name" 또는 "node_modules/name" 에서 패키지명 추출
fn extract_package_name(key: &str) -> &str {
    match key.rfind("node_modules/") {
        Some(pos) => &key[pos + "node_modules/".len()..],
        None => key,
    }
}
