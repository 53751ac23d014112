//! 의존성 그래프 -- 아레나 기반 컴포넌트 그래프
//!
//! 분석기는 파일 하나에서 찾은 루트 컴포넌트마다 [`DepGraph`] 조각을 만들어 방출합니다.
//! 노드는 하나의 `Vec<Node>` 아레나에 저장되고 간선은 [`NodeId`] 인덱스로 표현되므로
//! 순환 의존성과 공유 하위 의존성을 소유권 문제 없이 표현할 수 있습니다.
//!
//! # 정규화
//!
//! [`DepGraph::build`]는 조각을 정규형으로 만듭니다:
//! 1. 생태계 태그가 없는 노드에 분석기 태그를 찍습니다 (루트 조각만).
//! 2. 식별 키(이름 + 생태계 + 버전)가 같은 노드를 병합합니다.
//! 3. 아레나를 압축하고 조각을 빌드 완료로 표시합니다.
//!
//! 이름이 빈 노드(플레이스홀더)는 식별 키로 병합되지 않습니다.
//!
//! # 사용 예시
//!
//! ```
//! use deptrace_engine::graph::{DepGraph, Node};
//! use deptrace_engine::types::Language;
//!
//! let mut graph = DepGraph::new(Node::new("app", "1.0.0"));
//! let serde = graph.add_node(Node::new("serde", "1.0.204"));
//! graph.add_child(graph.root(), serde);
//! graph.build(false, Language::Rust);
//!
//! assert!(graph.is_built());
//! assert_eq!(graph.node(serde).language, Language::Rust);
//! ```

pub mod risk;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use serde::{Deserialize, Serialize};

use deptrace_core::types::Vulnerability;

use crate::types::Language;

pub use risk::{RiskSummary, SeverityCounts};

/// 아레나 안의 노드 인덱스
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// 아레나 인덱스를 반환합니다.
    pub fn index(self) -> usize {
        self.0
    }
}

/// 컴포넌트 식별 키
///
/// 빌드 이후 그래프 안에서 유일합니다.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DepKey {
    /// 컴포넌트 이름
    pub name: String,
    /// 생태계
    pub language: Language,
    /// 버전
    pub version: String,
}

impl fmt::Display for DepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.version, self.language)
    }
}

/// 그래프 노드 (컴포넌트)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// 컴포넌트 이름. 비어 있으면 플레이스홀더
    pub name: String,
    /// 버전
    pub version: String,
    /// 공급자 / 네임스페이스 (예: Maven groupId)
    pub vendor: String,
    /// 생태계 태그
    pub language: Language,
    /// 라이선스 식별자
    pub licenses: Vec<String>,
    /// 이 컴포넌트가 발견된 파일의 상대 경로
    pub path: Option<String>,
    /// 직접 의존성 여부
    pub direct: bool,
    /// 개발 전용 의존성 여부
    pub develop: bool,
    /// 부착된 취약점 (외부 주석 단계가 채움)
    pub vulnerabilities: Vec<Vulnerability>,
    /// 하위 의존성 (발견 순서 유지)
    children: Vec<NodeId>,
}

impl Node {
    /// 이름과 버전으로 노드를 생성합니다.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// 이름 없는 플레이스홀더 노드를 생성합니다.
    pub fn placeholder() -> Self {
        Self::default()
    }

    /// 생태계를 지정합니다.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// 공급자를 지정합니다.
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    /// 라이선스를 추가합니다.
    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        push_unique(&mut self.licenses, license.into());
        self
    }

    /// 발견 경로를 지정합니다.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// 직접 의존성 여부를 지정합니다.
    pub fn with_direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    /// 개발 전용 여부를 지정합니다.
    pub fn with_develop(mut self, develop: bool) -> Self {
        self.develop = develop;
        self
    }

    /// 취약점을 부착합니다.
    pub fn with_vulnerability(mut self, vuln: Vulnerability) -> Self {
        self.attach_vulnerability(vuln);
        self
    }

    /// 취약점을 부착합니다. 같은 ID가 이미 있으면 무시합니다.
    pub fn attach_vulnerability(&mut self, vuln: Vulnerability) {
        if !self.vulnerabilities.iter().any(|v| v.id == vuln.id) {
            self.vulnerabilities.push(vuln);
        }
    }

    /// 플레이스홀더(이름 없음) 여부
    pub fn is_placeholder(&self) -> bool {
        self.name.is_empty()
    }

    /// 식별 키를 반환합니다.
    pub fn key(&self) -> DepKey {
        DepKey {
            name: self.name.clone(),
            language: self.language,
            version: self.version.clone(),
        }
    }

    /// 하위 의존성 목록
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// 같은 식별 키를 가진 다른 노드의 속성을 흡수합니다.
    ///
    /// 먼저 본 값이 우선하고, 비어 있는 스칼라만 채웁니다.
    /// 라이선스와 취약점은 합집합, `direct`는 OR, `develop`은 AND입니다.
    fn absorb(&mut self, other: &Node) {
        if self.vendor.is_empty() {
            self.vendor.clone_from(&other.vendor);
        }
        if self.path.is_none() {
            self.path.clone_from(&other.path);
        }
        for license in &other.licenses {
            push_unique(&mut self.licenses, license.clone());
        }
        for vuln in &other.vulnerabilities {
            self.attach_vulnerability(vuln.clone());
        }
        self.direct |= other.direct;
        self.develop &= other.develop;
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            return write!(f, "<root>");
        }
        if self.vendor.is_empty() {
            write!(f, "{}@{}", self.name, self.version)
        } else {
            write!(f, "{}:{}@{}", self.vendor, self.name, self.version)
        }
    }
}

/// 의존성 그래프 (조각 또는 통합 그래프)
#[derive(Debug, Clone, PartialEq)]
pub struct DepGraph {
    nodes: Vec<Node>,
    root: NodeId,
    built: bool,
    /// 식별 키 -> 노드 (빌드 이후에만 유효)
    index: HashMap<DepKey, NodeId>,
}

impl DepGraph {
    /// 루트 노드 하나로 새 조각을 생성합니다.
    pub fn new(root: Node) -> Self {
        Self {
            nodes: vec![root],
            root: NodeId(0),
            built: false,
            index: HashMap::new(),
        }
    }

    /// 플레이스홀더 루트를 가진 빈 그래프를 생성합니다.
    pub fn placeholder() -> Self {
        let mut graph = Self::new(Node::placeholder());
        graph.built = true;
        graph
    }

    /// 노드를 아레나에 추가합니다. 간선은 [`add_child`](Self::add_child)로 잇습니다.
    ///
    /// 조각은 다시 빌드 전 상태가 됩니다.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.built = false;
        id
    }

    /// `parent`의 하위 의존성 끝에 `child`를 추가합니다.
    ///
    /// 빌드 전 조각에는 중복 간선이 남을 수 있으며 빌드 시 제거됩니다.
    ///
    /// # Panics
    ///
    /// 두 인덱스 중 하나라도 이 그래프의 것이 아니면 패닉합니다.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        let len = self.nodes.len();
        assert!(parent.0 < len, "parent {parent:?} out of bounds");
        assert!(child.0 < len, "child {child:?} out of bounds");
        self.nodes[parent.0].children.push(child);
        self.built = false;
    }

    /// 루트 노드 인덱스
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// 루트 노드
    pub fn root_node(&self) -> &Node {
        &self.nodes[self.root.0]
    }

    /// 루트 노드 (수정 가능)
    pub fn root_node_mut(&mut self) -> &mut Node {
        &mut self.nodes[self.root.0]
    }

    /// 노드를 조회합니다.
    ///
    /// # Panics
    ///
    /// 인덱스가 이 그래프의 것이 아니면 패닉합니다.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// 노드를 조회합니다 (수정 가능).
    ///
    /// 식별 키를 바꾸면 다음 빌드 전까지 인덱스가 어긋나므로 조각을 다시 빌드 전 상태로 둡니다.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.built = false;
        &mut self.nodes[id.0]
    }

    /// 아레나의 노드 수 (도달 불가능한 노드 포함)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 아레나가 루트 하나뿐인 플레이스홀더인지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.root_node().is_placeholder()
    }

    /// 빌드 완료 여부
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// 식별 키로 노드를 찾습니다 (빌드 이후에만 유효).
    pub fn find(&self, key: &DepKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// 조각을 정규형으로 만듭니다.
    ///
    /// - `is_child == false`이면 생태계 태그가 없는 노드에 `tag`를 찍습니다.
    ///   하위 조각(`is_child == true`)은 병합될 그래프의 태그를 따르므로 찍지 않습니다.
    /// - 식별 키가 같은 노드를 처음 본 노드로 병합합니다.
    ///   하위 의존성, 라이선스, 취약점은 중복 없이 합쳐집니다.
    /// - 이미 빌드된 조각에 대해서는 아무 일도 하지 않습니다.
    pub fn build(&mut self, is_child: bool, tag: Language) {
        if self.built {
            return;
        }

        if !is_child && !tag.is_none() {
            for node in &mut self.nodes {
                if node.language.is_none() {
                    node.language = tag;
                }
            }
        }

        // 각 노드의 대표(처음 본 같은 키의 노드) 인덱스
        let count = self.nodes.len();
        let mut canonical = Vec::with_capacity(count);
        let mut first_seen: HashMap<DepKey, usize> = HashMap::new();
        let mut kept = 0usize;
        let mut position = vec![0usize; count];
        for (i, node) in self.nodes.iter().enumerate() {
            let rep = if node.is_placeholder() {
                i
            } else {
                match first_seen.entry(node.key()) {
                    Entry::Occupied(e) => *e.get(),
                    Entry::Vacant(e) => *e.insert(i),
                }
            };
            if rep == i {
                position[i] = kept;
                kept += 1;
            }
            canonical.push(rep);
        }

        let remap = |id: NodeId| NodeId(position[canonical[id.0]]);
        let mut compacted: Vec<Node> = Vec::with_capacity(kept);
        for (i, mut node) in std::mem::take(&mut self.nodes).into_iter().enumerate() {
            let children: Vec<NodeId> = node.children.drain(..).map(remap).collect();
            let target = position[canonical[i]];
            if canonical[i] == i {
                compacted.push(node);
            } else {
                compacted[target].absorb(&node);
            }
            let slot = &mut compacted[target].children;
            for child in children {
                push_unique(slot, child);
            }
        }

        self.root = remap(self.root);
        self.nodes = compacted;
        self.reindex();
        self.built = true;
    }

    /// 다른 조각을 이 그래프에 식별 키 기준으로 병합하고, 그 조각 루트의 새 인덱스를 반환합니다.
    ///
    /// 두 그래프 중 빌드되지 않은 쪽은 태그 없이 먼저 빌드됩니다.
    pub fn merge(&mut self, other: &DepGraph) -> NodeId {
        if !self.built {
            self.build(true, Language::None);
        }
        if !other.built {
            let mut built = other.clone();
            built.build(true, Language::None);
            return self.merge(&built);
        }

        let mut mapped = Vec::with_capacity(other.nodes.len());
        for node in &other.nodes {
            let existing = if node.is_placeholder() {
                None
            } else {
                self.index.get(&node.key()).copied()
            };
            let id = match existing {
                Some(id) => {
                    self.nodes[id.0].absorb(node);
                    id
                }
                None => {
                    let id = NodeId(self.nodes.len());
                    let mut fresh = node.clone();
                    fresh.children.clear();
                    if !fresh.is_placeholder() {
                        self.index.insert(fresh.key(), id);
                    }
                    self.nodes.push(fresh);
                    id
                }
            };
            mapped.push(id);
        }

        for (i, node) in other.nodes.iter().enumerate() {
            let parent = mapped[i];
            for child in &node.children {
                push_unique(&mut self.nodes[parent.0].children, mapped[child.0]);
            }
        }

        mapped[other.root.0]
    }

    /// 여러 조각을 플레이스홀더 루트 아래 하나의 그래프로 통합합니다.
    pub fn unify<'a>(fragments: impl IntoIterator<Item = &'a DepGraph>) -> DepGraph {
        let mut unified = Self::placeholder();
        let root = unified.root;
        for fragment in fragments {
            let id = unified.merge(fragment);
            if id != root {
                push_unique(&mut unified.nodes[root.0].children, id);
            }
        }
        unified
    }

    /// 루트에서 시작하는 전위 깊이 우선 순서를 반환합니다.
    ///
    /// 방문 집합으로 각 노드를 정확히 한 번만 방문하므로 순환이 있어도 종료합니다.
    /// 형제 노드는 하위 의존성 순서대로 방문합니다.
    pub fn dfs_order(&self) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut visited[id.0], true) {
                continue;
            }
            order.push(id);
            for child in self.nodes[id.0].children.iter().rev() {
                if !visited[child.0] {
                    stack.push(*child);
                }
            }
        }
        order
    }

    /// 도달 가능한 각 노드를 전위 깊이 우선 순서로 한 번씩 방문합니다.
    pub fn for_each(&self, mut visit: impl FnMut(NodeId, &Node)) {
        for id in self.dfs_order() {
            visit(id, &self.nodes[id.0]);
        }
    }

    /// 도달 가능한 컴포넌트(플레이스홀더 제외)를 방문 순서로 반환합니다.
    pub fn components(&self) -> Vec<&Node> {
        self.dfs_order()
            .into_iter()
            .map(|id| &self.nodes[id.0])
            .filter(|node| !node.is_placeholder())
            .collect()
    }

    /// 취약한 컴포넌트만 남긴 사본을 반환합니다.
    ///
    /// 플레이스홀더 루트 아래에 취약점이 있는 컴포넌트를 방문 순서대로 두고,
    /// 각 컴포넌트의 하위 의존성은 제거합니다.
    pub fn retain_vulnerable(&self) -> DepGraph {
        let mut pruned = Self::placeholder();
        for node in self.components() {
            if node.vulnerabilities.is_empty() {
                continue;
            }
            let mut leaf = node.clone();
            leaf.children.clear();
            let id = NodeId(pruned.nodes.len());
            pruned.index.insert(leaf.key(), id);
            pruned.nodes.push(leaf);
            pruned.nodes[0].children.push(id);
        }
        pruned
    }

    /// 위험도 요약을 계산합니다.
    pub fn risk_summary(&self) -> RiskSummary {
        RiskSummary::from_graph(self)
    }

    fn reindex(&mut self) {
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.is_placeholder())
            .map(|(i, node)| (node.key(), NodeId(i)))
            .collect();
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}
