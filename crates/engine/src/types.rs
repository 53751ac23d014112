//! 도메인 타입 -- 탐지 파이프라인 전용 데이터 구조
//!
//! 분석기 생태계 태그([`Language`]), 순회 중 전달되는 파일([`File`])과
//! 디렉토리 그룹([`DirectoryGroup`])을 정의합니다.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::error::EngineError;

/// 컴포넌트 생태계 (언어/패키지 관리자)
///
/// 분석기가 방출한 노드의 출처 태그이자 식별 키의 일부입니다.
/// `None`은 아직 태그가 찍히지 않은 노드를 뜻합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Language {
    /// 태그 없음
    #[default]
    None,
    /// Java (Maven, Gradle)
    Java,
    /// JavaScript/TypeScript (npm, yarn, pnpm)
    JavaScript,
    /// PHP (composer)
    Php,
    /// Ruby (bundler)
    Ruby,
    /// Go (go.mod)
    Golang,
    /// Rust (Cargo)
    Rust,
    /// Erlang/Elixir (rebar, mix)
    Erlang,
    /// Python (pip, pipenv, poetry)
    Python,
    /// .NET (NuGet)
    Dotnet,
    /// C/C++ (conan)
    Cpp,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, ""),
            Self::Java => write!(f, "java"),
            Self::JavaScript => write!(f, "javascript"),
            Self::Php => write!(f, "php"),
            Self::Ruby => write!(f, "ruby"),
            Self::Golang => write!(f, "golang"),
            Self::Rust => write!(f, "rust"),
            Self::Erlang => write!(f, "erlang"),
            Self::Python => write!(f, "python"),
            Self::Dotnet => write!(f, "dotnet"),
            Self::Cpp => write!(f, "cpp"),
        }
    }
}

impl Language {
    /// 태그가 찍혀 있지 않은지 확인합니다.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// 순회 중 발견된 파일
///
/// 불변이며, 압축 컨테이너 안의 파일이면 해제된 임시 디렉토리를
/// 참조 카운트로 붙잡고 있어 분석기가 늦게 읽어도 내용이 남아 있습니다.
#[derive(Debug, Clone)]
pub struct File {
    /// 데이터 소스 이름을 루트로 하는 가상 상대 경로 (`/` 구분)
    relpath: String,
    /// 실제 디스크 경로
    abspath: PathBuf,
    /// 파일 크기 (바이트), 디렉토리는 0
    size: u64,
    /// 해제된 컨테이너의 임시 디렉토리
    scratch: Option<Arc<TempDir>>,
}

impl File {
    /// 새 파일 항목을 생성합니다.
    pub fn new(relpath: impl Into<String>, abspath: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            relpath: relpath.into(),
            abspath: abspath.into(),
            size,
            scratch: None,
        }
    }

    /// 해제된 컨테이너의 임시 디렉토리를 붙잡도록 합니다.
    pub(crate) fn with_scratch(mut self, scratch: Option<Arc<TempDir>>) -> Self {
        self.scratch = scratch;
        self
    }

    /// 가상 상대 경로를 반환합니다.
    pub fn relpath(&self) -> &str {
        &self.relpath
    }

    /// 실제 디스크 경로를 반환합니다.
    pub fn abspath(&self) -> &Path {
        &self.abspath
    }

    /// 파일 크기를 반환합니다.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// 파일 이름(마지막 경로 요소)을 반환합니다.
    pub fn name(&self) -> &str {
        self.relpath
            .rsplit('/')
            .next()
            .unwrap_or(self.relpath.as_str())
    }

    /// 파일을 읽기용으로 엽니다.
    pub fn open(&self) -> Result<std::fs::File, EngineError> {
        std::fs::File::open(&self.abspath).map_err(|e| EngineError::io(&self.relpath, e))
    }

    /// 파일 전체를 바이트로 읽습니다.
    pub fn read_bytes(&self) -> Result<Vec<u8>, EngineError> {
        let mut buf = Vec::with_capacity(usize::try_from(self.size).unwrap_or(0));
        self.open()?
            .read_to_end(&mut buf)
            .map_err(|e| EngineError::io(&self.relpath, e))?;
        Ok(buf)
    }

    /// 파일 전체를 UTF-8 문자열로 읽습니다.
    pub fn read_to_string(&self) -> Result<String, EngineError> {
        std::fs::read_to_string(&self.abspath).map_err(|e| EngineError::io(&self.relpath, e))
    }

    /// 파일을 비동기로 읽어 UTF-8 문자열로 반환합니다.
    pub async fn read_to_string_async(&self) -> Result<String, EngineError> {
        tokio::fs::read_to_string(&self.abspath)
            .await
            .map_err(|e| EngineError::io(&self.relpath, e))
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relpath)
    }
}

/// 디렉토리 그룹
///
/// 부모 디렉토리와 필터를 통과한 직속 파일 목록입니다.
/// 디렉토리 하나를 다 읽은 뒤 한 번 만들어져 오케스트레이터로 넘어갑니다.
#[derive(Debug, Clone)]
pub struct DirectoryGroup {
    /// 부모 디렉토리
    pub parent: File,
    /// 직속 파일 (이름 순)
    pub files: Vec<File>,
}

impl DirectoryGroup {
    /// 그룹의 파일 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// 그룹이 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// 가상 상대 경로 두 개를 `/`로 잇습니다.
pub(crate) fn join_relpath(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_owned()
    } else {
        format!("{base}/{name}")
    }
}
