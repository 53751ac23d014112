//! 파일 트리 순회기
//!
//! 데이터 소스(로컬 디렉토리, 단일 파일/압축 파일, 원격 URL)를 순회하며
//! 디렉토리마다 [`DirectoryGroup`]을 만들어 채널로 보냅니다.
//!
//! # 순회 규칙
//!
//! - 디렉토리 엔트리는 이름 순으로 방문하고, 심볼릭 링크는 따라가지 않습니다.
//! - 압축 해제 필터가 컨테이너로 판단한 파일은 임시 디렉토리에 풀고
//!   `<컨테이너 경로>/<내부 경로>` 가상 하위 트리로 먼저 순회합니다.
//!   분석기는 컨테이너 원본 바이트를 보지 않습니다.
//! - 현재 디렉토리의 그룹을 보낸 뒤 하위 디렉토리로 내려갑니다.
//! - 크기는 디스크의 일반 파일만 합산하며 풀린 내용은 다시 세지 않습니다.
//!
//! # 실패 처리
//!
//! - 데이터 소스를 읽을 수 없으면 치명적 에러입니다.
//! - 중첩 컨테이너 해제 실패는 로그를 남기고 건너뜁니다.
//!   `max_extraction_failures`가 0이 아니고 실패 수가 한도에 닿으면
//!   `EngineError::ExtractionLimit`로 중단합니다.
//! - 데이터 소스 자체가 컨테이너인데 풀리지 않으면 `EngineError::Extraction`입니다.

pub mod archive;
pub mod filter;
pub mod remote;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use deptrace_core::metrics as m;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::types::{DirectoryGroup, File, join_relpath};

use self::archive::Extraction;
pub use self::filter::{ArchiveFilter, ArchiveKind, ExtractFilter};
use self::remote::Origin;

/// 그룹에 넣을 파일을 고르는 술어
pub type AcceptFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// 순회 옵션
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// 압축 컨테이너 최대 중첩 깊이
    pub max_extract_depth: usize,
    /// 중첩 압축 해제 실패 허용 횟수 (0이면 무제한)
    pub max_extraction_failures: usize,
    /// 압축 엔트리 최대 크기
    pub max_archive_entry_size: u64,
    /// 원격 다운로드 타임아웃
    pub fetch_timeout: Duration,
    /// 임시 작업 디렉토리
    pub work_dir: Option<PathBuf>,
}

impl From<&EngineConfig> for WalkOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_extract_depth: config.max_extract_depth,
            max_extraction_failures: config.max_extraction_failures,
            max_archive_entry_size: config.max_archive_entry_size,
            fetch_timeout: config.fetch_timeout(),
            work_dir: config.work_dir.clone(),
        }
    }
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// 순회 통계
///
/// 순회기가 분리(detach)된 뒤에도 읽을 수 있도록 원자 카운터로 공유됩니다.
#[derive(Debug, Default)]
pub struct WalkStats {
    size: AtomicU64,
    files: AtomicUsize,
    groups: AtomicUsize,
    containers: AtomicUsize,
    extraction_failures: AtomicUsize,
}

impl WalkStats {
    /// 디스크 파일 크기 합계 (바이트)
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// 방문한 일반 파일 수 (컨테이너 내부 포함)
    pub fn files(&self) -> usize {
        self.files.load(Ordering::Relaxed)
    }

    /// 보낸 디렉토리 그룹 수
    pub fn groups(&self) -> usize {
        self.groups.load(Ordering::Relaxed)
    }

    /// 해제한 컨테이너 수
    pub fn containers(&self) -> usize {
        self.containers.load(Ordering::Relaxed)
    }

    /// 중첩 컨테이너 해제 실패 수
    pub fn extraction_failures(&self) -> usize {
        self.extraction_failures.load(Ordering::Relaxed)
    }
}

/// 파일 트리 순회기
#[derive(Clone)]
pub struct Walker {
    name: String,
    options: Arc<WalkOptions>,
    extract: Arc<dyn ExtractFilter>,
    accept: AcceptFn,
    stats: Arc<WalkStats>,
}

/// 한 번의 순회 동안 공유되는 문맥
struct WalkCtx<'a> {
    cancel: &'a CancellationToken,
    groups: &'a mpsc::Sender<DirectoryGroup>,
}

impl WalkCtx<'_> {
    fn check(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Walker {
    /// 새 순회기를 생성합니다.
    ///
    /// `name`은 가상 상대 경로의 루트가 됩니다.
    /// 기본 압축 해제 필터는 [`ArchiveFilter`], 기본 술어는 모든 파일 허용입니다.
    pub fn new(name: impl Into<String>, options: WalkOptions) -> Self {
        Self {
            name: name.into(),
            options: Arc::new(options),
            extract: Arc::new(ArchiveFilter),
            accept: Arc::new(|_: &str| true),
            stats: Arc::new(WalkStats::default()),
        }
    }

    /// 압축 해제 필터를 교체합니다.
    pub fn with_extract_filter(mut self, filter: Arc<dyn ExtractFilter>) -> Self {
        self.extract = filter;
        self
    }

    /// 그룹에 넣을 파일 술어를 교체합니다.
    pub fn with_accept(mut self, accept: AcceptFn) -> Self {
        self.accept = accept;
        self
    }

    /// 공유 통계 핸들을 반환합니다.
    pub fn stats(&self) -> Arc<WalkStats> {
        Arc::clone(&self.stats)
    }

    /// 데이터 소스를 순회하며 디렉토리 그룹을 `groups`로 보냅니다.
    ///
    /// 성공하면 디스크 파일 크기 합계를 반환합니다.
    /// 원격 소스는 먼저 내려받고, 로컬 순회는 블로킹 스레드에서 수행됩니다.
    pub async fn walk(
        &self,
        cancel: &CancellationToken,
        origin: &str,
        groups: mpsc::Sender<DirectoryGroup>,
    ) -> Result<u64, EngineError> {
        let (path, scratch) = match Origin::parse(origin)? {
            Origin::Local(path) => (path, None),
            Origin::Remote(url) => {
                let dir = self.scratch_dir().map_err(|e| EngineError::Origin {
                    origin: origin.to_owned(),
                    reason: format!("cannot create scratch directory: {e}"),
                })?;
                let path =
                    remote::fetch(&url, dir.path(), self.options.fetch_timeout, cancel).await?;
                (path, Some(Arc::new(dir)))
            }
        };

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| EngineError::Origin {
                origin: origin.to_owned(),
                reason: e.to_string(),
            })?;

        info!(name = %self.name, origin, is_dir = meta.is_dir(), "walk started");

        let walker = self.clone();
        let cancel = cancel.clone();
        let origin_owned = origin.to_owned();
        tokio::task::spawn_blocking(move || {
            let ctx = WalkCtx {
                cancel: &cancel,
                groups: &groups,
            };
            if meta.is_dir() {
                walker
                    .visit_dir(&ctx, &path, &walker.name, &scratch, 0)
                    .map_err(|e| match e {
                        EngineError::Io { source, .. } => EngineError::Origin {
                            origin: origin_owned,
                            reason: source.to_string(),
                        },
                        other => other,
                    })
            } else {
                walker.visit_origin_file(&ctx, &path, meta.len(), scratch)
            }
        })
        .await
        .map_err(|e| EngineError::Channel(format!("walker thread failed: {e}")))??;

        let size = self.stats.size();
        info!(
            name = %self.name,
            size,
            files = self.stats.files(),
            groups = self.stats.groups(),
            containers = self.stats.containers(),
            extraction_failures = self.stats.extraction_failures(),
            "walk finished"
        );
        Ok(size)
    }

    /// 단일 파일 데이터 소스를 처리합니다.
    fn visit_origin_file(
        &self,
        ctx: &WalkCtx<'_>,
        path: &Path,
        size: u64,
        scratch: Option<Arc<TempDir>>,
    ) -> Result<(), EngineError> {
        self.stats.size.fetch_add(size, Ordering::Relaxed);
        self.stats.files.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::WALK_FILES_TOTAL).increment(1);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // 이름을 바꿔도 마지막 경로 요소는 실제 파일 이름으로 유지
        let (parent_rel, relpath) = if self.name == file_name {
            (String::new(), file_name.clone())
        } else {
            (self.name.clone(), join_relpath(&self.name, &file_name))
        };

        if self.extract.is_container(&relpath) {
            // 데이터 소스 자체가 풀리지 않으면 쓸 수 있는 것이 없음
            let dir = self.unpack(ctx, path, &relpath, &file_name)?;
            let root = dir.path().to_path_buf();
            return self.visit_dir(ctx, &root, &self.name, &Some(dir), 1);
        }

        if (self.accept)(&relpath) {
            let parent = path.parent().unwrap_or(path);
            let group = DirectoryGroup {
                parent: File::new(parent_rel, parent, 0),
                files: vec![File::new(relpath, path, size).with_scratch(scratch)],
            };
            self.send(ctx, group)?;
        }
        Ok(())
    }

    /// 디렉토리 하나를 순회합니다.
    fn visit_dir(
        &self,
        ctx: &WalkCtx<'_>,
        dir: &Path,
        relpath: &str,
        scratch: &Option<Arc<TempDir>>,
        depth: usize,
    ) -> Result<(), EngineError> {
        ctx.check()?;

        let mut entries = fs::read_dir(dir)
            .and_then(|rd| rd.collect::<Result<Vec<_>, _>>())
            .map_err(|e| EngineError::io(dir.display(), e))?;
        entries.sort_by_key(|entry| entry.file_name());

        let mut files = Vec::new();
        let mut subdirs = Vec::new();

        for entry in entries {
            ctx.check()?;

            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = join_relpath(relpath, &name);
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    warn!(path = %rel, error = %e, "cannot stat entry, skipping");
                    continue;
                }
            };

            if file_type.is_symlink() {
                debug!(path = %rel, "skipping symlink");
                continue;
            }
            if file_type.is_dir() {
                subdirs.push((entry.path(), rel));
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            if scratch.is_none() {
                self.stats.size.fetch_add(size, Ordering::Relaxed);
            }
            self.stats.files.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::WALK_FILES_TOTAL).increment(1);

            if self.extract.is_container(&rel) {
                if depth < self.options.max_extract_depth {
                    self.visit_nested(ctx, &entry.path(), &rel, &name, depth)?;
                    continue;
                }
                warn!(
                    path = %rel,
                    depth,
                    limit = self.options.max_extract_depth,
                    "container nesting limit reached, treating as leaf"
                );
            }

            if (self.accept)(&rel) {
                files.push(File::new(rel, entry.path(), size).with_scratch(scratch.clone()));
            }
        }

        if !files.is_empty() {
            let group = DirectoryGroup {
                parent: File::new(relpath, dir, 0).with_scratch(scratch.clone()),
                files,
            };
            self.send(ctx, group)?;
        }

        for (path, rel) in subdirs {
            match self.visit_dir(ctx, &path, &rel, scratch, depth) {
                Err(EngineError::Io { path, source }) => {
                    warn!(path = %path, error = %source, "unreadable directory, skipping");
                }
                other => other?,
            }
        }

        Ok(())
    }

    /// 중첩 컨테이너를 풀고 순회합니다. 해제 실패는 세고 건너뜁니다.
    fn visit_nested(
        &self,
        ctx: &WalkCtx<'_>,
        archive: &Path,
        rel: &str,
        name: &str,
        depth: usize,
    ) -> Result<(), EngineError> {
        match self.unpack(ctx, archive, rel, name) {
            Ok(dir) => {
                let root = dir.path().to_path_buf();
                self.visit_dir(ctx, &root, rel, &Some(dir), depth + 1)
            }
            Err(EngineError::Cancelled) => Err(EngineError::Cancelled),
            Err(err) => self.record_failure(rel, &err),
        }
    }

    /// 컨테이너를 새 임시 디렉토리에 풉니다.
    fn unpack(
        &self,
        ctx: &WalkCtx<'_>,
        archive: &Path,
        rel: &str,
        name: &str,
    ) -> Result<Arc<TempDir>, EngineError> {
        let sniffed = || {
            ArchiveKind::sniff(archive).map_err(|e| EngineError::Extraction {
                path: rel.to_owned(),
                reason: e.to_string(),
            })
        };
        let kind = match ArchiveKind::detect(rel).or_else(|| ArchiveKind::detect(name)) {
            Some(kind) => kind,
            None => sniffed()?.ok_or_else(|| EngineError::Extraction {
                path: rel.to_owned(),
                reason: "unrecognized container format".to_owned(),
            })?,
        };
        let dir = self.scratch_dir().map_err(|e| EngineError::Extraction {
            path: rel.to_owned(),
            reason: format!("cannot create scratch directory: {e}"),
        })?;

        Extraction {
            archive,
            relpath: rel,
            kind,
            dest: dir.path(),
            max_entry_size: self.options.max_archive_entry_size,
        }
        .run(ctx.cancel)?;

        self.stats.containers.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::WALK_CONTAINERS_EXTRACTED_TOTAL).increment(1);
        Ok(Arc::new(dir))
    }

    /// 중첩 해제 실패를 기록하고 한도에 닿으면 순회를 중단합니다.
    fn record_failure(&self, rel: &str, err: &EngineError) -> Result<(), EngineError> {
        let failures = self.stats.extraction_failures.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::counter!(m::WALK_EXTRACTION_FAILURES_TOTAL).increment(1);
        warn!(path = rel, error = %err, failures, "nested container skipped");

        let limit = self.options.max_extraction_failures;
        if limit > 0 && failures >= limit {
            return Err(EngineError::ExtractionLimit { failures, limit });
        }
        Ok(())
    }

    fn send(&self, ctx: &WalkCtx<'_>, group: DirectoryGroup) -> Result<(), EngineError> {
        debug!(parent = %group.parent, files = group.len(), "group ready");
        ctx.groups
            .blocking_send(group)
            .map_err(|_| EngineError::Channel("group receiver closed".to_owned()))?;
        self.stats.groups.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::WALK_GROUPS_TOTAL).increment(1);
        Ok(())
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("deptrace-");
        match &self.options.work_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
    }
}

impl std::fmt::Debug for Walker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Walker")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
