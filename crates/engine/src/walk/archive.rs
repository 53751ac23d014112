//! 압축 컨테이너 해제
//!
//! zip 계열, tar, tar.gz, gz 컨테이너를 임시 디렉토리로 풉니다.
//!
//! # 보안 가드
//!
//! - `..`, 절대 경로 등 대상 디렉토리를 벗어나는 엔트리는 건너뜁니다 (Zip Slip).
//! - 선언 크기가 `max_entry_size`를 넘는 엔트리는 건너뛰고,
//!   실제 해제도 `max_entry_size` 바이트로 잘라냅니다 (압축 폭탄).
//! - 심볼릭/하드 링크 등 일반 파일이 아닌 tar 엔트리는 건너뜁니다.

use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::filter::ArchiveKind;
use crate::error::EngineError;

/// 해제 결과 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ExtractStats {
    /// 풀린 파일 수
    pub files: usize,
    /// 가드에 걸려 건너뛴 엔트리 수
    pub skipped: usize,
}

/// 해제 요청
pub(crate) struct Extraction<'a> {
    /// 컨테이너 실제 경로
    pub archive: &'a Path,
    /// 컨테이너 가상 상대 경로 (로그/에러용)
    pub relpath: &'a str,
    /// 컨테이너 종류
    pub kind: ArchiveKind,
    /// 해제 대상 디렉토리
    pub dest: &'a Path,
    /// 엔트리 최대 크기
    pub max_entry_size: u64,
}

impl Extraction<'_> {
    /// 컨테이너를 해제합니다.
    ///
    /// 엔트리마다 취소 토큰을 확인하며, 취소되면 `EngineError::Cancelled`를 반환합니다.
    pub(crate) fn run(&self, cancel: &CancellationToken) -> Result<ExtractStats, EngineError> {
        let file = fs::File::open(self.archive).map_err(|e| self.failed(e))?;
        let reader = io::BufReader::new(file);
        let stats = match self.kind {
            ArchiveKind::Zip => self.unzip(reader, cancel)?,
            ArchiveKind::Tar => self.untar(reader, cancel)?,
            ArchiveKind::TarGz => self.untar(flate2::read::GzDecoder::new(reader), cancel)?,
            ArchiveKind::Gz => self.gunzip(reader)?,
        };
        debug!(
            container = self.relpath,
            kind = %self.kind,
            files = stats.files,
            skipped = stats.skipped,
            "container extracted"
        );
        Ok(stats)
    }

    fn unzip<R: Read + io::Seek>(
        &self,
        reader: R,
        cancel: &CancellationToken,
    ) -> Result<ExtractStats, EngineError> {
        let mut archive = zip::ZipArchive::new(reader).map_err(|e| self.failed(e))?;
        let mut stats = ExtractStats::default();

        for i in 0..archive.len() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let mut entry = archive.by_index(i).map_err(|e| self.failed(e))?;

            let Some(rel) = entry.enclosed_name().and_then(|p| sanitize(&p)) else {
                warn!(container = self.relpath, entry = entry.name(), "skipping entry outside destination");
                stats.skipped += 1;
                continue;
            };
            let out_path = self.dest.join(rel);

            if entry.is_dir() {
                fs::create_dir_all(&out_path).map_err(|e| self.failed(e))?;
                continue;
            }

            if entry.size() > self.max_entry_size {
                warn!(
                    container = self.relpath,
                    entry = entry.name(),
                    size = entry.size(),
                    limit = self.max_entry_size,
                    "skipping oversized entry"
                );
                stats.skipped += 1;
                continue;
            }

            self.write_entry(&out_path, &mut entry)?;
            stats.files += 1;
        }

        Ok(stats)
    }

    fn untar<R: Read>(
        &self,
        reader: R,
        cancel: &CancellationToken,
    ) -> Result<ExtractStats, EngineError> {
        let mut archive = tar::Archive::new(reader);
        let mut stats = ExtractStats::default();

        for entry in archive.entries().map_err(|e| self.failed(e))? {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let mut entry = entry.map_err(|e| self.failed(e))?;
            let raw_path = entry.path().map_err(|e| self.failed(e))?.into_owned();

            let Some(rel) = sanitize(&raw_path) else {
                warn!(container = self.relpath, entry = %raw_path.display(), "skipping entry outside destination");
                stats.skipped += 1;
                continue;
            };
            let out_path = self.dest.join(rel);

            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                fs::create_dir_all(&out_path).map_err(|e| self.failed(e))?;
                continue;
            }
            if !entry_type.is_file() {
                debug!(container = self.relpath, entry = %raw_path.display(), "skipping non-regular entry");
                stats.skipped += 1;
                continue;
            }

            let size = entry.size();
            if size > self.max_entry_size {
                warn!(
                    container = self.relpath,
                    entry = %raw_path.display(),
                    size,
                    limit = self.max_entry_size,
                    "skipping oversized entry"
                );
                stats.skipped += 1;
                continue;
            }

            self.write_entry(&out_path, &mut entry)?;
            stats.files += 1;
        }

        Ok(stats)
    }

    fn gunzip<R: Read>(&self, reader: R) -> Result<ExtractStats, EngineError> {
        let stem = self
            .archive
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.strip_suffix(".gz").or_else(|| n.strip_suffix(".GZ")).unwrap_or(n))
            .filter(|n| !n.is_empty())
            .unwrap_or("content");
        let mut decoder = flate2::read::GzDecoder::new(reader);
        self.write_entry(&self.dest.join(stem), &mut decoder)?;
        Ok(ExtractStats {
            files: 1,
            skipped: 0,
        })
    }

    fn write_entry(&self, out_path: &Path, entry: &mut impl Read) -> Result<(), EngineError> {
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.failed(e))?;
        }
        let mut out = fs::File::create(out_path).map_err(|e| self.failed(e))?;
        let mut limited = entry.take(self.max_entry_size);
        io::copy(&mut limited, &mut out).map_err(|e| self.failed(e))?;
        Ok(())
    }

    fn failed(&self, reason: impl std::fmt::Display) -> EngineError {
        EngineError::Extraction {
            path: self.relpath.to_owned(),
            reason: reason.to_string(),
        }
    }
}

/// 엔트리 경로를 대상 디렉토리 기준 상대 경로로 정규화합니다.
///
/// `..`, 루트, 드라이브 접두사가 있거나 결과가 비면 `None`입니다.
fn sanitize(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}
