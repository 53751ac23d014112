//! 압축 해제 필터 -- 어떤 파일을 컨테이너로 풀지 결정
//!
//! 기본 필터 [`ArchiveFilter`]는 확장자로 컨테이너 종류([`ArchiveKind`])를 판별합니다.
//! 호출자는 클로저 또는 [`ExtractFilter`] 구현체로 기본 필터를 대체할 수 있습니다.
//! 필터가 컨테이너로 고른 파일의 확장자를 모르면 [`ArchiveKind::sniff`]로 내용을 확인합니다.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// 지원하는 압축 컨테이너 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// zip 계열 (jar, war, whl, nupkg 등)
    Zip,
    /// 비압축 tar
    Tar,
    /// gzip 압축 tar (.tar.gz / .tgz)
    TarGz,
    /// 단일 스트림 gzip
    Gz,
}

/// zip 로컬 헤더 / 빈 아카이브 중앙 디렉토리 끝 시그니처
const ZIP_MAGIC: [&[u8; 4]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];

/// gzip 시그니처
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// tar 헤더의 `ustar` 표식 위치
const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: &[u8; 5] = b"ustar";

/// 판별에 읽는 헤더 크기 (tar 블록 하나)
const SNIFF_LEN: usize = 512;

/// zip 포맷을 쓰는 확장자
const ZIP_EXTENSIONS: &[&str] = &[
    ".zip", ".jar", ".war", ".ear", ".whl", ".egg", ".nupkg", ".apk", ".aar",
];

impl ArchiveKind {
    /// 상대 경로의 확장자로 컨테이너 종류를 판별합니다 (대소문자 구분 없음).
    pub fn detect(relpath: &str) -> Option<Self> {
        let lower = relpath.to_lowercase();
        if ZIP_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else if lower.ends_with(".gz") {
            Some(Self::Gz)
        } else {
            None
        }
    }

    /// 파일 앞부분의 시그니처로 컨테이너 종류를 판별합니다.
    ///
    /// gzip이면 스트림 앞부분을 풀어 tar 헤더가 있는지 확인합니다.
    pub fn sniff(path: &Path) -> io::Result<Option<Self>> {
        let mut head = Vec::with_capacity(SNIFF_LEN);
        fs::File::open(path)?
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut head)?;

        if ZIP_MAGIC.iter().any(|magic| head.starts_with(&magic[..])) {
            return Ok(Some(Self::Zip));
        }
        if head.starts_with(&GZIP_MAGIC) {
            let mut inner = Vec::with_capacity(SNIFF_LEN);
            let decoder = flate2::read::GzDecoder::new(fs::File::open(path)?);
            // 손상된 스트림은 단일 gzip으로 두고 해제 단계에서 실패시킴
            let kind = match decoder.take(SNIFF_LEN as u64).read_to_end(&mut inner) {
                Ok(_) if is_tar_header(&inner) => Self::TarGz,
                _ => Self::Gz,
            };
            return Ok(Some(kind));
        }
        if is_tar_header(&head) {
            return Ok(Some(Self::Tar));
        }
        Ok(None)
    }
}

fn is_tar_header(block: &[u8]) -> bool {
    block
        .get(USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len())
        .is_some_and(|magic| magic == USTAR_MAGIC)
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zip => write!(f, "zip"),
            Self::Tar => write!(f, "tar"),
            Self::TarGz => write!(f, "tar.gz"),
            Self::Gz => write!(f, "gz"),
        }
    }
}

/// 압축 해제 필터
///
/// `true`를 반환한 파일은 컨테이너로 간주되어 풀린 뒤 가상 하위 트리로 순회됩니다.
/// `Fn(&str) -> bool` 클로저는 자동으로 이 트레이트를 구현합니다.
pub trait ExtractFilter: Send + Sync {
    /// 상대 경로의 파일을 컨테이너로 풀지 결정합니다.
    fn is_container(&self, relpath: &str) -> bool;
}

impl<F> ExtractFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_container(&self, relpath: &str) -> bool {
        self(relpath)
    }
}

/// 기본 압축 해제 필터 (확장자 기반)
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveFilter;

impl ExtractFilter for ArchiveFilter {
    fn is_container(&self, relpath: &str) -> bool {
        ArchiveKind::detect(relpath).is_some()
    }
}
