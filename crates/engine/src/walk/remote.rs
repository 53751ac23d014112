//! 데이터 소스 해석 및 원격 다운로드
//!
//! 데이터 소스 문자열을 로컬 경로 또는 원격 URL로 해석합니다.
//! 원격 소스는 임시 디렉토리로 한 번 내려받은 뒤 로컬 소스와 똑같이 순회됩니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::EngineError;

/// 해석된 데이터 소스
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Origin {
    /// 로컬 파일 또는 디렉토리
    Local(PathBuf),
    /// http(s) URL
    Remote(String),
}

impl Origin {
    /// 데이터 소스 문자열을 해석합니다.
    ///
    /// - `scheme://` 접두사가 없으면 로컬 경로
    /// - `file://`은 로컬 경로
    /// - `http://`, `https://`는 원격
    /// - 그 밖의 스킴은 `EngineError::UnsupportedScheme`
    pub(crate) fn parse(origin: &str) -> Result<Self, EngineError> {
        let Some((scheme, rest)) = origin.split_once("://") else {
            return Ok(Self::Local(PathBuf::from(origin)));
        };

        match scheme.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::Local(PathBuf::from(rest))),
            "http" | "https" => Ok(Self::Remote(origin.to_owned())),
            other => Err(EngineError::UnsupportedScheme {
                scheme: other.to_owned(),
                origin: origin.to_owned(),
            }),
        }
    }
}

/// URL 경로의 마지막 요소를 파일 이름으로 씁니다.
///
/// 쿼리/프래그먼트는 제거하며, 쓸 수 없는 이름이면 `download`입니다.
pub(crate) fn file_name_from_url(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or(without_scheme);
    // 호스트만 있는 URL은 경로 요소가 없음
    let segment = path
        .split_once('/')
        .map(|(_, p)| p.trim_end_matches('/'))
        .and_then(|p| p.rsplit('/').next())
        .unwrap_or("");
    match segment {
        "" | "." | ".." => "download".to_owned(),
        name => name.to_owned(),
    }
}

/// 원격 데이터 소스를 `dest_dir`로 내려받고 파일 경로를 반환합니다.
///
/// 전체 요청은 `timeout`으로 제한되며, 토큰이 취소되면 즉시 `EngineError::Cancelled`를 반환합니다.
pub(crate) async fn fetch(
    url: &str,
    dest_dir: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<PathBuf, EngineError> {
    let dest = dest_dir.join(file_name_from_url(url));
    info!(url, dest = %dest.display(), "fetching remote origin");

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        res = download(url, &dest, timeout) => res.map(|bytes| {
            debug!(url, bytes, "remote origin fetched");
            dest
        }),
    }
}

async fn download(url: &str, dest: &Path, timeout: Duration) -> Result<u64, EngineError> {
    let fetch_err = |reason: String| EngineError::Fetch {
        url: url.to_owned(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("deptrace/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| fetch_err(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| fetch_err(e.to_string()))?;

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| EngineError::io(dest.display(), e))?;
    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| fetch_err(e.to_string()))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| EngineError::io(dest.display(), e))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| EngineError::io(dest.display(), e))?;

    Ok(written)
}
