//! 파일 트리 순회기 통합 테스트

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use deptrace_engine::{DirectoryGroup, EngineError, WalkOptions, Walker};

fn write(root: &Path, relpath: &str, content: &[u8]) {
    let path = root.join(relpath);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// 순회를 끝까지 돌리고 (크기, 그룹별 상대 경로 목록)을 반환합니다.
async fn collect(walker: &Walker, origin: &Path) -> (Result<u64, EngineError>, Vec<Vec<String>>) {
    let (tx, mut rx) = mpsc::channel::<DirectoryGroup>(64);
    let outcome = walker
        .walk(&CancellationToken::new(), &origin.to_string_lossy(), tx)
        .await;
    let mut groups = Vec::new();
    while let Some(group) = rx.recv().await {
        groups.push(
            group
                .files
                .iter()
                .map(|f| f.relpath().to_owned())
                .collect(),
        );
    }
    (outcome, groups)
}

#[tokio::test]
async fn test_groups_follow_sorted_preorder() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("app");
    write(&origin, "z.txt", b"z");
    write(&origin, "a.txt", b"a");
    write(&origin, "lib/b.txt", b"bb");
    write(&origin, "lib/inner/c.txt", b"ccc");
    write(&origin, "empty/.keep", b"");

    let walker = Walker::new("app", WalkOptions::default());
    let (outcome, groups) = collect(&walker, &origin).await;

    assert_eq!(outcome.unwrap(), 1 + 1 + 2 + 3);
    assert_eq!(
        groups,
        vec![
            vec!["app/a.txt".to_owned(), "app/z.txt".to_owned()],
            vec!["app/empty/.keep".to_owned()],
            vec!["app/lib/b.txt".to_owned()],
            vec!["app/lib/inner/c.txt".to_owned()],
        ]
    );
    assert_eq!(walker.stats().groups(), 4);
    assert_eq!(walker.stats().files(), 5);
}

#[tokio::test]
async fn test_accept_predicate_filters_groups_but_not_size() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("app");
    write(&origin, "Cargo.lock", b"lock");
    write(&origin, "src/main.rs", b"fn main() {}");

    let walker = Walker::new("app", WalkOptions::default())
        .with_accept(Arc::new(|relpath: &str| relpath.ends_with(".lock")));
    let (outcome, groups) = collect(&walker, &origin).await;

    assert_eq!(outcome.unwrap(), 4 + 12);
    assert_eq!(groups, vec![vec!["app/Cargo.lock".to_owned()]]);
}

#[tokio::test]
async fn test_depth_limit_treats_container_as_leaf() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("app");
    write(&origin, "lib.jar", &zip_bytes(&[("pom.xml", b"<project/>")]));

    let options = WalkOptions {
        max_extract_depth: 0,
        ..WalkOptions::default()
    };
    let walker = Walker::new("app", options);
    let (outcome, groups) = collect(&walker, &origin).await;

    assert!(outcome.is_ok());
    assert_eq!(groups, vec![vec!["app/lib.jar".to_owned()]]);
    assert_eq!(walker.stats().containers(), 0);
}

#[tokio::test]
async fn test_custom_extract_filter_disables_unpacking() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("app");
    write(&origin, "lib.jar", &zip_bytes(&[("pom.xml", b"<project/>")]));

    let walker = Walker::new("app", WalkOptions::default())
        .with_extract_filter(Arc::new(|_: &str| false));
    let (_, groups) = collect(&walker, &origin).await;

    assert_eq!(groups, vec![vec!["app/lib.jar".to_owned()]]);
}

#[tokio::test]
async fn test_container_contents_outlive_the_walk() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("app");
    write(&origin, "lib.jar", &zip_bytes(&[("META-INF/pom.xml", b"<project/>")]));

    let walker = Walker::new("app", WalkOptions::default());
    let (tx, mut rx) = mpsc::channel(8);
    walker
        .walk(&CancellationToken::new(), &origin.to_string_lossy(), tx)
        .await
        .unwrap();

    let group = rx.recv().await.unwrap();
    assert_eq!(group.parent.relpath(), "app/lib.jar/META-INF");
    let file = &group.files[0];
    assert_eq!(file.relpath(), "app/lib.jar/META-INF/pom.xml");
    // 그룹을 쥐고 있는 동안 임시 디렉토리가 남아 있음
    assert_eq!(file.read_to_string().unwrap(), "<project/>");
}

#[tokio::test]
async fn test_single_plain_file_origin() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "package-lock.json", b"{}");

    let walker = Walker::new("package-lock.json", WalkOptions::default());
    let (outcome, groups) = collect(&walker, &dir.path().join("package-lock.json")).await;

    assert_eq!(outcome.unwrap(), 2);
    assert_eq!(groups, vec![vec!["package-lock.json".to_owned()]]);
}

#[tokio::test]
async fn test_single_plain_file_origin_keeps_file_name_under_custom_name() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "package-lock.json", b"{}");

    let walker = Walker::new("web", WalkOptions::default());
    let (tx, mut rx) = mpsc::channel(8);
    let origin = dir.path().join("package-lock.json");
    walker
        .walk(&CancellationToken::new(), &origin.to_string_lossy(), tx)
        .await
        .unwrap();

    let group = rx.recv().await.unwrap();
    assert_eq!(group.parent.relpath(), "web");
    assert_eq!(group.files[0].relpath(), "web/package-lock.json");
    assert_eq!(group.files[0].name(), "package-lock.json");
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_file_scheme_is_local() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("app");
    write(&origin, "a.txt", b"a");

    let walker = Walker::new("app", WalkOptions::default());
    let (tx, mut rx) = mpsc::channel(8);
    let url = format!("file://{}", origin.display());
    let size = walker
        .walk(&CancellationToken::new(), &url, tx)
        .await
        .unwrap();

    assert_eq!(size, 1);
    assert_eq!(rx.recv().await.unwrap().files[0].relpath(), "app/a.txt");
}

#[tokio::test]
async fn test_cancelled_walk_stops() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("app");
    write(&origin, "a.txt", b"a");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (tx, _rx) = mpsc::channel(8);
    let err = Walker::new("app", WalkOptions::default())
        .walk(&cancel, &origin.to_string_lossy(), tx)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinks_are_not_followed() {
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("app");
    write(&origin, "real/a.txt", b"a");
    write(dir.path(), "outside/secret.txt", b"secret");
    std::os::unix::fs::symlink(dir.path().join("outside"), origin.join("link")).unwrap();
    std::os::unix::fs::symlink(origin.join("real/a.txt"), origin.join("alias.txt")).unwrap();

    let walker = Walker::new("app", WalkOptions::default());
    let (outcome, groups) = collect(&walker, &origin).await;

    assert_eq!(outcome.unwrap(), 1);
    assert_eq!(groups, vec![vec!["app/real/a.txt".to_owned()]]);
}
