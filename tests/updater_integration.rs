//! ═══════════════════════════════════════════════════════════════════
//! 업데이터 통합 테스트
//! ═══════════════════════════════════════════════════════════════════
//!
//! 로컬 HTTP 서버에서 아카이브를 받아 실제 디렉터리를 교체하는 전체 흐름을 테스트합니다:
//!
//! 1. **정상 교체**: 래핑 폴더 / 평평한 아카이브 / archive_root 지정
//! 2. **다운로드 실패**: HTTP 404
//! 3. **압축 해제 실패**: 손상된 아카이브, 없는 archive_root
//! 4. **잔여물 처리**: 기존 아카이브 보존, 이전 스테이징 정리
//! 5. **설정 연동**: loader.toml → InjectorUpdater
//! 6. **장애 주입**: 교체 rename 실패 시 롤백 / 롤백까지 실패
//! 7. **중단된 시도**: 호출자가 떠나도 압축 해제가 끝날 때까지 가드 유지
//!
//! 모든 테스트는 `tempdir`을 사용해 파일시스템을 격리합니다.

use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use payload_loader::config::LoaderConfig;
use payload_loader::updater::{
    AttemptGuard, FsOps, InjectorUpdater, RealFs, UpdateConfig, UpdateOutcome, UpdatePhase, UpdaterError,
};

// ═══════════════════════════════════════════════════════
// 테스트 유틸리티
// ═══════════════════════════════════════════════════════

/// 테스트용 zip 파일 생성: (이름, 내용) 순서대로 패킹
fn create_test_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let buf = std::io::Cursor::new(Vec::new());
    let mut zip_writer = zip::ZipWriter::new(buf);
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);

    for (name, content) in files {
        zip_writer.start_file(*name, options).unwrap();
        zip_writer.write_all(content).unwrap();
    }

    let cursor = zip_writer.finish().unwrap();
    cursor.into_inner()
}

/// `/download/<name>`으로 아카이브를 내려주는 로컬 서버
async fn start_mock_server(assets: HashMap<String, Vec<u8>>) -> SocketAddr {
    let assets = Arc::new(assets);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().route(
        "/download/:filename",
        get(move |axum::extract::Path(filename): axum::extract::Path<String>| {
            let a = assets.clone();
            async move {
                match a.get(&filename) {
                    Some(data) => (
                        axum::http::StatusCode::OK,
                        [("content-type", "application/octet-stream")],
                        data.clone(),
                    ),
                    None => (
                        axum::http::StatusCode::NOT_FOUND,
                        [("content-type", "text/plain")],
                        b"Not Found".to_vec(),
                    ),
                }
            }
        }),
    );

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// `<tmp>/payload`에 구버전 설치본 생성
fn create_old_install(tmpdir: &TempDir) -> PathBuf {
    let target = tmpdir.path().join("payload");
    fs::create_dir_all(target.join("sub")).unwrap();
    fs::write(target.join("a.js"), b"old a").unwrap();
    fs::write(target.join("sub").join("b.js"), b"old b").unwrap();
    target
}

fn updater_for(target: &Path, addr: SocketAddr, asset: &str) -> InjectorUpdater {
    InjectorUpdater::new(UpdateConfig {
        archive_url: format!("http://{}/download/{}", addr, asset),
        install_target: Some(target.display().to_string()),
        timeout_secs: 10,
        ..UpdateConfig::default()
    })
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

fn assert_old_install(target: &Path) {
    assert_eq!(fs::read(target.join("a.js")).unwrap(), b"old a");
    assert_eq!(fs::read(target.join("sub").join("b.js")).unwrap(), b"old b");
    assert!(!target.join("c.js").exists());
}

fn v2_assets() -> HashMap<String, Vec<u8>> {
    let mut assets = HashMap::new();
    assets.insert(
        "payload-v2.zip".to_string(),
        create_test_zip(&[("payload-v2/a.js", b"new a"), ("payload-v2/c.js", b"new c")]),
    );
    assets
}

// ═══════════════════════════════════════════════════════
// 1. 정상 교체
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_update_replaces_payload_from_wrapped_archive() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    let assets = v2_assets();
    let archive_len = assets["payload-v2.zip"].len() as u64;
    let addr = start_mock_server(assets).await;

    let updater = updater_for(&target, addr, "payload-v2.zip");
    let result = updater.run().await;
    assert_eq!(UpdateOutcome::of(&result), UpdateOutcome::Succeeded);

    let report = result.unwrap();
    assert_eq!(report.bytes_fetched, archive_len);
    assert_eq!(report.files_extracted, 2);
    assert!(report.warnings.is_empty());

    assert_eq!(fs::read(target.join("a.js")).unwrap(), b"new a");
    assert_eq!(fs::read(target.join("c.js")).unwrap(), b"new c");
    assert!(!target.join("sub").exists(), "old-only files must be gone");

    // 백업, 아카이브, 스테이징 모두 정리됨
    assert_eq!(dir_entries(tmpdir.path()), vec!["payload"]);
    assert_eq!(updater.progress().phase, UpdatePhase::Done);
}

#[tokio::test]
async fn test_update_from_flat_archive() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    let mut assets = HashMap::new();
    assets.insert(
        "flat.zip".to_string(),
        create_test_zip(&[("a.js", b"new a"), ("lib/x.js", b"x")]),
    );
    let addr = start_mock_server(assets).await;

    updater_for(&target, addr, "flat.zip").run().await.unwrap();

    assert_eq!(fs::read(target.join("a.js")).unwrap(), b"new a");
    assert_eq!(fs::read(target.join("lib").join("x.js")).unwrap(), b"x");
    assert!(!target.join("sub").exists());
    assert_eq!(dir_entries(tmpdir.path()), vec!["payload"]);
}

#[tokio::test]
async fn test_update_with_configured_archive_root() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    let mut assets = HashMap::new();
    assets.insert(
        "release.zip".to_string(),
        create_test_zip(&[
            ("README.md", b"readme"),
            ("payload-injector/a.js", b"new a"),
            ("payload-injector/c.js", b"new c"),
        ]),
    );
    let addr = start_mock_server(assets).await;

    let updater = InjectorUpdater::new(UpdateConfig {
        archive_url: format!("http://{}/download/release.zip", addr),
        install_target: Some(target.display().to_string()),
        archive_root: Some("payload-injector".to_string()),
        ..UpdateConfig::default()
    });
    updater.run().await.unwrap();

    assert_eq!(fs::read(target.join("c.js")).unwrap(), b"new c");
    assert!(!target.join("README.md").exists());
    assert_eq!(dir_entries(tmpdir.path()), vec!["payload"]);
}

// ═══════════════════════════════════════════════════════
// 2. 다운로드 실패
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_http_404_leaves_install_untouched() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    let addr = start_mock_server(HashMap::new()).await;

    let result = updater_for(&target, addr, "missing.zip").run().await;
    assert_eq!(UpdateOutcome::of(&result), UpdateOutcome::FailedRecoverable);

    let err = result.unwrap_err();
    assert_eq!(err.error_code(), "fetch_failed");
    assert!(err.to_string().contains("404"));
    assert_old_install(&target);
    assert_eq!(dir_entries(tmpdir.path()), vec!["payload"]);
}

// ═══════════════════════════════════════════════════════
// 3. 압축 해제 실패
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_corrupt_archive_is_rejected_and_cleaned() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    let mut assets = HashMap::new();
    assets.insert("broken.zip".to_string(), b"<html>maintenance</html>".to_vec());
    let addr = start_mock_server(assets).await;

    let result = updater_for(&target, addr, "broken.zip").run().await;
    assert_eq!(UpdateOutcome::of(&result), UpdateOutcome::FailedRecoverable);
    assert_eq!(result.unwrap_err().error_code(), "extract_failed");

    assert_old_install(&target);
    assert_eq!(dir_entries(tmpdir.path()), vec!["payload"]);
}

#[tokio::test]
async fn test_missing_archive_root_is_rejected() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    let addr = start_mock_server(v2_assets()).await;

    let updater = InjectorUpdater::new(UpdateConfig {
        archive_url: format!("http://{}/download/payload-v2.zip", addr),
        install_target: Some(target.display().to_string()),
        archive_root: Some("payload-injector".to_string()),
        ..UpdateConfig::default()
    });
    let err = updater.run().await.unwrap_err();
    assert_eq!(err.error_code(), "extract_failed");
    assert!(err.to_string().contains("payload-injector"));

    assert_old_install(&target);
    assert_eq!(dir_entries(tmpdir.path()), vec!["payload"]);
}

// ═══════════════════════════════════════════════════════
// 4. 잔여물 처리
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_existing_archive_is_moved_aside_not_deleted() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    fs::write(tmpdir.path().join("injector.zip"), b"manual copy").unwrap();
    let addr = start_mock_server(v2_assets()).await;

    updater_for(&target, addr, "payload-v2.zip").run().await.unwrap();
    assert_eq!(fs::read(target.join("a.js")).unwrap(), b"new a");

    let entries = dir_entries(tmpdir.path());
    let kept: Vec<&String> = entries.iter().filter(|n| n.starts_with("injector.zip.bak")).collect();
    assert_eq!(kept.len(), 1, "entries: {:?}", entries);
    assert_eq!(fs::read(tmpdir.path().join(kept[0])).unwrap(), b"manual copy");
}

#[tokio::test]
async fn test_leftover_staging_does_not_leak_into_install() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    let stale = tmpdir.path().join(".payload.staging");
    fs::create_dir_all(stale.join("payload-v1")).unwrap();
    fs::write(stale.join("payload-v1").join("junk.js"), b"junk").unwrap();
    let addr = start_mock_server(v2_assets()).await;

    updater_for(&target, addr, "payload-v2.zip").run().await.unwrap();

    assert_eq!(fs::read(target.join("a.js")).unwrap(), b"new a");
    assert!(!target.join("junk.js").exists());
    assert_eq!(dir_entries(tmpdir.path()), vec!["payload"]);
}

#[tokio::test]
async fn test_repeated_updates_converge() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    let addr = start_mock_server(v2_assets()).await;

    let updater = updater_for(&target, addr, "payload-v2.zip");
    updater.run().await.unwrap();
    updater.run().await.unwrap();

    assert_eq!(dir_entries(&target), vec!["a.js", "c.js"]);
    assert_eq!(dir_entries(tmpdir.path()), vec!["payload"]);
}

// ═══════════════════════════════════════════════════════
// 5. 설정 연동
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_update_driven_by_loader_toml() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    let addr = start_mock_server(v2_assets()).await;

    let toml_text = format!(
        r#"
        version = "0.3.0"
        latest_version = "0.3.1"

        [updater]
        archive_url = "http://{}/download/payload-v2.zip"
        install_target = "/does/not/exist"
        "#,
        addr
    );
    let mut cfg = LoaderConfig::from_toml(&toml_text).unwrap();
    cfg.apply_env_override(Some(target.display().to_string()));

    let check = payload_loader::startup::evaluate(&cfg).unwrap();
    assert!(matches!(
        check,
        payload_loader::startup::StartupCheck::UpdateAvailable { .. }
    ));

    InjectorUpdater::new(cfg.updater).run().await.unwrap();
    assert_eq!(fs::read(target.join("c.js")).unwrap(), b"new c");
}

// ═══════════════════════════════════════════════════════
// 6. 장애 주입
// ═══════════════════════════════════════════════════════

/// 조건에 맞는 rename만 실패시키는 파일시스템
struct FaultyFs {
    fail_rename: Box<dyn Fn(&Path, &Path) -> bool + Send + Sync>,
}

impl FsOps for FaultyFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if (self.fail_rename)(from, to) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected rename failure"));
        }
        RealFs.rename(from, to)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        RealFs.remove_all(path)
    }
}

fn faulty_updater(
    target: &Path,
    addr: SocketAddr,
    fail_rename: impl Fn(&Path, &Path) -> bool + Send + Sync + 'static,
) -> InjectorUpdater {
    let config = updater_for(target, addr, "payload-v2.zip").config().clone();
    InjectorUpdater::with_fs(config, Arc::new(FaultyFs { fail_rename: Box::new(fail_rename) }))
}

#[tokio::test]
async fn test_failed_swap_rolls_back_through_full_run() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    fs::write(tmpdir.path().join("injector.zip"), b"manual copy").unwrap();
    let stale = tmpdir.path().join(".payload.staging");
    fs::create_dir_all(&stale).unwrap();
    fs::write(stale.join("junk.js"), b"junk").unwrap();
    let addr = start_mock_server(v2_assets()).await;

    let swap_target = target.clone();
    let updater = faulty_updater(&target, addr, move |from, to| {
        to == swap_target && from.ends_with("payload-v2")
    });
    let result = updater.run().await;
    assert_eq!(UpdateOutcome::of(&result), UpdateOutcome::FailedRecoverable);
    assert_eq!(result.unwrap_err().error_code(), "swap_failed_recovered");

    // 설치본은 그대로, 아카이브/스테이징/백업은 정리, 사용자가 둔 아카이브만 보존
    assert_old_install(&target);
    assert_eq!(dir_entries(&target), vec!["a.js", "sub"]);
    let entries = dir_entries(tmpdir.path());
    assert_eq!(entries.len(), 2, "entries: {:?}", entries);
    assert_eq!(entries[1], "payload");
    assert!(entries[0].starts_with("injector.zip.bak"));
    assert_eq!(fs::read(tmpdir.path().join(&entries[0])).unwrap(), b"manual copy");

    assert_eq!(updater.progress().phase, UpdatePhase::Done);
    assert!(AttemptGuard::acquire(&target).is_ok(), "guard must be released after the run");
}

#[tokio::test]
async fn test_failed_rollback_through_full_run_keeps_archive_and_backup() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);
    let addr = start_mock_server(v2_assets()).await;

    // 설치 경로로 향하는 rename은 교체와 복원 모두 실패
    let swap_target = target.clone();
    let updater = faulty_updater(&target, addr, move |_, to| to == swap_target);
    let result = updater.run().await;
    assert_eq!(UpdateOutcome::of(&result), UpdateOutcome::FailedUnrecoverable);

    let err = result.unwrap_err();
    let backup = match &err {
        UpdaterError::SwapFailedUnrecovered { backup: Some(backup), .. } => PathBuf::from(backup),
        other => panic!("unexpected error: {:?}", other),
    };
    assert!(err.requires_manual_intervention());

    assert!(!target.exists());
    assert_eq!(fs::read(backup.join("a.js")).unwrap(), b"old a");
    assert_eq!(fs::read(backup.join("sub").join("b.js")).unwrap(), b"old b");
    assert!(tmpdir.path().join("injector.zip").exists(), "archive is kept for manual recovery");
    assert_eq!(updater.progress().phase, UpdatePhase::Done);
}

// ═══════════════════════════════════════════════════════
// 7. 중단된 시도
// ═══════════════════════════════════════════════════════

fn staged_file_count(staging: &Path) -> usize {
    fs::read_dir(staging.join("payload-v2")).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_update_holds_guard_until_extraction_ends() {
    let tmpdir = TempDir::new().unwrap();
    let target = create_old_install(&tmpdir);

    let names: Vec<String> = (0..20_000).map(|i| format!("payload-v2/f{:05}.js", i)).collect();
    let files: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &b"x"[..])).collect();
    let mut assets = HashMap::new();
    assets.insert("big.zip".to_string(), create_test_zip(&files));
    let addr = start_mock_server(assets).await;

    let updater = Arc::new(updater_for(&target, addr, "big.zip"));
    let task = {
        let updater = updater.clone();
        tokio::spawn(async move { updater.run().await })
    };

    let deadline = Instant::now() + Duration::from_secs(60);
    while updater.progress().phase != UpdatePhase::Extracting {
        assert!(Instant::now() < deadline, "extraction never started");
        assert!(!task.is_finished(), "run ended before extraction: {:?}", updater.progress());
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    task.abort();
    let _ = task.await;

    // 호출자는 떠났지만 압축 해제 스레드가 아직 스테이징에 쓰는 중
    let err = AttemptGuard::acquire(&target).unwrap_err();
    assert_eq!(err.error_code(), "update_in_progress");

    let guard = loop {
        match AttemptGuard::acquire(&target) {
            Ok(guard) => break guard,
            Err(_) => {
                assert!(Instant::now() < deadline, "guard was never released");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    };

    // 가드가 풀린 시점에는 더 이상 스테이징에 쓰는 스레드가 없어야 함
    let staging = tmpdir.path().join(".payload.staging");
    let settled = staged_file_count(&staging);
    assert_eq!(settled, names.len());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(staged_file_count(&staging), settled);

    drop(guard);
    assert_old_install(&target);
}
