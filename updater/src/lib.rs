//! # payload 업데이터 라이브러리
//!
//! 호스트 애플리케이션에 주입되는 payload 디렉터리를 새 버전으로 교체합니다.
//! 교체 도중 어떤 단계가 실패해도 호스트가 사용할 수 없는 상태로 남지 않도록
//! 기존 설치본을 백업하고 필요하면 되돌립니다.
//!
//! ## 동작 원리
//! `Idle → Fetching → BackingUp → Extracting → Swapping → CleaningUp → Done`
//!
//! - **Fetching(fetch.rs)**: 아카이브를 `<parent>/injector.zip`으로 다운로드
//! - **BackingUp(backup.rs)**: 이전 실행이 남긴 스테이징 디렉터리를 옆으로 옮김
//! - **Extracting(extract.rs)**: `<parent>/.<folder>.staging`에 압축 해제, 래핑 폴더 탐색
//! - **Swapping(swap.rs)**: 설치 경로 백업 → 새 트리를 rename으로 배치, 실패 시 롤백
//! - **CleaningUp(swap.rs)**: 백업/아카이브/스테이징 정리 (실패해도 경고만)
//!
//! Swapping 이전 단계는 모두 버려도 되는 스테이징 경로만 다루므로
//! 설치 경로가 위험해지는 구간은 rename 한 쌍으로 제한됩니다.
//! Extracting과 Swapping부터는 별도 blocking 태스크에서 실행되어 호출자가 기다림을 포기해도 끝까지 진행되며,
//! 시도 가드는 그 태스크가 끝날 때까지 해제되지 않습니다.
//!
//! ## 설정 예시 (`[updater]` 섹션)
//! ```toml
//! [updater]
//! enabled = true
//! archive_url = "https://example.invalid/injector.zip"
//! install_target = "/opt/app/payload"
//! archive_root = "payload-injector"
//! ```

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod backup;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod fs_ops;
pub mod guard;
pub mod layout;
pub mod swap;
pub mod version;


pub use backup::{BackupEntry, BackupManager};
pub use error::{ErrorContext, UpdateOutcome, UpdaterError};
pub use extract::{extract_archive, ExtractSummary};
pub use fetch::ArchiveFetcher;
pub use fs_ops::{FsOps, RealFs};
pub use guard::AttemptGuard;
pub use layout::StagingLayout;
pub use version::{Availability, SemVer};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use swap::SwapPlan;

// ══════════════════════════════════════════════════════
// 설정 / 상태 정의
// ══════════════════════════════════════════════════════

/// 업데이트 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdateConfig {
    pub enabled: bool,
    /// 새 버전 아카이브 URL
    pub archive_url: String,
    /// 현재 payload가 설치된 디렉터리 (외부 설정 저장소가 소유)
    pub install_target: Option<String>,
    /// 다운로드 파일 이름 (설치 경로의 부모 디렉터리에 저장)
    pub archive_file_name: String,
    /// 아카이브 안의 래핑 폴더 이름. 없으면 단일 최상위 폴더를 자동 감지
    pub archive_root: Option<String>,
    /// HTTP 요청 타임아웃 (초)
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            archive_url: String::new(),
            install_target: None,
            archive_file_name: "injector.zip".to_string(),
            archive_root: None,
            timeout_secs: 60,
            user_agent: None,
        }
    }
}

/// 업데이트 단계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    #[default]
    Idle,
    Fetching,
    BackingUp,
    Extracting,
    Swapping,
    RollingBack,
    CleaningUp,
    Done,
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdatePhase::Idle => "idle",
            UpdatePhase::Fetching => "fetching",
            UpdatePhase::BackingUp => "backing_up",
            UpdatePhase::Extracting => "extracting",
            UpdatePhase::Swapping => "swapping",
            UpdatePhase::RollingBack => "rolling_back",
            UpdatePhase::CleaningUp => "cleaning_up",
            UpdatePhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// 진행 상태
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProgress {
    pub phase: UpdatePhase,
    pub message: String,
}

/// 단계 전이를 기록하고 로그로 남김
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: RwLock<UpdateProgress>,
}

impl ProgressTracker {
    pub fn enter(&self, phase: UpdatePhase, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(phase = %phase, "[Updater] {}", message);
        let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = UpdateProgress { phase, message };
    }

    pub fn snapshot(&self) -> UpdateProgress {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// 성공 후 정리 단계에서 지우지 못한 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupWarning {
    pub path: String,
    pub message: String,
}

/// 성공한 업데이트 요약
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReport {
    pub install_target: PathBuf,
    pub bytes_fetched: u64,
    pub files_extracted: usize,
    /// 정리 경고 (결과는 여전히 성공)
    pub warnings: Vec<CleanupWarning>,
}

// ══════════════════════════════════════════════════════
// InjectorUpdater
// ══════════════════════════════════════════════════════

/// 다운로드 → 백업 → 압축 해제 → 교체 → 정리를 순서대로 수행하는 오케스트레이터
pub struct InjectorUpdater {
    config: UpdateConfig,
    fs: Arc<dyn FsOps>,
    progress: Arc<ProgressTracker>,
}

impl InjectorUpdater {
    pub fn new(config: UpdateConfig) -> Self {
        Self::with_fs(config, Arc::new(RealFs))
    }

    /// rename/삭제 연산을 교체한 업데이터 (장애 주입용)
    pub fn with_fs(config: UpdateConfig, fs: Arc<dyn FsOps>) -> Self {
        Self {
            config,
            fs,
            progress: Arc::new(ProgressTracker::default()),
        }
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// 현재 진행 상태 조회
    pub fn progress(&self) -> UpdateProgress {
        self.progress.snapshot()
    }

    /// 설정된 설치 경로. 미설정이거나 디스크에 없으면 `NotConfigured`
    pub fn install_target(&self) -> Result<PathBuf, UpdaterError> {
        let raw = self
            .config
            .install_target
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| UpdaterError::NotConfigured {
                message: "install_target is not set".to_string(),
            })?;

        let path = PathBuf::from(raw);
        if !path.is_dir() {
            return Err(UpdaterError::NotConfigured {
                message: format!("install target does not exist: {}", path.display()),
            });
        }
        Ok(path)
    }

    /// 업데이트 1회 실행
    ///
    /// `UpdateOutcome::of(&result)`로 3상태 판정을 얻을 수 있습니다.
    pub async fn run(&self) -> Result<UpdateReport, UpdaterError> {
        let result = self.run_steps().await;

        match &result {
            Ok(report) => {
                self.progress.enter(
                    UpdatePhase::Done,
                    format!(
                        "Payload updated at {} ({} cleanup warnings)",
                        report.install_target.display(),
                        report.warnings.len()
                    ),
                );
            }
            Err(e) => {
                let phase = self.progress.snapshot().phase;
                let mut ctx = ErrorContext::new(&phase.to_string(), e.clone());
                if let Some(target) = self.config.install_target.as_deref() {
                    ctx = ctx.with_install_target(Path::new(target));
                }
                ctx.log();
                self.progress.enter(UpdatePhase::Done, format!("Update failed: {}", e.error_code()));
            }
        }
        result
    }

    async fn run_steps(&self) -> Result<UpdateReport, UpdaterError> {
        let target = self.install_target()?;
        if self.config.archive_url.trim().is_empty() {
            return Err(UpdaterError::NotConfigured {
                message: "archive_url is not set".to_string(),
            });
        }

        // 압축 해제와 교체는 blocking 스레드에서 끝까지 진행되므로 가드를 함께 넘긴다
        let guard = Arc::new(AttemptGuard::acquire(&target)?);
        tracing::debug!(key = %guard.install_target().display(), "[Updater] Attempt guard acquired");
        let layout = StagingLayout::new(&target, &self.config.archive_file_name)?;
        let backups = BackupManager::new(self.fs.clone());
        let archive = layout.staging_archive();
        let staging_dir = layout.staging_dir();

        // ─── 1. 다운로드 ───
        self.progress.enter(
            UpdatePhase::Fetching,
            format!("Downloading {} -> {}", self.config.archive_url, archive.display()),
        );
        let fetcher = ArchiveFetcher::new(
            Duration::from_secs(self.config.timeout_secs),
            self.config.user_agent.as_deref(),
        )?;
        let bytes_fetched = fetcher
            .fetch_to_file(&self.config.archive_url, &archive, &backups)
            .await?;

        // ─── 2. 이전 스테이징 잔여물 백업 ───
        self.progress.enter(
            UpdatePhase::BackingUp,
            format!("Checking for leftover staging at {}", staging_dir.display()),
        );
        let stale = match backups.backup(&staging_dir) {
            Ok(stale) => stale,
            Err(e) => {
                self.remove_quietly(&archive);
                return Err(UpdaterError::ExtractFailed {
                    archive: archive.display().to_string(),
                    message: format!("leftover staging directory could not be moved aside: {}", e),
                });
            }
        };

        // ─── 3. 압축 해제 ───
        self.progress.enter(
            UpdatePhase::Extracting,
            format!("Extracting {} -> {}", archive.display(), staging_dir.display()),
        );
        let extracted = {
            let (archive, staging_dir) = (archive.clone(), staging_dir.clone());
            let guard = guard.clone();
            tokio::task::spawn_blocking(move || {
                let _guard = guard;
                extract_archive(&archive, &staging_dir)
            })
                .await
                .unwrap_or_else(|e| {
                    Err(UpdaterError::ExtractFailed {
                        archive: String::new(),
                        message: format!("extraction task failed: {}", e),
                    })
                })
        };
        let located = extracted.and_then(|summary| {
            tracing::debug!(
                files = summary.files,
                directories = summary.directories,
                "[Updater] Extracted top-level entries: {:?}",
                summary.top_level
            );
            locate_tree(&staging_dir, self.config.archive_root.as_deref()).map(|tree| (summary, tree))
        });
        let (summary, tree) = match located {
            Ok(v) => v,
            Err(e) => {
                self.remove_quietly(&staging_dir);
                self.remove_quietly(&archive);
                if let Some(stale) = stale {
                    if let Err(d) = backups.discard(stale) {
                        tracing::warn!("[Updater] {}", d);
                    }
                }
                return Err(e);
            }
        };

        // ─── 4~5. 교체 + 정리 (중단 불가) ───
        let plan = SwapPlan {
            install_target: target.clone(),
            tree,
            staging_dir,
            staging_archive: archive,
            stale_staging: stale,
        };
        let fs = self.fs.clone();
        let progress = self.progress.clone();
        let warnings = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let backups = BackupManager::new(fs.clone());
            swap::swap_and_cleanup(plan, &backups, fs.as_ref(), &progress)
        })
        .await
        .map_err(|e| UpdaterError::SwapFailedUnrecovered {
            install_target: target.display().to_string(),
            backup: None,
            message: format!("swap task aborted: {}", e),
        })??;

        Ok(UpdateReport {
            install_target: target,
            bytes_fetched,
            files_extracted: summary.files,
            warnings,
        })
    }

    fn remove_quietly(&self, path: &Path) {
        if let Err(e) = fs_ops::remove_if_exists(self.fs.as_ref(), path) {
            tracing::warn!(path = %path.display(), error = %e, "[Updater] Failed to remove staging leftover");
        }
    }
}

/// 압축 해제된 트리 위치 결정
///
/// `archive_root`가 지정되면 해당 폴더가 반드시 있어야 하고,
/// 없으면 최상위 항목이 디렉터리 하나뿐일 때 그 디렉터리를 래핑 폴더로 봅니다.
fn locate_tree(staging_dir: &Path, archive_root: Option<&str>) -> Result<PathBuf, UpdaterError> {
    let fail = |message: String| UpdaterError::ExtractFailed {
        archive: staging_dir.display().to_string(),
        message,
    };

    if let Some(root) = archive_root.map(str::trim).filter(|r| !r.is_empty()) {
        let rel = Path::new(root);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(fail(format!("invalid archive_root '{}'", root)));
        }
        let candidate = staging_dir.join(rel);
        if candidate.is_dir() {
            return Ok(candidate);
        }
        return Err(fail(format!("expected folder '{}' not found in archive", root)));
    }

    let entries: Vec<PathBuf> = std::fs::read_dir(staging_dir)
        .map_err(|e| fail(e.to_string()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(|e| fail(e.to_string()))?;

    match entries.as_slice() {
        [] => Err(fail("archive is empty".to_string())),
        [only] if only.is_dir() => Ok(only.clone()),
        _ => Ok(staging_dir.to_path_buf()),
    }
}
