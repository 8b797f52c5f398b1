//! 설치 경로 교체 및 정리
//!
//! 설치 경로를 백업 이름으로 옮긴 직후 새 트리를 rename으로 들여놓습니다.
//! 두 번째 rename이 실패하면 고아가 된 새 트리를 지우고 백업을 되돌립니다.
//! 되돌리기까지 실패한 경우만 `SwapFailedUnrecovered`이며, 이때는 아카이브를 남겨둡니다.
//!
//! 이 모듈의 함수는 동기식이며 blocking 태스크에서 끝까지 실행됩니다.

use std::path::{Path, PathBuf};

use crate::backup::{BackupEntry, BackupManager};
use crate::fs_ops::{self, FsOps};
use crate::{CleanupWarning, ProgressTracker, UpdatePhase, UpdaterError};

/// 교체에 필요한 경로 묶음
#[derive(Debug)]
pub struct SwapPlan {
    pub install_target: PathBuf,
    /// 설치 경로로 옮길 트리 (스테이징 디렉터리 자체이거나 그 안의 래핑 폴더)
    pub tree: PathBuf,
    pub staging_dir: PathBuf,
    pub staging_archive: PathBuf,
    /// 이번 시도 전에 남아 있던 스테이징 디렉터리의 백업
    pub stale_staging: Option<BackupEntry>,
}

pub fn swap_and_cleanup(
    plan: SwapPlan,
    backups: &BackupManager,
    fs: &dyn FsOps,
    progress: &ProgressTracker,
) -> Result<Vec<CleanupWarning>, UpdaterError> {
    let target_display = plan.install_target.display().to_string();

    progress.enter(
        UpdatePhase::Swapping,
        format!("Moving {} into {}", plan.tree.display(), target_display),
    );

    // 4a. 아직 아무것도 바뀌지 않았으므로 실패해도 복구 완료 상태
    let previous = match backups.backup(&plan.install_target) {
        Ok(previous) => previous,
        Err(e) => {
            tidy(&plan.staging_archive, &plan.staging_dir, plan.stale_staging, backups, fs);
            return Err(UpdaterError::SwapFailedRecovered {
                install_target: target_display,
                message: format!("could not move current install aside: {}", e),
            });
        }
    };

    // 4b. 새 트리 배치
    if let Err(swap_err) = fs.rename(&plan.tree, &plan.install_target) {
        progress.enter(
            UpdatePhase::RollingBack,
            format!("Swap failed ({}), restoring previous install", swap_err),
        );

        // 4c. 고아 트리를 먼저 지워야 복원 대상 자리가 비어 있음
        if let Err(e) = fs_ops::remove_if_exists(fs, &plan.tree) {
            tracing::warn!(path = %plan.tree.display(), error = %e, "[Updater] Failed to remove orphaned tree");
        }

        if let Some(entry) = previous {
            let backup_display = entry.backup.display().to_string();
            if let Err(restore_err) = backups.restore(entry) {
                // 호출자가 결과를 기다리지 않을 수도 있으므로 여기서 바로 기록
                tracing::error!(
                    phase = %UpdatePhase::RollingBack,
                    path = %backup_display,
                    error = %restore_err,
                    "[Updater] Rollback failed, previous install is at {} (archive kept at {})",
                    backup_display,
                    plan.staging_archive.display()
                );
                // 아카이브는 수동 복구용으로 남김
                return Err(UpdaterError::SwapFailedUnrecovered {
                    install_target: target_display,
                    backup: Some(backup_display),
                    message: format!("{}; rollback failed: {}", swap_err, restore_err),
                });
            }
        }

        // 설치 경로가 시도 도중 외부에서 사라졌다면 되돌릴 것이 없어도 복구된 상태가 아님
        if std::fs::symlink_metadata(&plan.install_target).is_err() {
            tracing::error!(
                phase = %UpdatePhase::RollingBack,
                path = %target_display,
                "[Updater] Install target is missing after failed swap (archive kept at {})",
                plan.staging_archive.display()
            );
            return Err(UpdaterError::SwapFailedUnrecovered {
                install_target: target_display,
                backup: None,
                message: format!("{}; install target is missing", swap_err),
            });
        }

        tidy(&plan.staging_archive, &plan.staging_dir, plan.stale_staging, backups, fs);
        return Err(UpdaterError::SwapFailedRecovered {
            install_target: target_display,
            message: swap_err.to_string(),
        });
    }

    // 5. 정리: 여기서부터는 실패해도 성공
    progress.enter(UpdatePhase::CleaningUp, "Removing backups and staging leftovers");
    let mut warnings = Vec::new();
    if let Some(entry) = previous {
        let path = entry.backup.display().to_string();
        if let Err(e) = backups.discard(entry) {
            tracing::warn!("[Updater] {}", e);
            warnings.push(CleanupWarning { path, message: e.to_string() });
        }
    }
    warnings.extend(tidy(
        &plan.staging_archive,
        &plan.staging_dir,
        plan.stale_staging,
        backups,
        fs,
    ));
    Ok(warnings)
}

/// 아카이브, 스테이징 디렉터리, 이전 스테이징 백업을 지운다 (best-effort)
pub(crate) fn tidy(
    archive: &Path,
    staging_dir: &Path,
    stale_staging: Option<BackupEntry>,
    backups: &BackupManager,
    fs: &dyn FsOps,
) -> Vec<CleanupWarning> {
    let mut warnings = Vec::new();

    for path in [archive, staging_dir] {
        if let Err(e) = fs_ops::remove_if_exists(fs, path) {
            tracing::warn!(path = %path.display(), error = %e, "[Updater] Cleanup could not remove entry");
            warnings.push(CleanupWarning {
                path: path.display().to_string(),
                message: e.to_string(),
            });
        }
    }

    if let Some(entry) = stale_staging {
        let path = entry.backup.display().to_string();
        if let Err(e) = backups.discard(entry) {
            tracing::warn!("[Updater] {}", e);
            warnings.push(CleanupWarning { path, message: e.to_string() });
        }
    }

    warnings
}
