//! 백업 매니저: 덮어쓰기 전에 기존 항목을 옆으로 rename
//!
//! ## 불변 조건
//! - `backup`은 절대 삭제하지 않고 rename만 합니다. 데이터 손실은 명시적인 `discard`로만 발생합니다.
//! - 백업 이름은 `<name>.bak<millis>` 이며 이미 존재하면 `-<n>`을 덧붙여 기존 백업을 덮어쓰지 않습니다.
//! - `restore`/`discard`는 `BackupEntry`를 소비하므로 한 항목은 정확히 한 번만 해소됩니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fs_ops::{FsOps, RealFs};
use crate::UpdaterError;

/// rename으로 옮겨둔 백업 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// 원래 위치
    pub original: PathBuf,
    /// 백업 위치 (원래 위치의 형제 경로)
    pub backup: PathBuf,
    /// 백업 시각 (RFC3339)
    pub created_at: String,
}

pub struct BackupManager {
    fs: Arc<dyn FsOps>,
}

impl Default for BackupManager {
    fn default() -> Self {
        Self::new(Arc::new(RealFs))
    }
}

impl BackupManager {
    pub fn new(fs: Arc<dyn FsOps>) -> Self {
        Self { fs }
    }

    /// `path`를 사용되지 않은 형제 이름으로 옮긴다. 경로가 없으면 `Ok(None)`.
    pub fn backup(&self, path: &Path) -> Result<Option<BackupEntry>, UpdaterError> {
        if std::fs::symlink_metadata(path).is_err() {
            return Ok(None);
        }

        let backup = unique_backup_path(path).ok_or_else(|| UpdaterError::BackupFailed {
            path: path.display().to_string(),
            message: "path has no file name".to_string(),
        })?;

        self.fs.rename(path, &backup).map_err(|e| UpdaterError::BackupFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        tracing::info!("[Backup] {} -> {}", path.display(), backup.display());
        Ok(Some(BackupEntry {
            original: path.to_path_buf(),
            backup,
            created_at: chrono::Utc::now().to_rfc3339(),
        }))
    }

    /// 백업을 원래 위치로 되돌린다
    pub fn restore(&self, entry: BackupEntry) -> Result<(), UpdaterError> {
        let fail = |message: String| UpdaterError::RestoreFailed {
            original: entry.original.display().to_string(),
            backup: entry.backup.display().to_string(),
            message,
        };

        if std::fs::symlink_metadata(&entry.original).is_ok() {
            return Err(fail("original location is occupied".to_string()));
        }
        if std::fs::symlink_metadata(&entry.backup).is_err() {
            return Err(fail("backup is missing".to_string()));
        }

        self.fs
            .rename(&entry.backup, &entry.original)
            .map_err(|e| fail(e.to_string()))?;

        tracing::info!("[Backup] Restored {} <- {}", entry.original.display(), entry.backup.display());
        Ok(())
    }

    /// 백업을 재귀적으로 삭제한다
    pub fn discard(&self, entry: BackupEntry) -> Result<(), UpdaterError> {
        crate::fs_ops::remove_if_exists(self.fs.as_ref(), &entry.backup).map_err(|e| {
            UpdaterError::DiscardFailed {
                backup: entry.backup.display().to_string(),
                message: e.to_string(),
            }
        })?;
        tracing::debug!("[Backup] Discarded {}", entry.backup.display());
        Ok(())
    }
}

/// `<name>.bak<millis>`, 충돌 시 `<name>.bak<millis>-<n>`
fn unique_backup_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy().to_string();
    let stamp = chrono::Utc::now().timestamp_millis();
    let base = format!("{}.bak{}", name, stamp);

    let mut candidate = path.with_file_name(&base);
    let mut counter = 1u32;
    while std::fs::symlink_metadata(&candidate).is_ok() {
        candidate = path.with_file_name(format!("{}-{}", base, counter));
        counter += 1;
    }
    Some(candidate)
}
