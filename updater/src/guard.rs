//! 설치 경로별 단일 업데이트 보장
//!
//! 같은 설치 경로에 대한 두 번째 시도는 대기하지 않고 즉시 거부합니다.
//! 가드는 압축 해제와 교체/정리 blocking 작업이 `Arc`로 함께 붙잡으므로, 호출자가 future를 버려도
//! 압축 해제, 롤백, 정리가 끝나기 전에는 해제되지 않습니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::UpdaterError;

fn active_targets() -> &'static Mutex<HashSet<PathBuf>> {
    static ACTIVE: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

/// 진행 중인 업데이트 시도 표식 (Drop 시 해제)
#[derive(Debug)]
pub struct AttemptGuard {
    key: PathBuf,
}

impl AttemptGuard {
    pub fn acquire(install_target: &Path) -> Result<Self, UpdaterError> {
        let key = std::fs::canonicalize(install_target).unwrap_or_else(|_| install_target.to_path_buf());
        let mut active = active_targets()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !active.insert(key.clone()) {
            return Err(UpdaterError::UpdateInProgress {
                install_target: install_target.display().to_string(),
            });
        }
        Ok(Self { key })
    }

    pub fn install_target(&self) -> &Path {
        &self.key
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        let mut active = active_targets()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.key);
    }
}
