//! 파일시스템 변경 연산 추상화
//!
//! 백업 매니저와 교체(swap) 단계는 rename/삭제를 모두 이 트레잇을 통해 수행합니다.
//! 테스트에서는 특정 경로의 rename을 실패시키는 구현을 주입해 롤백 경로를 검증합니다.

use std::fs;
use std::io;
use std::path::Path;

/// 설치 경로에 영향을 주는 파일시스템 연산
pub trait FsOps: Send + Sync {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// 디렉터리면 재귀 삭제, 파일이면 단일 삭제
    fn remove_all(&self, path: &Path) -> io::Result<()>;
}

/// 실제 파일시스템
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl FsOps for RealFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let metadata = fs::symlink_metadata(path)?;
        if metadata.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }
}

/// 존재하면 삭제, 없으면 성공
pub fn remove_if_exists(fs_ops: &dyn FsOps, path: &Path) -> io::Result<()> {
    match fs_ops.remove_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
