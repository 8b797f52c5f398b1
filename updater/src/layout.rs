//! 설치 경로 기준 스테이징 레이아웃
//!
//! 모든 임시 경로는 설치 경로의 부모 디렉터리 안에 둡니다.
//! 같은 파일시스템이어야 최종 교체가 단일 rename으로 끝나기 때문입니다.

use std::path::{Component, Path, PathBuf};

use crate::UpdaterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    parent: PathBuf,
    folder_name: String,
    archive_file_name: String,
}

impl StagingLayout {
    pub fn new(install_target: &Path, archive_file_name: &str) -> Result<Self, UpdaterError> {
        let folder_name = install_target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| UpdaterError::NotConfigured {
                message: format!("install target has no folder name: {}", install_target.display()),
            })?;
        let parent = install_target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .ok_or_else(|| UpdaterError::NotConfigured {
                message: format!("install target has no parent: {}", install_target.display()),
            })?;

        let mut components = Path::new(archive_file_name).components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            return Err(UpdaterError::NotConfigured {
                message: format!("archive_file_name must be a plain file name: '{}'", archive_file_name),
            });
        }

        Ok(Self {
            parent,
            folder_name,
            archive_file_name: archive_file_name.to_string(),
        })
    }

    /// 다운로드한 아카이브 (`<parent>/injector.zip`)
    pub fn staging_archive(&self) -> PathBuf {
        self.parent.join(&self.archive_file_name)
    }

    /// 압축 해제 대상 (`<parent>/.<folder>.staging`)
    pub fn staging_dir(&self) -> PathBuf {
        self.parent.join(format!(".{}.staging", self.folder_name))
    }
}
