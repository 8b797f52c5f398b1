//! 로더 설정 파일 관리
//!
//! `config/loader.toml`에서 로더 버전 정보와 `[updater]` 섹션을 로드합니다.
//! 설치 경로는 외부 설정 저장소가 소유하므로 `PAYLOAD_INJECTION_PATH` 환경 변수가 파일보다 우선합니다.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use payload_updater_lib::UpdateConfig;

use crate::LoaderError;

/// 설치 경로를 덮어쓰는 환경 변수
pub const INJECTION_PATH_ENV: &str = "PAYLOAD_INJECTION_PATH";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// 실행 중인 payload 버전
    pub version: String,
    pub min_supported_version: Option<String>,
    /// 게시된 최신 버전
    pub latest_version: Option<String>,
    pub updater: UpdateConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            min_supported_version: None,
            latest_version: None,
            updater: UpdateConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// 설정 로드: 명시 경로 → 실행 파일 옆 → CWD → 기본값, 이후 환경 변수 적용
    pub fn load(explicit: Option<&Path>) -> Result<Self, LoaderError> {
        let mut cfg = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match config_file_path() {
                Some(path) => Self::from_file(&path)?,
                None => {
                    tracing::debug!("[Config] No loader.toml found, using defaults");
                    Self::default()
                }
            },
        };
        cfg.apply_env_override(std::env::var(INJECTION_PATH_ENV).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, LoaderError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoaderError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_toml(&content).map_err(|source| LoaderError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("[Config] Loaded {}", path.display());
        Ok(cfg)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// 비어 있지 않은 값만 설치 경로를 덮어씀
    pub fn apply_env_override(&mut self, injection_path: Option<String>) {
        if let Some(path) = injection_path.filter(|p| !p.trim().is_empty()) {
            tracing::debug!("[Config] install_target overridden by {}", INJECTION_PATH_ENV);
            self.updater.install_target = Some(path);
        }
    }
}

/// 존재하는 설정 파일 경로 탐색
pub fn config_file_path() -> Option<PathBuf> {
    // 1. 실행 파일 옆 config/loader.toml
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let cfg = dir.join("config").join("loader.toml");
            if cfg.exists() {
                return Some(cfg);
            }
        }
    }

    // 2. CWD의 config/loader.toml
    let cwd_cfg = PathBuf::from("config").join("loader.toml");
    if cwd_cfg.exists() {
        return Some(cwd_cfg);
    }

    None
}
