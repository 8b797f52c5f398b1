//! 에러 분류 및 결과 판정
//!
//! ## 지원하는 에러 상황
//! - 설치 경로 미설정
//! - 다운로드 실패 (네트워크 끊김, HTTP 오류, 디스크 쓰기 실패)
//! - 압축 해제 실패 (손상된 아카이브, 경로 탈출)
//! - 교체(swap) 실패: 복구 성공 / 복구 실패
//! - 백업 관리 실패 (백업, 복원, 삭제)

use std::fmt;
use std::path::Path;
use serde::{Deserialize, Serialize};

/// 업데이터 에러 타입
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum UpdaterError {
    /// 설치 경로가 설정되지 않았거나 존재하지 않음: 아무것도 건드리지 않음
    NotConfigured {
        message: String,
    },
    /// 같은 설치 경로에 대해 이미 업데이트가 진행 중
    UpdateInProgress {
        install_target: String,
    },
    /// 아카이브 다운로드 실패
    FetchFailed {
        url: String,
        status_code: Option<u16>,
        message: String,
    },
    /// 아카이브 압축 해제 실패
    ExtractFailed {
        archive: String,
        message: String,
    },
    /// 교체 실패, 원본 복구 완료
    SwapFailedRecovered {
        install_target: String,
        message: String,
    },
    /// 교체 실패 + 복구 실패: 수동 조치 필요
    SwapFailedUnrecovered {
        install_target: String,
        backup: Option<String>,
        message: String,
    },
    /// 백업(rename) 실패
    BackupFailed {
        path: String,
        message: String,
    },
    /// 백업 복원 실패
    RestoreFailed {
        original: String,
        backup: String,
        message: String,
    },
    /// 백업 삭제 실패 (치명적이지 않음)
    DiscardFailed {
        backup: String,
        message: String,
    },
}

impl fmt::Display for UpdaterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdaterError::NotConfigured { message } => {
                write!(f, "Update not configured: {}", message)
            }
            UpdaterError::UpdateInProgress { install_target } => {
                write!(f, "An update is already in progress for '{}'", install_target)
            }
            UpdaterError::FetchFailed { url, status_code: Some(code), message } => {
                write!(f, "Failed to fetch {} (HTTP {}): {}", url, code, message)
            }
            UpdaterError::FetchFailed { url, status_code: None, message } => {
                write!(f, "Failed to fetch {}: {}", url, message)
            }
            UpdaterError::ExtractFailed { archive, message } => {
                write!(f, "Failed to extract '{}': {}", archive, message)
            }
            UpdaterError::SwapFailedRecovered { install_target, message } => {
                write!(
                    f,
                    "Failed to replace '{}', previous install restored: {}",
                    install_target, message
                )
            }
            UpdaterError::SwapFailedUnrecovered { install_target, backup, message } => {
                write!(
                    f,
                    "Failed to replace '{}' and could not restore it (backup: {}): {}",
                    install_target,
                    backup.as_deref().unwrap_or("none"),
                    message
                )
            }
            UpdaterError::BackupFailed { path, message } => {
                write!(f, "Failed to back up '{}': {}", path, message)
            }
            UpdaterError::RestoreFailed { original, backup, message } => {
                write!(f, "Failed to restore '{}' from '{}': {}", original, backup, message)
            }
            UpdaterError::DiscardFailed { backup, message } => {
                write!(f, "Failed to discard backup '{}': {}", backup, message)
            }
        }
    }
}

impl std::error::Error for UpdaterError {}

/// 업데이트 시도의 최종 판정 (3상태)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// 새 버전 설치 완료
    Succeeded,
    /// 실패했지만 설치 경로는 업데이트 전 상태 그대로
    FailedRecoverable,
    /// 설치 경로가 없거나 불확실한 상태: 사람이 개입해야 함
    FailedUnrecoverable,
}

impl UpdateOutcome {
    /// 업데이트 결과로부터 판정
    pub fn of<T>(result: &Result<T, UpdaterError>) -> Self {
        match result {
            Ok(_) => UpdateOutcome::Succeeded,
            Err(e) => e.outcome(),
        }
    }
}

impl UpdaterError {
    /// 이 에러로 끝난 업데이트의 판정
    pub fn outcome(&self) -> UpdateOutcome {
        match self {
            UpdaterError::SwapFailedUnrecovered { .. } => UpdateOutcome::FailedUnrecoverable,
            _ => UpdateOutcome::FailedRecoverable,
        }
    }

    /// 자동 복구가 이미 소진되어 사람에게 알려야 하는지
    pub fn requires_manual_intervention(&self) -> bool {
        self.outcome() == UpdateOutcome::FailedUnrecoverable
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            UpdaterError::NotConfigured { .. } => "not_configured",
            UpdaterError::UpdateInProgress { .. } => "update_in_progress",
            UpdaterError::FetchFailed { .. } => "fetch_failed",
            UpdaterError::ExtractFailed { .. } => "extract_failed",
            UpdaterError::SwapFailedRecovered { .. } => "swap_failed_recovered",
            UpdaterError::SwapFailedUnrecovered { .. } => "swap_failed_unrecovered",
            UpdaterError::BackupFailed { .. } => "backup_failed",
            UpdaterError::RestoreFailed { .. } => "restore_failed",
            UpdaterError::DiscardFailed { .. } => "discard_failed",
        }
    }

    /// 사용자에게 표시할 메시지
    pub fn user_message(&self) -> String {
        match self {
            UpdaterError::NotConfigured { .. } => {
                "설치 경로가 설정되지 않아 업데이트를 건너뜁니다.".to_string()
            }
            UpdaterError::UpdateInProgress { .. } => {
                "이미 업데이트가 진행 중입니다. 잠시 후 다시 시도해주세요.".to_string()
            }
            UpdaterError::FetchFailed { status_code: Some(404), .. } => {
                "요청한 업데이트를 찾을 수 없습니다.".to_string()
            }
            UpdaterError::FetchFailed { status_code: Some(code), .. } if *code >= 500 => {
                "서버에 일시적인 문제가 있습니다. 잠시 후 다시 시도해주세요.".to_string()
            }
            UpdaterError::FetchFailed { .. } => {
                "업데이트를 내려받지 못했습니다. 인터넷 연결을 확인해주세요.".to_string()
            }
            UpdaterError::ExtractFailed { .. } => {
                "업데이트 파일이 손상되었습니다. 기존 버전을 그대로 사용합니다.".to_string()
            }
            UpdaterError::SwapFailedRecovered { .. } => {
                "업데이트 적용에 실패하여 기존 버전으로 되돌렸습니다.".to_string()
            }
            UpdaterError::SwapFailedUnrecovered { backup, .. } => match backup {
                Some(path) => format!(
                    "업데이트 적용과 복구에 모두 실패했습니다. '{}' 백업을 수동으로 복원해주세요.",
                    path
                ),
                None => "업데이트 적용과 복구에 모두 실패했습니다. 수동으로 다시 설치해주세요."
                    .to_string(),
            },
            UpdaterError::BackupFailed { .. }
            | UpdaterError::RestoreFailed { .. }
            | UpdaterError::DiscardFailed { .. } => {
                "파일 정리 중 오류가 발생했습니다. 디스크 권한을 확인해주세요.".to_string()
            }
        }
    }

    /// reqwest 에러를 UpdaterError로 변환
    pub fn from_reqwest(err: &reqwest::Error, url: &str) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };
        UpdaterError::FetchFailed {
            url: url.to_string(),
            status_code: err.status().map(|s| s.as_u16()),
            message,
        }
    }

    /// 다운로드 중 IO 에러를 UpdaterError로 변환
    pub fn from_io(err: &std::io::Error, url: &str, path: &Path) -> Self {
        UpdaterError::FetchFailed {
            url: url.to_string(),
            status_code: None,
            message: format!("{}: {}", path.display(), err),
        }
    }
}

/// 에러 컨텍스트 (로깅용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub timestamp: String,
    pub phase: String,
    pub install_target: Option<String>,
    pub error: UpdaterError,
}

impl ErrorContext {
    pub fn new(phase: &str, error: UpdaterError) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            phase: phase.to_string(),
            install_target: None,
            error,
        }
    }

    pub fn with_install_target(mut self, path: &Path) -> Self {
        self.install_target = Some(path.display().to_string());
        self
    }

    /// 로그 출력: 복구 불가 에러만 error 레벨
    pub fn log(&self) {
        let target = self.install_target.as_deref().unwrap_or("N/A");
        if self.error.requires_manual_intervention() {
            tracing::error!(
                phase = %self.phase,
                code = self.error.error_code(),
                "[Updater] {} - {} (UNRECOVERABLE, manual intervention required): {}",
                self.phase,
                target,
                self.error
            );
        } else {
            tracing::warn!(
                phase = %self.phase,
                code = self.error.error_code(),
                "[Updater] {} - {} (recoverable): {}",
                self.phase,
                target,
                self.error
            );
        }
    }
}
