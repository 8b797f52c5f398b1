//! 로더 에러 타입: 설정/버전 오류와 업데이터 오류를 구분하여
//! CLI가 적절한 종료 코드와 JSON 응답을 만들 수 있게 합니다.

use std::path::PathBuf;

use payload_updater_lib::UpdaterError;

#[derive(thiserror::Error, Debug)]
pub enum LoaderError {
    #[error("Failed to read config '{}': {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config '{}': {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid {field} '{value}'")]
    InvalidVersion { field: &'static str, value: String },

    #[error(transparent)]
    Update(#[from] UpdaterError),
}

impl LoaderError {
    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigRead { .. } => "CONFIG_READ",
            Self::ConfigParse { .. } => "CONFIG_PARSE",
            Self::InvalidVersion { .. } => "INVALID_VERSION",
            Self::Update(e) => e.error_code(),
        }
    }

    /// JSON 에러 응답 생성
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }
}
