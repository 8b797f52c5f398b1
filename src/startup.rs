//! 시작 시 버전 판정
//!
//! 로더는 실행 전에 자신의 버전이 지원되는지, 게시된 최신 버전이 있는지 확인합니다.

use payload_updater_lib::version::{availability, Availability, SemVer};

use crate::config::LoaderConfig;
use crate::LoaderError;

pub type StartupCheck = Availability;

/// 설정에 기록된 버전들로 시작 가능 여부 판정
pub fn evaluate(config: &LoaderConfig) -> Result<StartupCheck, LoaderError> {
    let current = parse("version", &config.version)?;
    let minimum = config
        .min_supported_version
        .as_deref()
        .map(|v| parse("min_supported_version", v))
        .transpose()?;
    let latest = config
        .latest_version
        .as_deref()
        .map(|v| parse("latest_version", v))
        .transpose()?;

    let check = availability(&current, latest.as_ref(), minimum.as_ref());
    match &check {
        Availability::Unsupported { current, minimum } => {
            tracing::warn!("[Startup] Version {} is below minimum supported {}", current, minimum);
        }
        Availability::UpdateAvailable { current, latest } => {
            tracing::info!("[Startup] Update available: {} -> {}", current, latest);
        }
        Availability::UpToDate { current } => {
            tracing::debug!("[Startup] Version {} is up to date", current);
        }
    }
    Ok(check)
}

fn parse(field: &'static str, value: &str) -> Result<SemVer, LoaderError> {
    SemVer::parse(value).ok_or_else(|| LoaderError::InvalidVersion {
        field,
        value: value.to_string(),
    })
}
