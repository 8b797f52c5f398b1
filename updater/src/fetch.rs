//! 아카이브 다운로더
//!
//! 응답 상태가 성공으로 확인되기 전에는 아무것도 쓰지 않고,
//! 본문은 `<dest>.part`에 스트리밍한 뒤 완료되면 rename으로 확정합니다.
//! 따라서 `dest`는 완전히 쓰였거나 전혀 건드려지지 않은 상태만 가집니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::backup::BackupManager;
use crate::UpdaterError;

const DEFAULT_USER_AGENT: &str = concat!("payload-updater/", env!("CARGO_PKG_VERSION"));

pub struct ArchiveFetcher {
    http: reqwest::Client,
}

impl ArchiveFetcher {
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self, UpdaterError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .build()
            .map_err(|e| UpdaterError::FetchFailed {
                url: String::new(),
                status_code: None,
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { http })
    }

    /// `url`의 전체 본문을 `dest`에 저장하고 바이트 수를 반환
    ///
    /// `dest`에 기존 파일이 있으면 삭제하지 않고 백업 이름으로 옮겨둡니다.
    pub async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        backups: &BackupManager,
    ) -> Result<u64, UpdaterError> {
        match dest.parent() {
            Some(parent) if parent.is_dir() => {}
            _ => {
                return Err(UpdaterError::FetchFailed {
                    url: url.to_string(),
                    status_code: None,
                    message: format!("destination directory does not exist: {}", dest.display()),
                });
            }
        }

        tracing::info!("[Fetch] Downloading {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::FetchFailed {
                url: url.to_string(),
                status_code: Some(status.as_u16()),
                message: status.canonical_reason().unwrap_or("unexpected status").to_string(),
            });
        }

        let part = part_path(dest);
        let written = match write_body(response, url, &part).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e);
            }
        };

        // 수동으로 받아둔 사본이 있을 수 있으므로 지우지 않고 옮김
        if let Err(e) = backups.backup(dest) {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(UpdaterError::FetchFailed {
                url: url.to_string(),
                status_code: None,
                message: format!("could not move existing archive aside: {}", e),
            });
        }

        if let Err(e) = tokio::fs::rename(&part, dest).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(UpdaterError::from_io(&e, url, dest));
        }

        tracing::info!("[Fetch] Wrote {} ({} bytes)", dest.display(), written);
        Ok(written)
    }
}

async fn write_body(response: reqwest::Response, url: &str, part: &Path) -> Result<u64, UpdaterError> {
    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(|e| UpdaterError::from_io(&e, url, part))?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| UpdaterError::from_reqwest(&e, url))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| UpdaterError::from_io(&e, url, part))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| UpdaterError::from_io(&e, url, part))?;
    file.sync_all().await.map_err(|e| UpdaterError::from_io(&e, url, part))?;
    Ok(written)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
