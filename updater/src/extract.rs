//! 아카이브 압축 해제
//!
//! zip과 tar.gz를 지원하며 형식은 파일 앞부분의 매직 바이트로 판별합니다.
//! 엔트리 단위로 진행하고, 어느 한 엔트리라도 실패하면 전체를 실패로 보고합니다.
//! 최상위 래핑 폴더를 찾는 것은 호출자(오케스트레이터)의 몫입니다.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;

use crate::UpdaterError;

/// 압축 해제 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// 기록한 파일 수
    pub files: usize,
    /// 디렉터리 엔트리 수
    pub directories: usize,
    /// 최상위 이름 목록 (래핑 폴더 판별용)
    pub top_level: BTreeSet<String>,
}

impl ExtractSummary {
    fn record(&mut self, rel: &Path, is_dir: bool) {
        if is_dir {
            self.directories += 1;
        } else {
            self.files += 1;
        }
        if let Some(Component::Normal(first)) = rel.components().next() {
            self.top_level.insert(first.to_string_lossy().to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    TarGz,
}

/// `archive`의 모든 엔트리를 `out_dir` 아래에 풀어놓는다
///
/// 모든 엔트리가 디스크에 기록된 후에만 반환합니다.
pub fn extract_archive(archive: &Path, out_dir: &Path) -> Result<ExtractSummary, UpdaterError> {
    extract_inner(archive, out_dir).map_err(|e| UpdaterError::ExtractFailed {
        archive: archive.display().to_string(),
        message: format!("{:#}", e),
    })
}

fn extract_inner(archive: &Path, out_dir: &Path) -> Result<ExtractSummary> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut summary = ExtractSummary::default();
    match detect_format(archive)? {
        ArchiveFormat::Zip => extract_zip(archive, out_dir, &mut summary)?,
        ArchiveFormat::TarGz => extract_tar_gz(archive, out_dir, &mut summary)?,
    }

    tracing::info!(
        "[Extract] {} -> {} ({} files, {} dirs)",
        archive.display(),
        out_dir.display(),
        summary.files,
        summary.directories
    );
    Ok(summary)
}

fn detect_format(archive: &Path) -> Result<ArchiveFormat> {
    let mut magic = [0u8; 4];
    let mut file = File::open(archive)
        .with_context(|| format!("failed to open {}", archive.display()))?;
    let n = file.read(&mut magic).context("failed to read archive header")?;

    match &magic[..n] {
        [0x50, 0x4b, 0x03, 0x04] | [0x50, 0x4b, 0x05, 0x06] => Ok(ArchiveFormat::Zip),
        [0x1f, 0x8b, ..] => Ok(ArchiveFormat::TarGz),
        _ => Err(anyhow!("unsupported archive format")),
    }
}

fn extract_zip(archive: &Path, out_dir: &Path, summary: &mut ExtractSummary) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file).context("not a readable zip archive")?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .with_context(|| format!("failed to read zip entry #{}", i))?;
        let rel = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("entry '{}' escapes the output directory", entry.name()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        if entry.is_dir() {
            create_dir(&out_dir.join(&rel))?;
        } else {
            tracing::debug!("[Extract] {}", rel.display());
            write_entry(&mut entry, &out_dir.join(&rel))
                .with_context(|| format!("failed to extract '{}'", rel.display()))?;
        }
        summary.record(&rel, entry.is_dir());
    }
    Ok(())
}

fn extract_tar_gz(archive: &Path, out_dir: &Path, summary: &mut ExtractSummary) -> Result<()> {
    let file = File::open(archive)
        .with_context(|| format!("failed to open {}", archive.display()))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    for entry in tar.entries().context("not a readable tar.gz archive")? {
        let mut entry = entry.context("failed to read tar entry")?;
        let raw = entry.path().context("invalid tar entry path")?.into_owned();
        let rel = enclosed_path(&raw)
            .ok_or_else(|| anyhow!("entry '{}' escapes the output directory", raw.display()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            create_dir(&out_dir.join(&rel))?;
            summary.record(&rel, true);
        } else if kind.is_file() {
            tracing::debug!("[Extract] {}", rel.display());
            write_entry(&mut entry, &out_dir.join(&rel))
                .with_context(|| format!("failed to extract '{}'", rel.display()))?;
            summary.record(&rel, false);
        } else if kind.is_pax_global_extensions() || kind.is_pax_local_extensions() {
            continue;
        } else {
            tracing::warn!("[Extract] Skipping non-regular entry {} ({:?})", rel.display(), kind);
        }
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("failed to create {}", path.display()))
}

/// 부모 디렉터리는 엔트리 순서와 무관하게 먼저 만든다
fn write_entry<R: Read>(reader: &mut R, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        create_dir(parent)?;
    }
    let mut outfile = File::create(out_path)
        .with_context(|| format!("failed to create {}", out_path.display()))?;
    io::copy(reader, &mut outfile)?;
    Ok(())
}

/// `..`, 절대 경로 등 출력 디렉터리를 벗어나는 경로는 None
fn enclosed_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}
