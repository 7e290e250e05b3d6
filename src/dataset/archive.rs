//! ローカルのデータセットアーカイブを展開する
//!
//! 対応形式: `.zip`, `.tar.gz` / `.tgz`, `.tar`

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

/// アーカイブの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    Tar,
}

impl ArchiveKind {
    /// ファイル名からアーカイブの種類を判定
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveKind::Zip => write!(f, "zip"),
            ArchiveKind::TarGz => write!(f, "tar.gz"),
            ArchiveKind::Tar => write!(f, "tar"),
        }
    }
}

/// アーカイブを展開先ディレクトリに展開し、展開先を返す
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let kind = ArchiveKind::detect(archive_path).ok_or_else(|| {
        anyhow::anyhow!("Unsupported archive format: {}", archive_path.display())
    })?;

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;

    tracing::info!(
        "アーカイブを展開します ({}): {} -> {}",
        kind,
        archive_path.display(),
        dest_dir.display()
    );

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let count = match kind {
        ArchiveKind::Zip => unzip_to_dir(file, dest_dir)?,
        ArchiveKind::TarGz => untar_to_dir(GzDecoder::new(file), dest_dir)?,
        ArchiveKind::Tar => untar_to_dir(file, dest_dir)?,
    };

    tracing::info!("{} ファイルを展開しました", count);
    Ok(dest_dir.to_path_buf())
}

fn unzip_to_dir(file: File, dest_dir: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(file).context("Failed to read zip archive")?;
    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("Failed to read zip entry")?;
        // ルート外を指すパスはスキップ
        let outpath = match entry.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => {
                tracing::warn!("不正なパスのエントリをスキップしました: {}", entry.name());
                continue;
            }
        };
        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)
            .with_context(|| format!("Failed to create file: {}", outpath.display()))?;
        std::io::copy(&mut entry, &mut outfile)?;
        extracted += 1;
    }
    Ok(extracted)
}

fn untar_to_dir<R: Read>(reader: R, dest_dir: &Path) -> Result<usize> {
    let mut archive = tar::Archive::new(reader);
    let mut extracted = 0;
    for entry in archive.entries().context("Failed to read tar archive")? {
        let mut entry = entry?;
        let is_file = entry.header().entry_type().is_file();
        // unpack_in はルート外を指すエントリを展開せず false を返す
        if entry.unpack_in(dest_dir)? && is_file {
            extracted += 1;
        }
    }
    Ok(extracted)
}
