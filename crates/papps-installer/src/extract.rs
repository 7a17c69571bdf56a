use anyhow::{anyhow, Context, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::process::Command;
use tracing::debug;
use zip::ZipArchive;

use crate::services::ExtractionBackend;

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Zip archives are read in-process; anything else is handed to `tar`,
/// which understands the common compressed tarball formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl ExtractionBackend for ArchiveExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        if !archive.is_file() {
            return Err(anyhow!("archive not found: {}", archive.display()));
        }
        fs::create_dir_all(destination)
            .with_context(|| format!("failed to create {}", destination.display()))?;

        if is_zip(archive)? {
            extract_zip(archive, destination)
        } else {
            extract_tar(archive, destination)
        }
    }
}

fn is_zip(archive: &Path) -> Result<bool> {
    let mut file =
        File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
    let mut magic = [0_u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == ZIP_MAGIC),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", archive.display())),
    }
}

fn extract_zip(archive_path: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("failed to read zip archive {}", archive_path.display()))?;
    debug!(archive = %archive_path.display(), entries = archive.len(), "extracting zip");

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).with_context(|| {
            format!(
                "failed to read entry {index} of {}",
                archive_path.display()
            )
        })?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(anyhow!(
                "zip entry escapes the destination directory: {}",
                entry.name()
            ));
        };
        let out_path = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("failed to create {}", out_path.display()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract {}", out_path.display()))?;
    }
    Ok(())
}

fn extract_tar(archive_path: &Path, destination: &Path) -> Result<()> {
    run_command(
        Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(destination),
        "failed to extract archive with tar",
    )
}

pub(crate) fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}
