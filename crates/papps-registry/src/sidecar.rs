use anyhow::{Context, Result};
use papps_core::{Application, SIDECAR_FILE_NAME};
use papps_installer::{has_backup_suffix, BACKUP_SUFFIX};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Scans the direct subdirectories of `base_directory` for sidecar records.
///
/// Backup directories are not installations and are skipped, as are
/// sidecars that cannot be read.
pub fn read_installed_applications(base_directory: &Path) -> Result<Vec<Application>> {
    let mut applications: Vec<Application> = Vec::new();
    for directory in sorted_subdirectories(base_directory)? {
        if is_backup_directory(&directory) {
            continue;
        }
        let sidecar = directory.join(SIDECAR_FILE_NAME);
        if !sidecar.is_file() {
            continue;
        }

        match read_sidecar(&sidecar) {
            Ok(mut application) => {
                if applications.contains(&application) {
                    warn!(
                        url = %application.url,
                        path = %directory.display(),
                        "ignoring second installation of the same application"
                    );
                    continue;
                }
                application.install_directory = Some(directory.clone());
                debug!(url = %application.url, path = %directory.display(), "found installation");
                applications.push(application);
            }
            Err(err) => warn!(path = %sidecar.display(), "skipping unreadable sidecar: {err:#}"),
        }
    }
    Ok(applications)
}

pub fn read_sidecar(path: &Path) -> Result<Application> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read sidecar: {}", path.display()))?;
    Application::from_sidecar_json(&raw)
        .with_context(|| format!("failed to parse sidecar: {}", path.display()))
}

pub fn write_sidecar(install_directory: &Path, application: &Application) -> Result<PathBuf> {
    let path = install_directory.join(SIDECAR_FILE_NAME);
    fs::write(&path, application.to_sidecar_json()?)
        .with_context(|| format!("failed to write sidecar: {}", path.display()))?;
    Ok(path)
}

pub(crate) fn sorted_subdirectories(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", root.display()));
        }
    };

    let mut directories = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read {}", root.display()))?;
        if entry
            .file_type()
            .with_context(|| format!("failed to stat {}", entry.path().display()))?
            .is_dir()
        {
            directories.push(entry.path());
        }
    }
    directories.sort();
    Ok(directories)
}

/// A directory named `<X>.bak` is a backup unless its own sidecar records
/// it as the install directory, which makes it a live installation.
pub(crate) fn is_backup_directory(path: &Path) -> bool {
    has_backup_suffix(path) && !records_itself(path)
}

fn records_itself(directory: &Path) -> bool {
    let sidecar = directory.join(SIDECAR_FILE_NAME);
    if !sidecar.is_file() {
        return false;
    }
    read_sidecar(&sidecar).is_ok_and(|application| {
        application
            .install_directory
            .as_deref()
            .and_then(Path::file_name)
            .is_some_and(|recorded| Some(recorded) == directory.file_name())
    })
}

/// The install directory a backup directory belongs to.
pub(crate) fn backup_owner(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let owner = name.strip_suffix(BACKUP_SUFFIX)?;
    if owner.is_empty() {
        return None;
    }
    Some(path.with_file_name(owner))
}
