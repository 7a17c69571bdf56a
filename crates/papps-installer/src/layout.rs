use anyhow::{Context, Result};
use papps_core::{Application, EnvironmentVariables, PappsError, RegistryConfig, SIDECAR_FILE_NAME};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to an install directory while it is held as a backup.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Highest numeric suffix tried when the default directory name is taken.
pub const MAX_DIRECTORY_SUFFIX: u32 = 99;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    base_directory: PathBuf,
    start_menu_directory: PathBuf,
}

impl InstallLayout {
    pub fn new(base_directory: impl Into<PathBuf>, start_menu_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
            start_menu_directory: start_menu_directory.into(),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(&config.base_directory, &config.start_menu_directory)
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn start_menu_directory(&self) -> &Path {
        &self.start_menu_directory
    }

    pub fn backup_path(&self, install_directory: &Path) -> PathBuf {
        let mut name = install_directory.as_os_str().to_os_string();
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    pub fn sidecar_path(&self, install_directory: &Path) -> PathBuf {
        install_directory.join(SIDECAR_FILE_NAME)
    }

    pub fn environment(&self) -> EnvironmentVariables {
        EnvironmentVariables::for_installation(&self.base_directory, &self.start_menu_directory)
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.base_directory).with_context(|| {
            format!(
                "failed to create base directory: {}",
                self.base_directory.display()
            )
        })
    }

    /// Picks `base/<name>`, then `base/<name> (2)` .. `(99)`, skipping every
    /// candidate for which `is_taken` answers true for the directory or its
    /// backup. Names ending in the backup suffix are never handed out.
    pub fn allocate_install_directory(
        &self,
        application: &Application,
        is_taken: impl Fn(&Path) -> bool,
    ) -> Result<PathBuf, PappsError> {
        let name = application.default_directory_name();
        let available = |candidate: &Path| {
            !has_backup_suffix(candidate)
                && !is_taken(candidate)
                && !is_taken(&self.backup_path(candidate))
        };

        let first = self.base_directory.join(&name);
        if available(&first) {
            return Ok(first);
        }

        (2..=MAX_DIRECTORY_SUFFIX)
            .map(|suffix| self.base_directory.join(format!("{name} ({suffix})")))
            .find(|candidate| available(candidate))
            .ok_or(PappsError::DirectoryAllocation)
    }
}

/// Whether the final component of `path` ends in [`BACKUP_SUFFIX`], ignoring
/// ASCII case.
pub fn has_backup_suffix(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name.len() > BACKUP_SUFFIX.len()
                && name
                    .get(name.len() - BACKUP_SUFFIX.len()..)
                    .is_some_and(|tail| tail.eq_ignore_ascii_case(BACKUP_SUFFIX))
        })
}
