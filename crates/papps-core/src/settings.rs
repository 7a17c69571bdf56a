use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_START_MENU_DIRECTORY_NAME: &str = "PApps";
pub const DEFAULT_UPDATE_CHECK_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const MIN_UPDATE_CHECK_INTERVAL: Duration = Duration::from_secs(3 * 60 * 60);

/// User settings persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Install root; relative values are resolved against the executable's directory.
    #[serde(default = "default_base_directory")]
    pub base_directory: PathBuf,
    #[serde(default = "default_start_menu_directory_name")]
    pub start_menu_directory_name: String,
    #[serde(default = "default_update_check_interval_secs")]
    update_check_interval_secs: u64,
    #[serde(default)]
    pub last_update_check_unix: Option<u64>,
    /// Service answering update checks; none disables automatic checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_endpoint: Option<String>,
}

/// What the registry needs from the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub base_directory: PathBuf,
    pub start_menu_directory: PathBuf,
    pub update_check_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_directory: default_base_directory(),
            start_menu_directory_name: default_start_menu_directory_name(),
            update_check_interval_secs: default_update_check_interval_secs(),
            last_update_check_unix: None,
            update_endpoint: None,
        }
    }
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse papps settings")
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize papps settings")
    }

    /// Reads settings from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read settings: {}", path.display()));
            }
        };
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to load settings: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, self.to_toml_string()?)
            .with_context(|| format!("failed to write settings: {}", path.display()))
    }

    pub fn update_check_interval(&self) -> Duration {
        Duration::from_secs(self.update_check_interval_secs).max(MIN_UPDATE_CHECK_INTERVAL)
    }

    /// Stores a new interval, raised to the three hour minimum when shorter.
    pub fn set_update_check_interval(&mut self, interval: Duration) {
        self.update_check_interval_secs = interval.max(MIN_UPDATE_CHECK_INTERVAL).as_secs();
    }

    pub fn update_check_due(&self, now_unix: u64) -> bool {
        match self.last_update_check_unix {
            None => true,
            Some(last) => {
                now_unix.saturating_sub(last) >= self.update_check_interval().as_secs()
            }
        }
    }

    pub fn resolve_base_directory(&self, executable_dir: &Path) -> PathBuf {
        let joined = if self.base_directory.is_absolute() {
            self.base_directory.clone()
        } else {
            executable_dir.join(&self.base_directory)
        };
        normalize_lexically(&joined)
    }

    pub fn registry_config(&self, executable_dir: &Path, start_menu_root: &Path) -> RegistryConfig {
        RegistryConfig {
            base_directory: self.resolve_base_directory(executable_dir),
            start_menu_directory: start_menu_root.join(&self.start_menu_directory_name),
            update_check_interval: self.update_check_interval(),
        }
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn default_base_directory() -> PathBuf {
    PathBuf::from("..")
}

fn default_start_menu_directory_name() -> String {
    DEFAULT_START_MENU_DIRECTORY_NAME.to_string()
}

fn default_update_check_interval_secs() -> u64 {
    DEFAULT_UPDATE_CHECK_INTERVAL.as_secs()
}
