use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use papps_core::{start_menu_dir, Application, ManifestLoader, RegistryConfig, Settings};
use papps_installer::{InstallLayout, InstallServices};
use papps_registry::{fetch_text, http_client, ApplicationRegistry};
use tracing::debug;

use crate::render::{TerminalPrompt, TerminalRenderer};

const PORTABLE_SETTINGS_FILE_NAME: &str = "papps.toml";

/// Everything a command needs before it touches the registry.
pub(crate) struct CliContext {
    pub(crate) executable_dir: PathBuf,
    pub(crate) settings_path: PathBuf,
    pub(crate) settings: Settings,
    pub(crate) renderer: TerminalRenderer,
    assume_yes: bool,
}

impl CliContext {
    pub(crate) fn load(settings_override: Option<&Path>, assume_yes: bool) -> Result<Self> {
        let executable_dir = executable_dir()?;
        let settings_path = resolve_settings_path(
            settings_override,
            &executable_dir,
            dirs::config_dir().as_deref(),
        )?;
        debug!(path = %settings_path.display(), "loading settings");
        let settings = Settings::load(&settings_path)?;

        Ok(Self {
            executable_dir,
            settings_path,
            settings,
            renderer: TerminalRenderer::current(),
            assume_yes,
        })
    }

    pub(crate) fn save_settings(&self) -> Result<()> {
        self.settings.save(&self.settings_path)
    }

    pub(crate) fn registry_config(&self) -> RegistryConfig {
        let start_menu_root = start_menu_dir().unwrap_or_else(|| self.executable_dir.clone());
        self.settings
            .registry_config(&self.executable_dir, &start_menu_root)
    }

    pub(crate) fn open_registry(&self) -> Result<ApplicationRegistry> {
        let config = self.registry_config();
        let layout = InstallLayout::from_config(&config);
        layout.ensure_base_dirs()?;
        let prompt = TerminalPrompt::new(self.renderer, self.assume_yes);
        let services = InstallServices::system(&layout, Box::new(prompt))?;
        ApplicationRegistry::open(config, services)
    }

    pub(crate) fn load_manifest(&self, url: &str) -> Result<Application> {
        manifest_loader()?.load(url)
    }
}

pub(crate) fn manifest_loader() -> Result<ManifestLoader<impl Fn(&str) -> Result<String>>> {
    let client = http_client()?;
    Ok(ManifestLoader::new(move |url: &str| fetch_text(&client, url)))
}

fn executable_dir() -> Result<PathBuf> {
    let executable = std::env::current_exe().context("failed to locate the papps executable")?;
    executable
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("executable has no parent directory: {}", executable.display()))
}

/// An explicit path wins, then a `papps.toml` next to the executable, then
/// the per-user configuration directory.
pub(crate) fn resolve_settings_path(
    settings_override: Option<&Path>,
    executable_dir: &Path,
    config_dir: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = settings_override {
        return Ok(path.to_path_buf());
    }

    let portable = executable_dir.join(PORTABLE_SETTINGS_FILE_NAME);
    if portable.is_file() {
        return Ok(portable);
    }

    config_dir
        .map(|dir| dir.join("papps").join("settings.toml"))
        .ok_or_else(|| {
            anyhow!(
                "no configuration directory available; pass --settings or place {PORTABLE_SETTINGS_FILE_NAME} next to the executable"
            )
        })
}
