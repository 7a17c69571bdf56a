use anyhow::{anyhow, Context, Result};
use papps_core::{
    release_date, resolve_relative, Application, ManifestLoader, PappsError, RegistryConfig,
    StepList,
};
use papps_installer::{
    copy_dir_recursive, move_dir_or_copy, remove_dir_all_if_exists, InstallLayout,
    InstallServices, StepContext, StepSession,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::phase::InstallPhase;
use crate::sidecar::{
    backup_owner, is_backup_directory, read_installed_applications, read_sidecar,
    sorted_subdirectories, write_sidecar,
};
use crate::update::UpdateChecker;

/// The set of installed applications under one base directory.
///
/// Every mutating call runs to completion before returning. On failure the
/// application being installed is left exactly as it was before the call;
/// dependencies committed earlier in the same call stay installed.
pub struct ApplicationRegistry {
    config: RegistryConfig,
    layout: InstallLayout,
    services: InstallServices,
    applications: Vec<Application>,
}

impl ApplicationRegistry {
    /// Rebuilds the registry from the sidecar records found on disk.
    pub fn open(config: RegistryConfig, services: InstallServices) -> Result<Self> {
        let layout = InstallLayout::from_config(&config);
        let applications = read_installed_applications(layout.base_directory())?;
        info!(
            base = %layout.base_directory().display(),
            installed = applications.len(),
            "opened application registry"
        );
        Ok(Self {
            config,
            layout,
            services,
            applications,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub fn services(&self) -> &InstallServices {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut InstallServices {
        &mut self.services
    }

    pub fn applications(&self) -> &[Application] {
        &self.applications
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.get(url).is_some()
    }

    pub fn get(&self, url: &str) -> Option<&Application> {
        self.applications
            .iter()
            .find(|application| application.url == url)
    }

    /// Installs, upgrades or reinstalls `application`, installing any missing
    /// dependency first. Returns the descriptor as recorded in the registry.
    pub fn add(&mut self, application: &Application) -> Result<Application> {
        self.add_with_dependencies(application)
            .with_context(|| format!("Installation of {} failed", application.display_name()))
    }

    fn add_with_dependencies(&mut self, application: &Application) -> Result<Application> {
        application.validate()?;
        let steps = application
            .install_commands
            .as_ref()
            .ok_or_else(|| anyhow!("application has no installation commands"))?;
        self.services.tools.preflight(&steps.required_tools())?;

        for dependency in application.dependencies() {
            if !self.contains(&dependency.url) {
                debug!(url = %application.url, dependency = %dependency.url, "installing dependency");
                self.add(dependency)?;
            }
        }

        let existing = self.get(&application.url).cloned();
        let install_directory = match existing
            .as_ref()
            .and_then(|existing| existing.install_directory.clone())
        {
            Some(directory) => directory,
            None => self
                .layout
                .allocate_install_directory(application, |candidate| candidate.exists())?,
        };

        let backup = self.layout.backup_path(&install_directory);
        if let Some(owner) = self.installed_at(&backup) {
            return Err(anyhow!(
                "backup location {} is the installation of {}",
                backup.display(),
                owner.display_name()
            ));
        }

        info!(
            url = %application.url,
            version = application.version.as_deref().unwrap_or_default(),
            path = %install_directory.display(),
            "installing application"
        );
        let mut transaction = InstallTransaction::new(install_directory, existing.is_some());
        let installed = run_transaction(
            &self.layout,
            &self.services,
            application,
            steps,
            &mut transaction,
        );
        let installed = match installed {
            Ok(installed) => installed,
            Err(err) => {
                if transaction.phase.needs_rollback() {
                    transaction.roll_back();
                }
                return Err(err);
            }
        };

        match self
            .applications
            .iter_mut()
            .find(|registered| registered.url == installed.url)
        {
            Some(registered) => *registered = installed.clone(),
            None => self.applications.push(installed.clone()),
        }
        info!(url = %installed.url, "installation committed");
        Ok(installed)
    }

    /// Deletes an installation, its backup and the shortcuts pointing into
    /// it. Returns false when `url` is not registered.
    pub fn remove(&mut self, url: &str) -> Result<bool> {
        let Some(index) = self
            .applications
            .iter()
            .position(|application| application.url == url)
        else {
            return Ok(false);
        };
        let application = self.applications[index].clone();

        if let Some(directory) = &application.install_directory {
            self.remove_shortcuts_into(directory)?;
            let backup = self.layout.backup_path(directory);
            if self.installed_at(&backup).is_none() {
                remove_dir_all_if_exists(&backup)?;
            }
            remove_dir_all_if_exists(directory)?;
        }

        self.applications.remove(index);
        info!(url = %application.url, "removed application");
        Ok(true)
    }

    /// The registered application living in `directory`, if any.
    fn installed_at(&self, directory: &Path) -> Option<&Application> {
        self.applications
            .iter()
            .find(|application| application.install_directory.as_deref() == Some(directory))
    }

    fn remove_shortcuts_into(&self, directory: &Path) -> Result<()> {
        let environment = self.layout.environment();
        for shortcut in self.services.shortcuts.list()? {
            if Path::new(&environment.expand(&shortcut.target)).starts_with(directory) {
                self.services.shortcuts.remove(&shortcut)?;
                debug!(shortcut = %shortcut.file_name, "removed shortcut");
            }
        }
        Ok(())
    }

    /// Asks `checker` which applications have a newer release and resolves
    /// the returned manifests. Nothing is sent when the registry is empty.
    pub fn updates<F>(
        &self,
        checker: &dyn UpdateChecker,
        loader: &ManifestLoader<F>,
    ) -> Result<Vec<Application>>
    where
        F: Fn(&str) -> Result<String>,
    {
        if self.applications.is_empty() {
            return Ok(Vec::new());
        }

        let installed: BTreeMap<String, String> = self
            .applications
            .iter()
            .map(|application| {
                (
                    application.url.clone(),
                    application
                        .release_date
                        .as_ref()
                        .map(release_date::format)
                        .unwrap_or_default(),
                )
            })
            .collect();

        let mut updates = Vec::new();
        for (url, body) in checker.check(&installed)? {
            updates.push(loader.load_from_str(&url, &body)?);
        }
        info!(
            checked = installed.len(),
            available = updates.len(),
            "update check finished"
        );
        Ok(updates)
    }

    /// Backup directories whose installation directory is missing, which is
    /// what a process killed in the middle of an upgrade leaves behind.
    pub fn interrupted(&self) -> Result<Vec<PathBuf>> {
        Ok(sorted_subdirectories(self.layout.base_directory())?
            .into_iter()
            .filter(|directory| is_backup_directory(directory))
            .filter(|backup| backup_owner(backup).is_some_and(|owner| !owner.exists()))
            .collect())
    }

    /// Moves every interrupted backup back into place and registers it again.
    pub fn restore_interrupted(&mut self) -> Result<Vec<Application>> {
        let mut restored = Vec::new();
        for backup in self.interrupted()? {
            let Some(owner) = backup_owner(&backup) else {
                continue;
            };
            fs::rename(&backup, &owner).with_context(|| {
                format!(
                    "failed to restore {} to {}",
                    backup.display(),
                    owner.display()
                )
            })?;
            info!(path = %owner.display(), "restored interrupted installation");

            let mut application = match read_sidecar(&self.layout.sidecar_path(&owner)) {
                Ok(application) => application,
                Err(err) => {
                    warn!(path = %owner.display(), "restored directory has no usable sidecar: {err:#}");
                    continue;
                }
            };
            application.install_directory = Some(owner);
            if !self.contains(&application.url) {
                self.applications.push(application.clone());
            }
            restored.push(application);
        }
        Ok(restored)
    }
}

fn run_transaction(
    layout: &InstallLayout,
    services: &InstallServices,
    application: &Application,
    steps: &StepList,
    transaction: &mut InstallTransaction,
) -> Result<Application> {
    let isolated_data = application.isolated_data_directory();
    transaction.back_up(layout, isolated_data.is_none())?;

    let target = transaction.install_directory.clone();
    let environment = layout.environment();
    let mut session = StepSession::new(StepContext {
        target_directory: &target,
        layout,
        environment: &environment,
        services,
    });

    let outcome = transaction
        .execute(&mut session, steps, isolated_data.is_some())
        .and_then(|()| transaction.commit(application, isolated_data));
    session.cleanup(outcome.is_ok());
    outcome
}

/// The backup-execute-commit protocol for one application.
struct InstallTransaction {
    install_directory: PathBuf,
    replaces_existing: bool,
    backup_directory: Option<PathBuf>,
    owns_install_directory: bool,
    phase: InstallPhase,
}

impl InstallTransaction {
    fn new(install_directory: PathBuf, replaces_existing: bool) -> Self {
        Self {
            install_directory,
            replaces_existing,
            backup_directory: None,
            owns_install_directory: false,
            phase: InstallPhase::Validated,
        }
    }

    fn back_up(&mut self, layout: &InstallLayout, copy_back: bool) -> Result<()> {
        self.phase.advance(InstallPhase::BackedUp)?;
        if !self.replaces_existing {
            return Ok(());
        }

        let backup = layout.backup_path(&self.install_directory);
        remove_dir_all_if_exists(&backup)?;
        if !self.install_directory.exists() {
            return Ok(());
        }

        fs::rename(&self.install_directory, &backup).with_context(|| {
            format!(
                "Failed to backup the existing version: {}",
                self.install_directory.display()
            )
        })?;
        self.backup_directory = Some(backup.clone());
        self.owns_install_directory = true;
        info!(path = %backup.display(), "backed up previous version");

        if copy_back {
            copy_dir_recursive(&backup, &self.install_directory)?;
        }
        Ok(())
    }

    fn execute(
        &mut self,
        session: &mut StepSession<'_>,
        steps: &StepList,
        isolated_data: bool,
    ) -> Result<()> {
        if isolated_data && self.install_directory.exists() {
            return Err(anyhow!(
                "Application installation directory shouldn't exist at this point."
            ));
        }
        fs::create_dir_all(&self.install_directory).with_context(|| {
            format!(
                "failed to create install directory: {}",
                self.install_directory.display()
            )
        })?;
        self.owns_install_directory = true;

        session.run(steps)?;
        self.phase.advance(InstallPhase::Executed)
    }

    fn commit(
        &mut self,
        application: &Application,
        isolated_data: Option<&str>,
    ) -> Result<Application> {
        if let (Some(data_directory), Some(backup)) = (isolated_data, &self.backup_directory) {
            let source = resolve_relative(backup, data_directory);
            if source.is_dir() {
                copy_dir_recursive(&source, &resolve_relative(&self.install_directory, data_directory))?;
                debug!(path = %source.display(), "migrated user data");
            }
        }

        let mut installed = application.clone();
        installed.install_commands = None;
        installed.install_directory = Some(self.install_directory.clone());
        installed.previous_version_install_directory = self.backup_directory.clone();
        write_sidecar(&self.install_directory, &installed)?;

        self.phase.advance(InstallPhase::Committed)?;
        Ok(installed)
    }

    fn roll_back(&mut self) {
        if self.owns_install_directory {
            if let Err(err) = remove_dir_all_if_exists(&self.install_directory) {
                warn!(path = %self.install_directory.display(), "failed to remove partial installation: {err:#}");
            }
        }
        if let Some(backup) = self.backup_directory.as_ref().filter(|backup| backup.exists()) {
            match move_dir_or_copy(backup, &self.install_directory) {
                Ok(()) => info!(path = %self.install_directory.display(), "restored previous version"),
                Err(err) => warn!(path = %backup.display(), "failed to restore previous version: {err:#}"),
            }
        }
        if let Err(err) = self.phase.advance(InstallPhase::RolledBack) {
            warn!("{err:#}");
        }
    }
}

/// Makes [`PappsError::NotRegistered`] for callers that require `url` to be
/// installed.
pub fn require_registered<'a>(
    registry: &'a ApplicationRegistry,
    url: &str,
) -> Result<&'a Application, PappsError> {
    registry.get(url).ok_or_else(|| PappsError::NotRegistered {
        url: url.to_string(),
    })
}
