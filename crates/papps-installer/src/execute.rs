use anyhow::{anyhow, Context, Result};
use papps_core::{
    resolve_relative, DeleteStep, DownloadStep, EnvironmentVariables, ExecuteStep, ExternalTool,
    InstallStep, MoveStep, PappsError, PathMatcher, Shortcut, ShortcutStep, StepList,
    UniversalExtractStep,
};
use papps_security::{verify_file, ExpectedHash};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::fs_utils::{move_file, prune_empty_dirs, relative_files, remove_file_if_exists};
use crate::layout::InstallLayout;
use crate::process::split_command_line;
use crate::services::InstallServices;

const UNDEFINED_ERROR_MESSAGE: &str = "Undefined error message.";

/// What a step list runs against.
pub struct StepContext<'a> {
    pub target_directory: &'a Path,
    pub layout: &'a InstallLayout,
    pub environment: &'a EnvironmentVariables,
    pub services: &'a InstallServices,
}

/// A shortcut written by this session and the record it overwrote, if any.
#[derive(Debug, Clone)]
struct CreatedShortcut {
    shortcut: Shortcut,
    replaced: Option<Shortcut>,
}

#[derive(Debug, Clone)]
struct DownloadedFile {
    path: PathBuf,
    permanent: bool,
}

/// One run of a step list, remembering what has to be undone or released
/// by [`StepSession::cleanup`].
pub struct StepSession<'a> {
    context: StepContext<'a>,
    downloads: Vec<DownloadedFile>,
    shortcuts: Vec<CreatedShortcut>,
}

impl<'a> StepSession<'a> {
    pub fn new(context: StepContext<'a>) -> Self {
        Self {
            context,
            downloads: Vec::new(),
            shortcuts: Vec::new(),
        }
    }

    /// Runs every step in order and stops at the first failure, which is
    /// wrapped with the failing step's type.
    pub fn run(&mut self, steps: &StepList) -> Result<()> {
        for step in steps {
            debug!(step = step.type_name(), "{}", step.describe());
            self.execute(step).context(PappsError::StepExecution {
                step: step.type_name(),
            })?;
        }
        Ok(())
    }

    pub fn execute(&mut self, step: &InstallStep) -> Result<()> {
        let target = self.context.target_directory;
        let services = self.context.services;
        match step {
            InstallStep::Delete(step) => delete_files(target, step),
            InstallStep::Display(step) => services
                .prompt
                .display(step.message.as_deref().unwrap_or_default()),
            InstallStep::Download(step) => self.download(step),
            InstallStep::Error(step) => Err(anyhow!(
                "{}",
                step.message
                    .as_deref()
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or(UNDEFINED_ERROR_MESSAGE)
            )),
            InstallStep::Eula(step) => {
                let accepted = services
                    .prompt
                    .accept_eula(step.text.as_deref().unwrap_or_default())?;
                if accepted {
                    Ok(())
                } else {
                    Err(PappsError::EulaRefused.into())
                }
            }
            InstallStep::Execute(step) => self.run_program(step),
            InstallStep::Extract(step) => {
                let archive = resolve_relative(target, step.file.as_deref().unwrap_or_default());
                services
                    .extractor
                    .extract(&archive, target)
                    .with_context(|| format!("failed to extract {}", archive.display()))
            }
            InstallStep::Move(step) => move_files(target, step),
            InstallStep::Shortcut(step) => self.create_shortcut(step),
            InstallStep::SevenZipArchive(step) => {
                let program = services.tools.require(ExternalTool::SevenZip)?;
                let arguments = split_command_line(step.arguments.as_deref().unwrap_or_default());
                let code = services.spawner.run(program, &arguments, target)?;
                if code != 0 {
                    return Err(anyhow!("7-Zip returned exit code {code}"));
                }
                Ok(())
            }
            InstallStep::UniversalExtract(step) => self.universal_extract(step),
        }
    }

    /// Releases per-step resources. A failed run also loses its
    /// non-permanent downloads, and every shortcut it wrote is removed or
    /// put back to the record it replaced.
    pub fn cleanup(self, successful: bool) {
        if successful {
            return;
        }

        let shortcuts = &self.context.services.shortcuts;
        for created in self.shortcuts.iter().rev() {
            let undone = match &created.replaced {
                Some(previous) => shortcuts.add(previous),
                None => shortcuts.remove(&created.shortcut).map(|_| ()),
            };
            if let Err(err) = undone {
                warn!(shortcut = %created.shortcut.file_name, "failed to undo shortcut during cleanup: {err:#}");
            }
        }
        for download in self.downloads.iter().filter(|download| !download.permanent) {
            if let Err(err) = remove_file_if_exists(&download.path) {
                warn!(path = %download.path.display(), "failed to remove download during cleanup: {err}");
            }
        }
    }

    fn download(&mut self, step: &DownloadStep) -> Result<()> {
        let services = self.context.services;
        let url = step.url.as_deref().unwrap_or_default();
        let destination = resolve_relative(
            self.context.target_directory,
            step.destination_file.as_deref().unwrap_or_default(),
        );
        self.downloads.push(DownloadedFile {
            path: destination.clone(),
            permanent: step.permanent,
        });

        services.prompt.download_started(url);
        services
            .downloader
            .download(url, &destination, &mut |downloaded, total| {
                services.prompt.download_progress(downloaded, total)
            })
            .context(PappsError::Transport {
                url: url.to_string(),
            })?;
        services.prompt.download_finished(url);

        let Some(hash) = step.hash.as_deref().filter(|hash| !hash.trim().is_empty()) else {
            return Ok(());
        };
        let expected = ExpectedHash::parse(hash)
            .map_err(|err| PappsError::Validation(format!("Invalid hash: {err}")))?;
        if !verify_file(&destination, &expected)? {
            return Err(PappsError::HashMismatch.into());
        }
        debug!(path = %destination.display(), hash = %expected, "verified download");
        Ok(())
    }

    fn run_program(&self, step: &ExecuteStep) -> Result<()> {
        let target = self.context.target_directory;
        let file_name = step.filename.as_deref().unwrap_or_default();
        let program = resolve_relative(target, file_name);
        let arguments = split_command_line(step.arguments.as_deref().unwrap_or_default());
        let code = self
            .context
            .services
            .spawner
            .run(&program, &arguments, target)?;
        if step.fail_on_error && code != 0 {
            return Err(anyhow!(
                "External program {file_name} returned exit code {code}"
            ));
        }
        Ok(())
    }

    fn universal_extract(&self, step: &UniversalExtractStep) -> Result<()> {
        let target = self.context.target_directory;
        let services = self.context.services;
        let file = resolve_relative(target, step.file.as_deref().unwrap_or_default());
        if !file.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Couldn't find the file to extract: {}", file.display()),
            )
            .into());
        }
        let to_directory = resolve_relative(target, &step.to_directory);
        let program = services.tools.require(ExternalTool::UniExtract)?;
        let arguments = vec![
            file.to_string_lossy().into_owned(),
            to_directory.to_string_lossy().into_owned(),
        ];
        let code = services.spawner.run(program, &arguments, target)?;
        if code != 0 {
            return Err(anyhow!("UniExtract returned exit code {code}"));
        }
        Ok(())
    }

    fn create_shortcut(&mut self, step: &ShortcutStep) -> Result<()> {
        let target = self.context.target_directory;
        let environment = self.context.environment;
        let contract_path = |path: PathBuf| -> Result<String> {
            Ok(environment.contract(&path.to_string_lossy())?)
        };
        let optional_path = |relative: Option<&str>| -> Result<Option<String>> {
            relative
                .filter(|value| !value.trim().is_empty())
                .map(|value| contract_path(resolve_relative(target, value)))
                .transpose()
        };

        let shortcut = Shortcut {
            file_name: contract_path(resolve_relative(
                self.context.layout.start_menu_directory(),
                step.file.as_deref().unwrap_or_default(),
            ))?,
            target: contract_path(resolve_relative(
                target,
                step.target.as_deref().unwrap_or_default(),
            ))?,
            arguments: step.arguments.clone(),
            working_directory: optional_path(step.working_directory.as_deref())?,
            icon_path: optional_path(step.icon.as_deref())?,
            display_mode: step.display_mode,
            description: step.description.clone(),
        };

        let shortcuts = &self.context.services.shortcuts;
        let replaced = shortcuts
            .list()?
            .into_iter()
            .find(|existing| existing.file_name.eq_ignore_ascii_case(&shortcut.file_name));
        shortcuts.add(&shortcut)?;
        self.shortcuts.push(CreatedShortcut { shortcut, replaced });
        Ok(())
    }
}

fn delete_files(target: &Path, step: &DeleteStep) -> Result<()> {
    let matcher = PathMatcher::compile(step.files.as_deref().unwrap_or_default())?;
    let mut touched = BTreeSet::new();
    for (path, relative) in relative_files(target)? {
        if !matcher.is_match(&relative) {
            continue;
        }
        fs::remove_file(&path).with_context(|| format!("failed to delete {}", path.display()))?;
        debug!(file = %relative, "deleted");
        if let Some(parent) = path.parent() {
            touched.insert(parent.to_path_buf());
        }
    }

    for dir in touched {
        prune_empty_dirs(target, &dir)?;
    }
    Ok(())
}

fn move_files(target: &Path, step: &MoveStep) -> Result<()> {
    let from = resolve_relative(target, &step.from_directory);
    let to = resolve_relative(target, &step.to_directory);
    if from == to {
        return Ok(());
    }
    if !from.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source directory not found: {}", from.display()),
        )
        .into());
    }

    fs::create_dir_all(&to).with_context(|| format!("failed to create {}", to.display()))?;
    let matcher = PathMatcher::compile(&step.include_files)?;
    let nested_destination = to.starts_with(&from);
    let mut touched = BTreeSet::new();
    for (path, relative) in relative_files(&from)? {
        if (nested_destination && path.starts_with(&to)) || !matcher.is_match(&relative) {
            continue;
        }
        move_file(&path, &resolve_relative(&to, &relative))?;
        debug!(file = %relative, to = %to.display(), "moved");
        if let Some(parent) = path.parent() {
            touched.insert(parent.to_path_buf());
        }
    }

    for dir in touched {
        prune_empty_dirs(target, &dir)?;
    }
    Ok(())
}
