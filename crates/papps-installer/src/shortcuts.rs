use anyhow::{anyhow, Context, Result};
use papps_core::{DisplayMode, EnvironmentVariables, Shortcut};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::fs_utils::{prune_empty_dirs, remove_dir_all_if_exists};
use crate::layout::InstallLayout;
use crate::services::ShortcutService;

/// Shortcut service that stores each link as a small `key=value` file at the
/// link location, holding absolute paths like a native link would.
#[derive(Debug, Clone)]
pub struct FileShortcutStore {
    layout: InstallLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkFile {
    target: String,
    arguments: Option<String>,
    working_directory: Option<String>,
    icon_path: Option<String>,
    display_mode: DisplayMode,
    description: Option<String>,
}

impl FileShortcutStore {
    pub fn new(layout: InstallLayout) -> Self {
        Self { layout }
    }

    fn environment(&self) -> EnvironmentVariables {
        self.layout.environment()
    }

    fn link_files(&self) -> Result<Vec<PathBuf>> {
        let root = self.layout.start_menu_directory();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
            if entry.file_type().is_file() && has_link_extension(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
        Ok(files)
    }

    fn read_shortcut(&self, path: &Path, variables: &EnvironmentVariables) -> Result<Shortcut> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read shortcut: {}", path.display()))?;
        let link = parse_link(&raw)
            .with_context(|| format!("failed to parse shortcut: {}", path.display()))?;
        let contract = |value: &str| variables.contract(value);
        let contract_optional = |value: &Option<String>| value.as_deref().map(contract).transpose();

        Ok(Shortcut {
            file_name: contract(&path.to_string_lossy())?,
            target: contract(&link.target)?,
            // Quoted arguments cannot go through contraction; keep them as written.
            arguments: link
                .arguments
                .as_deref()
                .map(|value| contract(value).unwrap_or_else(|_| value.to_string())),
            working_directory: contract_optional(&link.working_directory)?,
            icon_path: contract_optional(&link.icon_path)?,
            display_mode: link.display_mode,
            description: link.description,
        })
    }
}

impl ShortcutService for FileShortcutStore {
    fn add(&self, shortcut: &Shortcut) -> Result<()> {
        if shortcut.file_name.trim().is_empty() {
            return Err(anyhow!("Shortcut file name not defined or empty."));
        }
        if shortcut.target.trim().is_empty() {
            return Err(anyhow!("Shortcut target not defined or empty."));
        }

        let variables = self.environment();
        let expand_optional = |value: &Option<String>| {
            value
                .as_deref()
                .filter(|value| !value.trim().is_empty())
                .map(|value| variables.expand(value))
        };
        let link = LinkFile {
            target: variables.expand(&shortcut.target),
            arguments: expand_optional(&shortcut.arguments),
            working_directory: expand_optional(&shortcut.working_directory),
            icon_path: expand_optional(&shortcut.icon_path),
            display_mode: shortcut.display_mode,
            description: shortcut
                .description
                .clone()
                .filter(|value| !value.trim().is_empty()),
        };

        let path = PathBuf::from(variables.expand(&shortcut.file_name));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, render_link(&link))
            .with_context(|| format!("failed to write shortcut: {}", path.display()))?;
        debug!(path = %path.display(), target = %link.target, "created shortcut");
        Ok(())
    }

    fn remove(&self, shortcut: &Shortcut) -> Result<bool> {
        let path = PathBuf::from(self.environment().expand(&shortcut.file_name));
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to remove shortcut: {}", path.display()));
            }
        }
        debug!(path = %path.display(), "removed shortcut");

        let start_menu = self.layout.start_menu_directory();
        let prune_root = start_menu.parent().unwrap_or(start_menu);
        if let Some(parent) = path.parent() {
            prune_empty_dirs(prune_root, parent)?;
        }
        Ok(true)
    }

    fn list(&self) -> Result<Vec<Shortcut>> {
        let variables = self.environment();
        let base_directory = self.layout.base_directory();
        let mut shortcuts = Vec::new();
        for path in self.link_files()? {
            match self.read_shortcut(&path, &variables) {
                Ok(shortcut) => {
                    if Path::new(&variables.expand(&shortcut.target)).starts_with(base_directory) {
                        shortcuts.push(shortcut);
                    }
                }
                Err(err) => warn!(path = %path.display(), "skipping unreadable shortcut: {err:#}"),
            }
        }
        Ok(shortcuts)
    }

    fn clear(&self) -> Result<()> {
        for shortcut in self.list()? {
            self.remove(&shortcut)?;
        }
        remove_dir_all_if_exists(self.layout.start_menu_directory())
    }
}

fn has_link_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("lnk"))
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn render_link(link: &LinkFile) -> String {
    let mut payload = String::new();
    payload.push_str(&format!("target={}\n", single_line(&link.target)));
    if let Some(arguments) = &link.arguments {
        payload.push_str(&format!("arguments={}\n", single_line(arguments)));
    }
    if let Some(working_directory) = &link.working_directory {
        payload.push_str(&format!(
            "working_directory={}\n",
            single_line(working_directory)
        ));
    }
    if let Some(icon_path) = &link.icon_path {
        payload.push_str(&format!("icon_path={}\n", single_line(icon_path)));
    }
    payload.push_str(&format!("display_mode={}\n", link.display_mode.as_str()));
    if let Some(description) = &link.description {
        payload.push_str(&format!("description={}\n", single_line(description)));
    }
    payload
}

fn parse_link(raw: &str) -> Result<LinkFile> {
    let mut target = None;
    let mut arguments = None;
    let mut working_directory = None;
    let mut icon_path = None;
    let mut display_mode = None;
    let mut description = None;

    for line in raw.lines().filter(|line| !line.trim().is_empty()) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "target" => target = Some(value.to_string()),
            "arguments" => arguments = Some(value.to_string()),
            "working_directory" => working_directory = Some(value.to_string()),
            "icon_path" => icon_path = Some(value.to_string()),
            "display_mode" => {
                display_mode = Some(
                    DisplayMode::parse(value)
                        .with_context(|| format!("unknown display mode: {value}"))?,
                )
            }
            "description" => description = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(LinkFile {
        target: target.context("missing target")?,
        arguments,
        working_directory,
        icon_path,
        display_mode: display_mode.unwrap_or_default(),
        description,
    })
}
