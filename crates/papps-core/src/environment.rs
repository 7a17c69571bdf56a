use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::{NoExpand, Regex};

use crate::error::PappsError;
use crate::paths::is_invalid_path_char;

pub const BASE_DIR_VARIABLE: &str = "PAppsBaseDir";
pub const START_MENU_DIR_VARIABLE: &str = "PAppsStartMenuDir";

const PLACEHOLDER: char = '|';

/// Named folder table used to turn absolute paths into `%NAME%` tokens and back.
///
/// Names are matched case-insensitively; the spelling given to [`insert`]
/// is the one written back by [`contract`].
///
/// [`insert`]: EnvironmentVariables::insert
/// [`contract`]: EnvironmentVariables::contract
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentVariables {
    entries: BTreeMap<String, (String, String)>,
}

impl EnvironmentVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table of the special folders known on this machine.
    pub fn from_system() -> Self {
        let mut variables = Self::new();
        for (name, path) in system_special_folders() {
            variables.insert(name, path.to_string_lossy());
        }
        variables
    }

    /// System folders plus the installer's own base and start-menu directories.
    pub fn for_installation(base_directory: &Path, start_menu_directory: &Path) -> Self {
        let mut variables = Self::from_system();
        variables.insert(BASE_DIR_VARIABLE, base_directory.to_string_lossy());
        variables.insert(START_MENU_DIR_VARIABLE, start_menu_directory.to_string_lossy());
        variables
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries
            .insert(name.to_lowercase(), (name, value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces `%NAME%` with its value; `%%` yields a literal `%` and unknown
    /// names are kept verbatim.
    pub fn expand(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('%') else {
                out.push_str(&rest[start..]);
                return out;
            };

            let name = &after[..end];
            if name.is_empty() {
                out.push('%');
            } else if let Some(value) = self.get(name) {
                out.push_str(value);
            } else {
                out.push('%');
                out.push_str(name);
                out.push('%');
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }

    /// Rewrites known folder values back into `%NAME%` form.
    ///
    /// Longer values are substituted first, then longer names, so the most
    /// specific folder wins. Literal `%` characters are escaped as `%%`.
    pub fn contract(&self, input: &str) -> Result<String, PappsError> {
        if let Some(ch) = input.chars().find(|ch| is_invalid_path_char(*ch)) {
            return Err(PappsError::Validation(format!(
                "path contains an invalid character ({ch:?}): {input}"
            )));
        }

        let mut candidates = self
            .entries
            .values()
            .filter(|(_, value)| !value.is_empty())
            .collect::<Vec<_>>();
        candidates.sort_by(|(left_name, left_value), (right_name, right_value)| {
            right_value
                .chars()
                .count()
                .cmp(&left_value.chars().count())
                .then_with(|| right_name.chars().count().cmp(&left_name.chars().count()))
        });

        let mut contracted = input.to_string();
        for (name, value) in candidates {
            let pattern = Regex::new(&format!("(?i){}", regex::escape(value))).map_err(|err| {
                PappsError::Validation(format!("invalid folder value for {name}: {err}"))
            })?;
            let token = format!("{PLACEHOLDER}{name}{PLACEHOLDER}");
            contracted = pattern
                .replace_all(&contracted, NoExpand(&token))
                .into_owned();
        }

        Ok(contracted
            .replace('%', "%%")
            .replace(PLACEHOLDER, "%"))
    }
}

fn system_special_folders() -> Vec<(&'static str, PathBuf)> {
    let mut folders = Vec::new();
    let mut push = |name: &'static str, path: Option<PathBuf>| {
        if let Some(path) = path.filter(|path| !path.as_os_str().is_empty()) {
            folders.push((name, path));
        }
    };

    push("UserProfile", dirs::home_dir());
    push("Desktop", dirs::desktop_dir());
    push("DesktopDirectory", dirs::desktop_dir());
    push("MyDocuments", dirs::document_dir());
    push("Personal", dirs::document_dir());
    push("MyMusic", dirs::audio_dir());
    push("MyPictures", dirs::picture_dir());
    push("MyVideos", dirs::video_dir());
    push("Templates", dirs::template_dir());
    push("ApplicationData", dirs::config_dir());
    push("LocalApplicationData", dirs::data_local_dir());
    push("InternetCache", dirs::cache_dir());
    push("StartMenu", start_menu_dir());
    push("Programs", start_menu_dir().map(|dir| dir.join("Programs")));

    for (name, variable) in [
        ("ProgramFiles", "ProgramFiles"),
        ("ProgramFilesX86", "ProgramFiles(x86)"),
        ("CommonProgramFiles", "CommonProgramFiles"),
        ("CommonProgramFilesX86", "CommonProgramFiles(x86)"),
        ("CommonApplicationData", "ProgramData"),
        ("Windows", "SystemRoot"),
    ] {
        push(name, std::env::var_os(variable).map(PathBuf::from));
    }

    folders
}

/// Per-user start menu folder (XDG applications dir outside Windows).
pub fn start_menu_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        return dirs::config_dir().map(|dir| {
            dir.join("Microsoft")
                .join("Windows")
                .join("Start Menu")
        });
    }
    dirs::data_dir().map(|dir| dir.join("applications"))
}
