use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::PappsError;
use crate::paths::safe_file_name;
use crate::step_list::StepList;

/// Name of the record written into every install directory.
pub const SIDECAR_FILE_NAME: &str = ".papps-manager.json";

/// A portable application and everything needed to install it.
///
/// Identity is the `url`: two descriptors with the same URL are the same
/// application whatever their other fields say.
#[derive(Debug, Clone, Default)]
pub struct Application {
    pub url: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub release_date: Option<NaiveDateTime>,
    pub dependencies: Option<Vec<Application>>,
    /// Relative directory holding user data. When unset or blank, every file
    /// of the previous version is carried over on upgrade.
    pub data_directory: Option<String>,
    pub install_commands: Option<StepList>,
    pub install_directory: Option<PathBuf>,
    pub previous_version_install_directory: Option<PathBuf>,
}

/// Wire shape shared by manifests and sidecar records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, with = "release_date")]
    pub release_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
    #[serde(default)]
    pub data_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_commands: Option<StepList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_install_directory: Option<PathBuf>,
}

impl Application {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    /// Directory name used the first time this application is installed.
    pub fn default_directory_name(&self) -> String {
        safe_file_name(self.display_name().trim())
    }

    pub fn dependencies(&self) -> &[Application] {
        self.dependencies.as_deref().unwrap_or_default()
    }

    /// The data directory, if one is actually declared.
    pub fn isolated_data_directory(&self) -> Option<&str> {
        self.data_directory
            .as_deref()
            .filter(|directory| !directory.trim().is_empty())
    }

    /// Checks every field an installation needs.
    pub fn validate(&self) -> Result<(), PappsError> {
        let missing = |what: &str| {
            PappsError::Validation(format!("Portable application {what} is not defined."))
        };

        if self.url.trim().is_empty() {
            return Err(missing("URL"));
        }
        if is_blank(self.name.as_deref()) {
            return Err(missing("name"));
        }
        if is_blank(self.version.as_deref()) {
            return Err(missing("version"));
        }
        if self.release_date.is_none() {
            return Err(missing("release date"));
        }
        if self.dependencies.is_none() {
            return Err(PappsError::Validation(
                "Portable application dependencies are not defined.".to_string(),
            ));
        }

        let Some(commands) = self.install_commands.as_ref().filter(|list| !list.is_empty())
        else {
            return Err(PappsError::Validation(
                "Portable application has no installation commands.".to_string(),
            ));
        };
        if let Some(problem) = commands.validate() {
            return Err(PappsError::Validation(format!(
                "One or more installation commands are invalid: {problem}"
            )));
        }
        Ok(())
    }

    /// Shape written next to an installation: dependencies by URL, no steps.
    pub fn to_sidecar_document(&self) -> ApplicationDocument {
        ApplicationDocument {
            url: Some(self.url.clone()),
            name: self.name.clone(),
            version: self.version.clone(),
            release_date: self.release_date,
            dependencies: self
                .dependencies
                .as_ref()
                .map(|deps| deps.iter().map(|dep| dep.url.clone()).collect()),
            data_directory: self.data_directory.clone(),
            install_commands: None,
            install_directory: self.install_directory.clone(),
            previous_version_install_directory: self.previous_version_install_directory.clone(),
        }
    }

    pub fn to_sidecar_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_sidecar_document())
            .context("failed to serialize application sidecar")
    }

    /// Rebuilds a descriptor from its sidecar. Dependencies come back as
    /// URL-only descriptors; they compare equal to the fully loaded ones.
    pub fn from_sidecar_json(raw: &str) -> Result<Self> {
        let document: ApplicationDocument =
            serde_json::from_str(raw).context("failed to parse application sidecar")?;
        let url = document
            .url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow!("application sidecar has no url"))?;
        let dependencies = document
            .dependencies
            .clone()
            .map(|urls| urls.into_iter().map(Application::new).collect());
        Ok(document.into_application(url, dependencies))
    }
}

impl ApplicationDocument {
    pub fn into_application(self, url: String, dependencies: Option<Vec<Application>>) -> Application {
        Application {
            url,
            name: self.name,
            version: self.version,
            release_date: self.release_date,
            dependencies,
            data_directory: self.data_directory,
            install_commands: self.install_commands,
            install_directory: self.install_directory,
            previous_version_install_directory: self.previous_version_install_directory,
        }
    }
}

impl PartialEq for Application {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Application {}

impl Hash for Application {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name.as_deref().unwrap_or_default(),
            self.url
        )
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|value| value.trim().is_empty()).unwrap_or(true)
}

/// ISO-8601 release dates, with or without a time or offset.
pub mod release_date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn parse(input: &str) -> Option<NaiveDateTime> {
        let trimmed = input.trim();
        if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(value.naive_utc());
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(value) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Some(value);
            }
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    }

    pub fn format(value: &NaiveDateTime) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_str(&format(value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid release date: {raw}"))),
        }
    }
}
