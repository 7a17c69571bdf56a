use papps_security::ExpectedHash;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::path_matcher::validate_wildcard;
use crate::paths::{ends_with_separator, validate_relative_path};
use crate::shortcut::DisplayMode;

pub const NO_KNOWN_ACTION: &str = "Invalid JSON: No known action type defined.";
pub const MULTIPLE_ACTIONS: &str = "Invalid JSON: More than one type of action defined per action.";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteStep {
    pub files: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayStep {
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadStep {
    pub url: Option<String>,
    pub destination_file: Option<String>,
    pub hash: Option<String>,
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorStep {
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EulaStep {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteStep {
    pub filename: Option<String>,
    pub arguments: Option<String>,
    #[serde(default = "fail_on_error_default")]
    pub fail_on_error: bool,
}

impl Default for ExecuteStep {
    fn default() -> Self {
        Self {
            filename: None,
            arguments: None,
            fail_on_error: true,
        }
    }
}

fn fail_on_error_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractStep {
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveStep {
    #[serde(default)]
    pub from_directory: String,
    #[serde(default = "include_all_files")]
    pub include_files: String,
    #[serde(default)]
    pub to_directory: String,
}

impl Default for MoveStep {
    fn default() -> Self {
        Self {
            from_directory: String::new(),
            include_files: include_all_files(),
            to_directory: String::new(),
        }
    }
}

fn include_all_files() -> String {
    "**".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShortcutStep {
    #[serde(rename = "file", alias = "name")]
    pub file: Option<String>,
    pub target: Option<String>,
    pub arguments: Option<String>,
    pub working_directory: Option<String>,
    pub icon: Option<String>,
    #[serde(default)]
    pub display_mode: DisplayMode,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SevenZipStep {
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UniversalExtractStep {
    pub file: Option<String>,
    #[serde(default = "current_directory")]
    pub to_directory: String,
}

impl Default for UniversalExtractStep {
    fn default() -> Self {
        Self {
            file: None,
            to_directory: current_directory(),
        }
    }
}

fn current_directory() -> String {
    ".".to_string()
}

/// Helper programs some steps shell out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalTool {
    SevenZip,
    UniExtract,
}

impl ExternalTool {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::SevenZip => "7-Zip",
            Self::UniExtract => "UniExtract",
        }
    }
}

/// One atomic action of an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStep {
    Delete(DeleteStep),
    Display(DisplayStep),
    Download(DownloadStep),
    Error(ErrorStep),
    Eula(EulaStep),
    Execute(ExecuteStep),
    Extract(ExtractStep),
    Move(MoveStep),
    Shortcut(ShortcutStep),
    SevenZipArchive(SevenZipStep),
    UniversalExtract(UniversalExtractStep),
}

const STEP_TAGS: [&str; 11] = [
    "delete",
    "display",
    "download",
    "error",
    "eula",
    "execute",
    "extract",
    "move",
    "shortcut",
    "7zip",
    "uniextract",
];

impl InstallStep {
    /// Manifest key naming this variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Delete(_) => "delete",
            Self::Display(_) => "display",
            Self::Download(_) => "download",
            Self::Error(_) => "error",
            Self::Eula(_) => "eula",
            Self::Execute(_) => "execute",
            Self::Extract(_) => "extract",
            Self::Move(_) => "move",
            Self::Shortcut(_) => "shortcut",
            Self::SevenZipArchive(_) => "7zip",
            Self::UniversalExtract(_) => "uniextract",
        }
    }

    pub fn required_tool(&self) -> Option<ExternalTool> {
        match self {
            Self::SevenZipArchive(_) => Some(ExternalTool::SevenZip),
            Self::UniversalExtract(_) => Some(ExternalTool::UniExtract),
            _ => None,
        }
    }

    /// Returns the first problem with this step, if any.
    pub fn validate(&self) -> Option<String> {
        match self {
            Self::Delete(step) => validate_wildcard("files", step.files.as_deref()),
            Self::Display(step) => {
                is_blank(step.message.as_deref()).then(|| "Message is not defined.".to_string())
            }
            Self::Download(step) => validate_download(step),
            Self::Error(_) => None,
            Self::Eula(step) => {
                is_blank(step.text.as_deref()).then(|| "Text is not defined.".to_string())
            }
            Self::Execute(step) => {
                if is_blank(step.filename.as_deref()) {
                    return Some("FileName is not defined.".to_string());
                }
                validate_relative_path("filename", step.filename.as_deref(), false)
            }
            Self::Extract(step) => validate_relative_path("file", step.file.as_deref(), false),
            Self::Move(step) => validate_relative_path(
                "from_directory",
                Some(&step.from_directory),
                true,
            )
            .or_else(|| validate_wildcard("include_files", Some(&step.include_files)))
            .or_else(|| validate_relative_path("to_directory", Some(&step.to_directory), true)),
            Self::Shortcut(step) => validate_shortcut(step),
            Self::SevenZipArchive(step) => is_blank(step.arguments.as_deref())
                .then(|| "Arguments is not defined.".to_string()),
            Self::UniversalExtract(step) => {
                validate_relative_path("file", step.file.as_deref(), false)
                    .or_else(|| not_ending_with_separator("file", step.file.as_deref()))
                    .or_else(|| {
                        validate_relative_path("to_directory", Some(&step.to_directory), true)
                    })
                    .or_else(|| not_ending_with_separator("to_directory", Some(&step.to_directory)))
            }
        }
    }

    /// Short human readable summary used in logs and listings.
    pub fn describe(&self) -> String {
        match self {
            Self::Delete(step) => format!("Delete {}", step.files.as_deref().unwrap_or_default()),
            Self::Display(_) => "Display message".to_string(),
            Self::Download(step) => format!(
                "Download {} as {}",
                step.url.as_deref().unwrap_or_default(),
                step.destination_file.as_deref().unwrap_or_default()
            ),
            Self::Error(step) => format!(
                "Error: {}",
                step.message.as_deref().unwrap_or("Undefined error message.")
            ),
            Self::Eula(_) => "Accept EULA".to_string(),
            Self::Execute(step) => format!(
                "Execute {} {}",
                step.filename.as_deref().unwrap_or_default(),
                step.arguments.as_deref().unwrap_or_default()
            )
            .trim_end()
            .to_string(),
            Self::Extract(step) => format!("Extract {}", step.file.as_deref().unwrap_or_default()),
            Self::Move(step) => format!(
                "Move {} from '{}' to '{}'",
                step.include_files, step.from_directory, step.to_directory
            ),
            Self::Shortcut(step) => format!(
                "Shortcut {} -> {}",
                step.file.as_deref().unwrap_or_default(),
                step.target.as_deref().unwrap_or_default()
            ),
            Self::SevenZipArchive(step) => {
                format!("7-Zip {}", step.arguments.as_deref().unwrap_or_default())
            }
            Self::UniversalExtract(step) => format!(
                "UniExtract {} to {}",
                step.file.as_deref().unwrap_or_default(),
                step.to_directory
            ),
        }
    }

    /// Decodes one single-key manifest object.
    pub fn from_json_object(object: Map<String, Value>) -> Result<Self, String> {
        let mut known = object
            .into_iter()
            .filter(|(key, _)| STEP_TAGS.contains(&key.as_str()));
        let Some((tag, body)) = known.next() else {
            return Err(NO_KNOWN_ACTION.to_string());
        };
        if known.next().is_some() {
            return Err(MULTIPLE_ACTIONS.to_string());
        }

        decode_variant(&tag, body).map_err(|err| format!("Invalid JSON: invalid {tag} action: {err}"))
    }

    fn body(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Delete(step) => serde_json::to_value(step),
            Self::Display(step) => serde_json::to_value(step),
            Self::Download(step) => serde_json::to_value(step),
            Self::Error(step) => serde_json::to_value(step),
            Self::Eula(step) => serde_json::to_value(step),
            Self::Execute(step) => serde_json::to_value(step),
            Self::Extract(step) => serde_json::to_value(step),
            Self::Move(step) => serde_json::to_value(step),
            Self::Shortcut(step) => serde_json::to_value(step),
            Self::SevenZipArchive(step) => serde_json::to_value(step),
            Self::UniversalExtract(step) => serde_json::to_value(step),
        }
    }
}

fn decode_variant(tag: &str, body: Value) -> Result<InstallStep, serde_json::Error> {
    let step = match tag {
        "delete" => InstallStep::Delete(serde_json::from_value(body)?),
        "display" => InstallStep::Display(serde_json::from_value(body)?),
        "download" => InstallStep::Download(serde_json::from_value(body)?),
        "error" => InstallStep::Error(serde_json::from_value(body)?),
        "eula" => InstallStep::Eula(serde_json::from_value(body)?),
        "execute" => InstallStep::Execute(serde_json::from_value(body)?),
        "extract" => InstallStep::Extract(serde_json::from_value(body)?),
        "move" => InstallStep::Move(serde_json::from_value(body)?),
        "shortcut" => InstallStep::Shortcut(serde_json::from_value(body)?),
        "7zip" => InstallStep::SevenZipArchive(serde_json::from_value(body)?),
        "uniextract" => InstallStep::UniversalExtract(serde_json::from_value(body)?),
        other => {
            return Err(serde_json::Error::custom(format!(
                "unsupported action type: {other}"
            )))
        }
    };
    Ok(step)
}

impl Serialize for InstallStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = self.body().map_err(serde::ser::Error::custom)?;
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.type_name(), &body)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for InstallStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let object = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_json_object(object).map_err(D::Error::custom)
    }
}

fn validate_download(step: &DownloadStep) -> Option<String> {
    if let Some(message) =
        validate_relative_path("destination_file", step.destination_file.as_deref(), false)
    {
        return Some(message);
    }
    if is_blank(step.url.as_deref()) {
        return Some("URL not provided".to_string());
    }
    match step.hash.as_deref().map(str::trim) {
        Some(hash) if !hash.is_empty() => ExpectedHash::parse(hash)
            .err()
            .map(|err| format!("Invalid hash: {err}")),
        _ => None,
    }
}

fn validate_shortcut(step: &ShortcutStep) -> Option<String> {
    if let Some(message) = validate_relative_path("file", step.file.as_deref(), false) {
        return Some(message);
    }
    let file = step.file.as_deref().unwrap_or_default();
    if !file.to_ascii_lowercase().ends_with(".lnk") {
        return Some("Shortcut name should be a *.lnk file.".to_string());
    }
    if is_blank(step.target.as_deref()) {
        return Some("Target is not defined.".to_string());
    }
    validate_optional_relative_path("working_directory", step.working_directory.as_deref())
        .or_else(|| validate_optional_relative_path("icon", step.icon.as_deref()))
}

fn validate_optional_relative_path(field: &str, path: Option<&str>) -> Option<String> {
    path.and_then(|path| validate_relative_path(field, Some(path), true))
}

fn not_ending_with_separator(field: &str, path: Option<&str>) -> Option<String> {
    path.filter(|path| ends_with_separator(path))
        .map(|_| format!("{field} should not end with a path separator."))
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|value| value.trim().is_empty()).unwrap_or(true)
}
