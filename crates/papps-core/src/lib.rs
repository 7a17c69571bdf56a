mod application;
mod environment;
mod error;
mod manifest;
mod path_matcher;
mod paths;
mod settings;
mod shortcut;
mod step;
mod step_list;

pub use application::{release_date, Application, ApplicationDocument, SIDECAR_FILE_NAME};
pub use environment::{
    start_menu_dir, EnvironmentVariables, BASE_DIR_VARIABLE, START_MENU_DIR_VARIABLE,
};
pub use error::PappsError;
pub use manifest::{normalize_manifest_url, ManifestLoader};
pub use path_matcher::{validate_wildcard, wildcard_to_regex, PathMatcher};
pub use paths::{
    ends_with_separator, is_separator, relative_components, resolve_relative, safe_file_name,
    validate_relative_path,
};
pub use settings::{
    RegistryConfig, Settings, DEFAULT_START_MENU_DIRECTORY_NAME, DEFAULT_UPDATE_CHECK_INTERVAL,
    MIN_UPDATE_CHECK_INTERVAL,
};
pub use shortcut::{DisplayMode, Shortcut};
pub use step::{
    DeleteStep, DisplayStep, DownloadStep, ErrorStep, EulaStep, ExecuteStep, ExternalTool,
    ExtractStep, InstallStep, MoveStep, SevenZipStep, ShortcutStep, UniversalExtractStep,
    MULTIPLE_ACTIONS, NO_KNOWN_ACTION,
};
pub use step_list::StepList;
