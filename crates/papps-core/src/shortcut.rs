use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Normal,
    Minimized,
    Maximized,
}

impl DisplayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Minimized => "minimized",
            Self::Maximized => "maximized",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "minimized" => Some(Self::Minimized),
            "maximized" => Some(Self::Maximized),
            _ => None,
        }
    }
}

/// A start-menu or desktop link.
///
/// Every path-bearing field is kept in `%NAME%` token form so the record
/// stays valid when the portable drive is mounted elsewhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shortcut {
    pub file_name: String,
    pub target: String,
    pub arguments: Option<String>,
    pub working_directory: Option<String>,
    pub icon_path: Option<String>,
    #[serde(default)]
    pub display_mode: DisplayMode,
    pub description: Option<String>,
}
