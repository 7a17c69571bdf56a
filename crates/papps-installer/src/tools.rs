use papps_core::{ExternalTool, PappsError};
use std::path::{Path, PathBuf};

const SEVEN_ZIP_NAMES: &[&str] = &["7z", "7za"];
const UNIEXTRACT_NAMES: &[&str] = &["uniextract"];

/// Where the external extraction helpers live.
///
/// An explicitly configured path wins; otherwise the executable is looked up
/// on `PATH`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    seven_zip: Option<PathBuf>,
    uniextract: Option<PathBuf>,
    configured_seven_zip: Option<PathBuf>,
    configured_uniextract: Option<PathBuf>,
}

impl ToolPaths {
    pub fn discover() -> Self {
        Self::with_overrides(None, None)
    }

    pub fn with_overrides(seven_zip: Option<PathBuf>, uniextract: Option<PathBuf>) -> Self {
        Self {
            seven_zip: resolve(seven_zip.as_deref(), SEVEN_ZIP_NAMES),
            uniextract: resolve(uniextract.as_deref(), UNIEXTRACT_NAMES),
            configured_seven_zip: seven_zip,
            configured_uniextract: uniextract,
        }
    }

    /// Fixed locations without any lookup, used when the caller already knows
    /// what exists.
    pub fn fixed(seven_zip: Option<PathBuf>, uniextract: Option<PathBuf>) -> Self {
        Self {
            seven_zip: seven_zip.clone(),
            uniextract: uniextract.clone(),
            configured_seven_zip: seven_zip,
            configured_uniextract: uniextract,
        }
    }

    pub fn locate(&self, tool: ExternalTool) -> Option<&Path> {
        match tool {
            ExternalTool::SevenZip => self.seven_zip.as_deref(),
            ExternalTool::UniExtract => self.uniextract.as_deref(),
        }
    }

    pub fn require(&self, tool: ExternalTool) -> Result<&Path, PappsError> {
        self.locate(tool).ok_or_else(|| self.missing(tool))
    }

    /// Fails on the first tool in `tools` that cannot be found.
    pub fn preflight(&self, tools: &[ExternalTool]) -> Result<(), PappsError> {
        for tool in tools {
            self.require(*tool)?;
        }
        Ok(())
    }

    fn missing(&self, tool: ExternalTool) -> PappsError {
        let (configured, names) = match tool {
            ExternalTool::SevenZip => (&self.configured_seven_zip, SEVEN_ZIP_NAMES),
            ExternalTool::UniExtract => (&self.configured_uniextract, UNIEXTRACT_NAMES),
        };
        let searched = match configured {
            Some(path) => path.display().to_string(),
            None => format!("PATH ({})", names.join(", ")),
        };
        PappsError::Validation(format!(
            "{} could not be found in: {searched}",
            tool.display_name()
        ))
    }
}

fn resolve(configured: Option<&Path>, names: &[&str]) -> Option<PathBuf> {
    if let Some(path) = configured {
        return path.is_file().then(|| path.to_path_buf());
    }
    names.iter().find_map(|name| which::which(name).ok())
}
