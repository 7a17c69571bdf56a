use anyhow::Result;
use papps_core::Shortcut;
use std::path::Path;
use tracing::info;

use crate::download::HttpDownloader;
use crate::extract::ArchiveExtractor;
use crate::layout::InstallLayout;
use crate::process::SystemProcessSpawner;
use crate::shortcuts::FileShortcutStore;
use crate::tools::ToolPaths;

/// Unpacks an archive found at `archive` into `destination`.
pub trait ExtractionBackend: Send {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()>;
}

/// Runs a program to completion and reports its exit code.
pub trait ProcessSpawner: Send {
    fn run(&self, program: &Path, arguments: &[String], working_directory: &Path) -> Result<i32>;
}

/// Streams `url` into `destination`, reporting `(downloaded, total)` as it goes.
pub trait Downloader: Send {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<()>;
}

/// Interaction with whoever drives the installation.
pub trait UserPrompt: Send {
    fn display(&self, message: &str) -> Result<()>;

    /// Returns `false` when the user declines the agreement.
    fn accept_eula(&self, text: &str) -> Result<bool>;

    fn download_started(&self, _url: &str) {}

    fn download_progress(&self, _downloaded: u64, _total: Option<u64>) {}

    fn download_finished(&self, _url: &str) {}
}

/// Platform shortcut storage. Records passed in and handed back use
/// `%NAME%` token paths.
pub trait ShortcutService: Send {
    fn add(&self, shortcut: &Shortcut) -> Result<()>;

    /// Returns `false` when no shortcut exists at the record's location.
    fn remove(&self, shortcut: &Shortcut) -> Result<bool>;

    /// Shortcuts whose target lies under the installation base directory.
    fn list(&self) -> Result<Vec<Shortcut>>;

    fn clear(&self) -> Result<()>;
}

/// Prompt for unattended runs: messages go to the log and the EULA answer is
/// fixed up front.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnattendedPrompt {
    pub accept_eulas: bool,
}

impl UserPrompt for UnattendedPrompt {
    fn display(&self, message: &str) -> Result<()> {
        info!(message, "installer message");
        Ok(())
    }

    fn accept_eula(&self, _text: &str) -> Result<bool> {
        Ok(self.accept_eulas)
    }
}

/// Every collaborator a step list needs while it runs.
pub struct InstallServices {
    pub extractor: Box<dyn ExtractionBackend>,
    pub spawner: Box<dyn ProcessSpawner>,
    pub downloader: Box<dyn Downloader>,
    pub prompt: Box<dyn UserPrompt>,
    pub shortcuts: Box<dyn ShortcutService>,
    pub tools: ToolPaths,
}

impl InstallServices {
    /// Default implementations backed by the local machine.
    pub fn system(layout: &InstallLayout, prompt: Box<dyn UserPrompt>) -> Result<Self> {
        Ok(Self {
            extractor: Box::new(ArchiveExtractor),
            spawner: Box::new(SystemProcessSpawner),
            downloader: Box::new(HttpDownloader::new()?),
            prompt,
            shortcuts: Box::new(FileShortcutStore::new(layout.clone())),
            tools: ToolPaths::discover(),
        })
    }

    pub fn with_extractor(mut self, extractor: Box<dyn ExtractionBackend>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_spawner(mut self, spawner: Box<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_downloader(mut self, downloader: Box<dyn Downloader>) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_shortcuts(mut self, shortcuts: Box<dyn ShortcutService>) -> Self {
        self.shortcuts = shortcuts;
        self
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }
}
