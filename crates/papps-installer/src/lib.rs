use anyhow::{Context, Result};
use std::time::{SystemTime, UNIX_EPOCH};

mod download;
mod execute;
mod extract;
mod fs_utils;
mod layout;
mod process;
mod services;
mod shortcuts;
mod tools;

pub use download::HttpDownloader;
pub use execute::{StepContext, StepSession};
pub use extract::ArchiveExtractor;
pub use fs_utils::{
    copy_dir_recursive, is_empty_dir, move_dir_or_copy, prune_empty_dirs, relative_files,
    remove_dir_all_if_exists, remove_file_if_exists,
};
pub use layout::{has_backup_suffix, InstallLayout, BACKUP_SUFFIX, MAX_DIRECTORY_SUFFIX};
pub use process::{split_command_line, SystemProcessSpawner};
pub use services::{
    Downloader, ExtractionBackend, InstallServices, ProcessSpawner, ShortcutService,
    UnattendedPrompt, UserPrompt,
};
pub use shortcuts::FileShortcutStore;
pub use tools::ToolPaths;

pub fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}
