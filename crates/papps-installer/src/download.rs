use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::fs_utils::remove_file_if_exists;
use crate::services::Downloader;

const USER_AGENT: &str = concat!("papps/", env!("CARGO_PKG_VERSION"));

pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .context("failed to build http client")?;
        Ok(Self { client })
    }
}

impl Downloader for HttpDownloader {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let part_path = destination.with_file_name(format!(
            "{}.part",
            destination
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("download")
        ));

        let result = self.download_to(url, &part_path, progress);
        if let Err(err) = result {
            if let Err(cleanup_err) = remove_file_if_exists(&part_path) {
                warn!(path = %part_path.display(), "failed to remove partial download: {cleanup_err:#}");
            }
            return Err(err);
        }

        remove_file_if_exists(destination)
            .with_context(|| format!("failed to replace {}", destination.display()))?;
        fs::rename(&part_path, destination).with_context(|| {
            format!(
                "failed to move downloaded file into place: {}",
                destination.display()
            )
        })
    }
}

impl HttpDownloader {
    fn download_to(
        &self,
        url: &str,
        out_path: &Path,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<()> {
        debug!(url, path = %out_path.display(), "downloading");
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to download {url}"))?;
        let total = response.content_length();

        let mut out = File::create(out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        let mut buffer = [0_u8; 64 * 1024];
        let mut downloaded = 0_u64;
        progress(0, total);
        loop {
            let read = response
                .read(&mut buffer)
                .with_context(|| format!("failed reading response body from {url}"))?;
            if read == 0 {
                break;
            }
            out.write_all(&buffer[..read])
                .with_context(|| format!("failed to write {}", out_path.display()))?;
            downloaded += read as u64;
            progress(downloaded, total);
        }
        out.flush()
            .with_context(|| format!("failed to flush {}", out_path.display()))?;
        Ok(())
    }
}
