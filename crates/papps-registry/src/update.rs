use anyhow::{anyhow, Context, Result};
use papps_core::PappsError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("papps/", env!("CARGO_PKG_VERSION"));

/// Asks a remote service which installed applications have newer releases.
///
/// `installed` maps each application URL to its release date. The answer
/// maps the URL of every application that can be upgraded to the JSON body
/// of its new manifest.
pub trait UpdateChecker {
    fn check(&self, installed: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>>;
}

pub struct HttpUpdateChecker {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpUpdateChecker {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: http_client()?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl UpdateChecker for HttpUpdateChecker {
    fn check(&self, installed: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
        debug!(endpoint = %self.endpoint, applications = installed.len(), "checking for updates");
        let body = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_string(installed).context("failed to encode update request")?)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .context(PappsError::Transport {
                url: self.endpoint.clone(),
            })?;

        parse_update_response(&body).context(PappsError::Parse {
            url: self.endpoint.clone(),
        })
    }
}

/// Splits an update response into one manifest body per application URL.
pub fn parse_update_response(body: &str) -> Result<BTreeMap<String, String>> {
    let value: Value = serde_json::from_str(body).context("update response is not valid JSON")?;
    let Value::Object(entries) = value else {
        return Err(anyhow!("update response must be a JSON object"));
    };
    manifest_bodies(entries)
}

fn manifest_bodies(entries: Map<String, Value>) -> Result<BTreeMap<String, String>> {
    let mut updates = BTreeMap::new();
    for (url, manifest) in entries {
        if !manifest.is_object() {
            return Err(anyhow!("update for {url} is not a manifest object"));
        }
        updates.insert(url, manifest.to_string());
    }
    Ok(updates)
}

/// Blocking HTTP client shared by manifest fetching and update checks.
pub fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("failed to build http client")
}

/// Fetch function for [`papps_core::ManifestLoader`].
pub fn fetch_text(client: &reqwest::blocking::Client, url: &str) -> Result<String> {
    client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .with_context(|| format!("request to {url} failed"))
}
