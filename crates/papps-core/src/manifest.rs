use anyhow::{Context, Result};
use tracing::debug;

use crate::application::{Application, ApplicationDocument};
use crate::error::PappsError;

/// Rewrites the `papp://` and `papps://` schemes to their transport scheme.
pub fn normalize_manifest_url(url: &str) -> String {
    let trimmed = url.trim();
    for (scheme, transport) in [("papp://", "http://"), ("papps://", "https://")] {
        let matches_scheme = trimmed
            .get(..scheme.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(scheme));
        if matches_scheme {
            return format!("{transport}{}", &trimmed[scheme.len()..]);
        }
    }
    trimmed.to_string()
}

/// Loads manifests through an injected fetch function.
///
/// Dependencies are resolved eagerly and recursively. A URL that is already
/// being resolved higher up the chain fails with
/// [`PappsError::CyclicDependency`] instead of recursing forever.
pub struct ManifestLoader<F> {
    fetch: F,
}

impl<F> ManifestLoader<F>
where
    F: Fn(&str) -> Result<String>,
{
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }

    pub fn load(&self, url: &str) -> Result<Application> {
        let mut resolving = Vec::new();
        self.load_resolving(url, &mut resolving)
    }

    /// Resolves a manifest body that was obtained some other way, such as an
    /// update check response.
    pub fn load_from_str(&self, url: &str, body: &str) -> Result<Application> {
        let url = normalize_manifest_url(url);
        let mut resolving = Vec::new();
        self.resolve_body(url, body, &mut resolving)
    }

    fn load_resolving(&self, url: &str, resolving: &mut Vec<String>) -> Result<Application> {
        let url = normalize_manifest_url(url);
        if resolving.contains(&url) {
            let mut chain = resolving.clone();
            chain.push(url);
            return Err(PappsError::CyclicDependency { chain }.into());
        }

        debug!(url = %url, "fetching manifest");
        let body = (self.fetch)(&url).context(PappsError::Transport { url: url.clone() })?;
        self.resolve_body(url, &body, resolving)
    }

    fn resolve_body(
        &self,
        url: String,
        body: &str,
        resolving: &mut Vec<String>,
    ) -> Result<Application> {
        if resolving.contains(&url) {
            let mut chain = resolving.clone();
            chain.push(url);
            return Err(PappsError::CyclicDependency { chain }.into());
        }

        let document: ApplicationDocument =
            serde_json::from_str(body).context(PappsError::Parse { url: url.clone() })?;

        resolving.push(url.clone());
        let dependencies = self.resolve_dependencies(document.dependencies.as_deref(), resolving);
        resolving.pop();

        Ok(document.into_application(url, dependencies?))
    }

    fn resolve_dependencies(
        &self,
        urls: Option<&[String]>,
        resolving: &mut Vec<String>,
    ) -> Result<Option<Vec<Application>>> {
        let Some(urls) = urls else {
            return Ok(None);
        };

        let mut dependencies = Vec::with_capacity(urls.len());
        for dependency_url in urls {
            let dependency = self
                .load_resolving(dependency_url, resolving)
                .context("Couldn't load the dependency")?;
            dependencies.push(dependency);
        }
        Ok(Some(dependencies))
    }
}
