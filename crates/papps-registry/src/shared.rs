use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

use crate::registry::ApplicationRegistry;

/// A registry reachable from several call sites, such as a foreground
/// command and a background update check. Each operation holds the lock for
/// its whole duration.
#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<ApplicationRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: ApplicationRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    pub fn with<T>(&self, operation: impl FnOnce(&mut ApplicationRegistry) -> Result<T>) -> Result<T> {
        let mut registry = self
            .inner
            .lock()
            .map_err(|_| anyhow!("application registry lock poisoned"))?;
        operation(&mut registry)
    }
}
