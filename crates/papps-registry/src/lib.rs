mod phase;
mod registry;
mod shared;
mod sidecar;
mod update;

pub use phase::InstallPhase;
pub use registry::{require_registered, ApplicationRegistry};
pub use shared::SharedRegistry;
pub use sidecar::{read_installed_applications, read_sidecar, write_sidecar};
pub use update::{fetch_text, http_client, parse_update_response, HttpUpdateChecker, UpdateChecker};

#[cfg(test)]
mod tests;
