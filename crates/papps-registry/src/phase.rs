use anyhow::{anyhow, Result};
use std::fmt;

/// Where an install attempt stands.
///
/// ```text
/// Validated -> BackedUp -> Executed -> Committed
///                  \           \
///                   `-----------`--> RolledBack
/// ```
///
/// `BackedUp` is entered even when there was nothing to back up, so every
/// attempt walks the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallPhase {
    Validated,
    BackedUp,
    Executed,
    Committed,
    RolledBack,
}

impl InstallPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::BackedUp => "backed_up",
            Self::Executed => "executed",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn can_transition_to(self, next: InstallPhase) -> bool {
        matches!(
            (self, next),
            (Self::Validated, Self::BackedUp)
                | (Self::Validated, Self::RolledBack)
                | (Self::BackedUp, Self::Executed)
                | (Self::BackedUp, Self::RolledBack)
                | (Self::Executed, Self::Committed)
                | (Self::Executed, Self::RolledBack)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    /// Whether a failure in this phase leaves filesystem state to undo.
    pub fn needs_rollback(self) -> bool {
        matches!(self, Self::BackedUp | Self::Executed)
    }

    pub(crate) fn advance(&mut self, next: InstallPhase) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(anyhow!(
                "invalid install phase transition: {} -> {}",
                self.as_str(),
                next.as_str()
            ));
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
