//! Host capability check for process-based workers.

use crate::error::{Result, SmpError};

/// Evidence that the host can run worker processes.
///
/// Obtained once when a [`Parallelized`](crate::Parallelized) is built and
/// stored in it; nothing is cached globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSupport {
    family: &'static str,
}

impl ProcessSupport {
    /// Check the running host.
    pub fn probe() -> Result<Self> {
        Self::for_family(std::env::consts::FAMILY)
    }

    /// Check a target family as reported by `std::env::consts::FAMILY`.
    ///
    /// Workers need `poll(2)`, `waitpid(2)` and fd redirection, so only Unix
    /// qualifies.
    pub fn for_family(family: &'static str) -> Result<Self> {
        match family {
            "unix" => Ok(Self { family }),
            other => Err(SmpError::UnsupportedPlatform(format!(
                "{} ({} family)",
                std::env::consts::OS,
                if other.is_empty() { "unknown" } else { other }
            ))),
        }
    }

    /// Target family the check passed for.
    pub fn family(&self) -> &'static str {
        self.family
    }
}
