//! Exit analysis for reaped workers.
//!
//! A one-shot worker that dies without completing its frame is reported as a
//! protocol violation; the termination reason is attached to that report.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use std::fmt;

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by SIGKILL, which on Linux is usually the OOM killer.
    Killed,
    /// SIGSEGV or SIGBUS, typically a stack overflow.
    Crashed(Signal),
    /// SIGABRT, e.g. `std::process::abort` or a panic with `panic = "abort"`.
    Aborted,
    /// Any other signal.
    Signaled(Signal),
    /// Not reaped, or the wait status carried no exit information.
    Unknown,
}

impl TerminationReason {
    /// Check if this is a successful exit.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {}", code),
            Self::Killed => write!(f, "killed by SIGKILL (possibly out of memory)"),
            Self::Crashed(sig) => write!(f, "crashed with {:?} (possibly stack overflow)", sig),
            Self::Aborted => write!(f, "aborted (SIGABRT)"),
            Self::Signaled(sig) => write!(f, "killed by signal {:?}", sig),
            Self::Unknown => write!(f, "terminated for an unknown reason"),
        }
    }
}

/// Analyze a `WaitStatus` to determine the termination reason.
pub fn analyze_wait_status(status: WaitStatus) -> TerminationReason {
    match status {
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),
        WaitStatus::Signaled(_, signal, _) => match signal {
            Signal::SIGKILL => TerminationReason::Killed,
            Signal::SIGSEGV | Signal::SIGBUS => TerminationReason::Crashed(signal),
            Signal::SIGABRT => TerminationReason::Aborted,
            _ => TerminationReason::Signaled(signal),
        },
        _ => TerminationReason::Unknown,
    }
}
