//! Process handle for worker subprocesses.
//!
//! Owns the read end of the worker's channel and guarantees the process is
//! reaped exactly once, either explicitly through [`Proc::wait`] or on drop.

use super::ipc::PipeFd;
use crate::error::{Result, SmpError};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::os::unix::io::{AsFd, BorrowedFd, OwnedFd};
use std::process::{Child, ChildStdin};
use std::time::Duration;

/// How long a dropped worker gets to exit after SIGTERM before SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_millis(50);

/// Handle to a worker subprocess and its result channel.
#[derive(Debug)]
pub struct Proc {
    /// Process ID
    pid: Pid,
    /// Read end of the worker's stdout pipe
    channel: PipeFd,
    /// Whether the process has been reaped
    reaped: bool,
}

impl Proc {
    /// Create a new process handle from its components.
    pub fn new(pid: Pid, channel: PipeFd) -> Self {
        Self {
            pid,
            channel,
            reaped: false,
        }
    }

    /// Create from a spawned `std::process::Child`.
    ///
    /// Takes ownership of the child's stdout as the channel and hands back
    /// its stdin for the input handshake. Both pipes must have been captured.
    pub fn from_child(mut child: Child) -> Result<(Self, ChildStdin)> {
        let pid = Pid::from_raw(child.id() as i32);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SmpError::Worker("Child stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SmpError::Worker("Child stdout not captured".into()))?;

        // Dropping `child` neither waits nor kills; reaping is ours from here.
        let channel = PipeFd::new(OwnedFd::from(stdout));
        Ok((Self::new(pid, channel), stdin))
    }

    /// Get the process ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Mutable access to the channel for reading.
    pub fn channel_mut(&mut self) -> &mut PipeFd {
        &mut self.channel
    }

    /// Whether [`Proc::wait`] or [`Proc::try_wait`] has reaped the process.
    pub fn is_reaped(&self) -> bool {
        self.reaped
    }

    /// Wait for the process to exit (blocking).
    pub fn wait(&mut self) -> Result<WaitStatus> {
        if self.reaped {
            return Err(SmpError::Worker("Process already reaped".into()));
        }
        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    self.reaped = true;
                    return Ok(status);
                }
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    // ECHILD: nothing left to reap.
                    self.reaped = true;
                    return Err(SmpError::Worker(format!("waitpid failed: {}", e)));
                }
            }
        }
    }

    /// Try to wait for the process (non-blocking).
    ///
    /// Returns `None` if the process is still running.
    pub fn try_wait(&mut self) -> Result<Option<WaitStatus>> {
        if self.reaped {
            return Err(SmpError::Worker("Process already reaped".into()));
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => Ok(None),
            Ok(status) => {
                self.reaped = true;
                Ok(Some(status))
            }
            Err(e) => {
                self.reaped = true;
                Err(SmpError::Worker(format!("waitpid failed: {}", e)))
            }
        }
    }

    /// Send SIGTERM to the process.
    pub fn terminate(&self) -> Result<()> {
        if self.reaped {
            return Ok(());
        }
        signal::kill(self.pid, Signal::SIGTERM)
            .map_err(|e| SmpError::Worker(format!("Failed to send SIGTERM: {}", e)))
    }

    /// Send SIGKILL to the process and wait for it to exit.
    pub fn kill(&mut self) -> Result<()> {
        if self.reaped {
            return Ok(());
        }
        signal::kill(self.pid, Signal::SIGKILL)
            .map_err(|e| SmpError::Worker(format!("Failed to send SIGKILL: {}", e)))?;
        self.wait()?;
        Ok(())
    }
}

impl AsFd for Proc {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.channel.as_fd()
    }
}

impl Drop for Proc {
    fn drop(&mut self) {
        if self.is_reaped() {
            return;
        }
        tracing::debug!(pid = self.pid.as_raw(), "Terminating unreaped worker");
        let _ = self.terminate();

        let deadline = std::time::Instant::now() + TERMINATE_GRACE;
        while std::time::Instant::now() < deadline {
            match self.try_wait() {
                Ok(Some(_)) | Err(_) => return,
                Ok(None) => std::thread::sleep(Duration::from_millis(5)),
            }
        }

        if let Err(e) = self.kill() {
            tracing::debug!(pid = self.pid.as_raw(), error = %e, "Failed to kill worker");
        }
        self.reaped = true;
    }
}
