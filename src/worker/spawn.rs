//! Worker subprocess spawning.
//!
//! Workers are launched with `std::process::Command` (posix_spawn/fork+exec
//! under the hood) rather than a bare `fork()`, so each one starts from a
//! clean, independently initialized process image. The task name travels in
//! the environment and the serialized input is written to the worker's
//! stdin, which is then closed.

use super::WORKER_TASK_ENV;
use super::proc::Proc;
use crate::config::WorkerCommand;
use crate::error::{Result, SmpError};
use std::io::{self, Write};
use std::process::{Command, Stdio};
use tracing::{debug, instrument, warn};

/// Build the command that launches one worker for `task_name`.
fn worker_command(command: &WorkerCommand, task_name: &str) -> Command {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);
    cmd.envs(command.env.iter().map(|(k, v)| (k, v)));
    cmd.env(WORKER_TASK_ENV, task_name);

    // std creates these pipes close-on-exec, so a worker never inherits
    // another worker's channel and EOF arrives as soon as it exits.
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit()); // Worker diagnostics go to parent's stderr

    // macOS-specific: disable fork safety check for Objective-C
    #[cfg(target_os = "macos")]
    cmd.env("OBJC_DISABLE_INITIALIZE_FORK_SAFETY", "YES");

    cmd
}

/// Spawn a worker for task `index` and hand it its input.
///
/// A failure to create the process or its pipes is returned as
/// [`SmpError::Spawn`]. A failure to deliver the input is only logged: the
/// worker then cannot produce a frame and the controller reports the task as
/// a protocol violation once the channel closes.
#[instrument(level = "debug", skip(command, input), fields(input_bytes = input.len()))]
pub fn spawn_worker(
    command: &WorkerCommand,
    task_name: &str,
    index: usize,
    input: &[u8],
) -> Result<Proc> {
    let child = worker_command(command, task_name)
        .spawn()
        .map_err(|source| SmpError::Spawn { index, source })?;

    let (proc, mut stdin) = Proc::from_child(child)?;
    debug!(pid = proc.pid().as_raw(), "Worker spawned");

    match stdin.write_all(input).and_then(|()| stdin.flush()) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!(pid = proc.pid().as_raw(), "Worker exited before reading its input");
        }
        Err(e) => {
            warn!(pid = proc.pid().as_raw(), error = %e, "Failed to send input to worker");
        }
    }
    // Closing stdin marks the end of the input.
    drop(stdin);

    Ok(proc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::WaitStatus;
    use std::path::PathBuf;

    #[test]
    fn test_worker_command_sets_task_env() {
        let command = WorkerCommand::new("/bin/true").with_arg("--flag");
        let cmd = worker_command(&command, "sine");
        assert_eq!(cmd.get_program(), "/bin/true");
        assert_eq!(cmd.get_args().collect::<Vec<_>>(), vec!["--flag"]);
        let task = cmd
            .get_envs()
            .find(|(k, _)| *k == WORKER_TASK_ENV)
            .and_then(|(_, v)| v);
        assert_eq!(task, Some(std::ffi::OsStr::new("sine")));
    }

    #[test]
    fn test_spawn_delivers_input() {
        // `cat` echoes the handshake back on the channel.
        let command = WorkerCommand::new("cat");
        let mut proc = spawn_worker(&command, "echo", 0, b"payload").unwrap();

        let mut buf = Vec::new();
        while proc.channel_mut().read_chunk(&mut buf).unwrap() > 0 {}
        assert_eq!(buf, b"payload");
        assert!(matches!(proc.wait().unwrap(), WaitStatus::Exited(_, 0)));
    }

    #[test]
    fn test_spawn_missing_program_is_spawn_error() {
        let command = WorkerCommand::new(PathBuf::from("/nonexistent/smpmap-worker"));
        let err = spawn_worker(&command, "sine", 3, b"1").unwrap_err();
        assert!(matches!(err, SmpError::Spawn { index: 3, .. }));
    }
}
