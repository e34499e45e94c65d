//! Pool configuration.
//!
//! # Environment Variables
//!
//! - `SMPMAP_MAX_CHILDREN` - Maximum number of concurrent worker processes
//! - `SMPMAP_POLL_TIMEOUT_MS` - Poll timeout (ms) used while below capacity

use crate::error::{Result, SmpError};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Default poll timeout while below capacity (1 ms).
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Environment variable overriding [`PoolConfig::max_children`].
pub const MAX_CHILDREN_ENV: &str = "SMPMAP_MAX_CHILDREN";

/// Environment variable overriding [`PoolConfig::poll_timeout`], in milliseconds.
pub const POLL_TIMEOUT_ENV: &str = "SMPMAP_POLL_TIMEOUT_MS";

/// How to launch a worker process.
///
/// The launched program must call
/// [`WorkerRegistry::serve_if_worker`](crate::WorkerRegistry::serve_if_worker)
/// before doing anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Executable to run.
    pub program: PathBuf,
    /// Extra arguments passed to every worker.
    pub args: Vec<OsString>,
    /// Extra environment variables set for every worker.
    pub env: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    /// Launch workers from `program` with no extra arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Re-execute the running binary as the worker.
    pub fn current_exe() -> Result<Self> {
        let exe_path = std::env::current_exe().map_err(|e| {
            SmpError::Worker(format!("Failed to get current executable: {}", e))
        })?;
        Ok(Self::new(exe_path))
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Configuration for one parallel map.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of worker processes alive at once (at least 1).
    pub max_children: usize,
    /// Poll timeout used while below capacity. At capacity the controller
    /// always blocks until a channel is ready.
    pub poll_timeout: Duration,
    /// Worker launcher; `None` re-executes the current binary.
    pub worker: Option<WorkerCommand>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_children: default_max_children(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            worker: None,
        }
    }
}

/// One worker per available CPU.
pub fn default_max_children() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl PoolConfig {
    /// Create a config with the given concurrency cap and default timeout.
    pub fn new(max_children: usize) -> Self {
        Self {
            max_children,
            ..Self::default()
        }
    }

    /// Set the concurrency cap.
    pub fn with_max_children(mut self, max_children: usize) -> Self {
        self.max_children = max_children;
        self
    }

    /// Set the below-capacity poll timeout.
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Set the worker launcher.
    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Apply `SMPMAP_MAX_CHILDREN` and `SMPMAP_POLL_TIMEOUT_MS`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn with_env_overrides(self) -> Self {
        let max_children = std::env::var(MAX_CHILDREN_ENV).ok();
        let poll_timeout = std::env::var(POLL_TIMEOUT_ENV).ok();
        self.apply_overrides(max_children.as_deref(), poll_timeout.as_deref())
    }

    fn apply_overrides(mut self, max_children: Option<&str>, poll_timeout_ms: Option<&str>) -> Self {
        if let Some(raw) = max_children {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.max_children = n,
                Err(_) => tracing::warn!(value = raw, "Ignoring invalid {}", MAX_CHILDREN_ENV),
            }
        }
        if let Some(raw) = poll_timeout_ms {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.poll_timeout = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = raw, "Ignoring invalid {}", POLL_TIMEOUT_ENV),
            }
        }
        self
    }

    /// Check the invariants the controller relies on.
    pub fn validate(&self) -> Result<()> {
        if self.max_children == 0 {
            return Err(SmpError::InvalidConfig(
                "max_children must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The configured worker launcher, or the current executable.
    pub fn resolve_worker(&self) -> Result<WorkerCommand> {
        match &self.worker {
            Some(command) => Ok(command.clone()),
            None => WorkerCommand::current_exe(),
        }
    }
}
