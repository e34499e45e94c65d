//! Order-preserving parallel map over worker processes.
//!
//! A [`Parallelized`] binds a [`Computation`] to a [`PoolConfig`]; calling
//! [`Parallelized::map`] returns a lazy [`ParallelMap`] iterator that runs
//! each input in its own worker process, at most `max_children` at a time.

#[cfg(unix)]
mod controller;
pub mod reorder;

#[cfg(unix)]
pub use controller::{ParallelMap, ParallelStats};

use crate::computation::Computation;
use crate::config::{PoolConfig, WorkerCommand};
use crate::error::Result;
use crate::platform::ProcessSupport;
#[cfg(unix)]
use std::io::{self, Write};
#[cfg(unix)]
use std::time::Duration;

/// A computation ready to be mapped over inputs in parallel.
///
/// Construction validates the configuration and checks the host once; every
/// later [`map`](Self::map) reuses that result.
#[derive(Debug)]
pub struct Parallelized<C: Computation> {
    computation: C,
    config: PoolConfig,
    worker: WorkerCommand,
    support: ProcessSupport,
}

impl<C: Computation> Parallelized<C> {
    /// Bind `computation` to `config`.
    ///
    /// Fails with [`SmpError::UnsupportedPlatform`](crate::SmpError::UnsupportedPlatform)
    /// on hosts without process support and with
    /// [`SmpError::InvalidConfig`](crate::SmpError::InvalidConfig) when
    /// `max_children` is zero.
    pub fn new(computation: C, config: PoolConfig) -> Result<Self> {
        let support = ProcessSupport::probe()?;
        config.validate()?;
        let worker = config.resolve_worker()?;
        tracing::debug!(
            task = computation.name(),
            max_children = config.max_children,
            poll_timeout_ms = config.poll_timeout.as_millis() as u64,
            program = %worker.program.display(),
            "Parallelized computation ready"
        );
        Ok(Self {
            computation,
            config,
            worker,
            support,
        })
    }

    pub fn computation(&self) -> &C {
        &self.computation
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn support(&self) -> ProcessSupport {
        self.support
    }

    /// Map over `inputs`, replaying captured worker output to stdout.
    #[cfg(unix)]
    pub fn map<I>(&self, inputs: I) -> ParallelMap<C, I::IntoIter>
    where
        I: IntoIterator<Item = C::Input>,
    {
        self.map_with_sink(inputs, io::stdout())
    }

    /// Map over `inputs`, replaying captured worker output to `sink`.
    #[cfg(unix)]
    pub fn map_with_sink<I, W>(&self, inputs: I, sink: W) -> ParallelMap<C, I::IntoIter, W>
    where
        I: IntoIterator<Item = C::Input>,
        W: Write,
    {
        ParallelMap::new(
            self.computation.name().to_string(),
            self.worker.clone(),
            self.config.max_children,
            self.config.poll_timeout,
            inputs.into_iter(),
            sink,
        )
    }
}

/// Run `computation` over `inputs` with at most `max_children` workers.
///
/// Shorthand for [`Parallelized::new`] followed by [`Parallelized::map`],
/// with workers launched from the current executable.
#[cfg(unix)]
pub fn parallel_map<C, I>(
    computation: C,
    inputs: I,
    max_children: usize,
    poll_timeout: Duration,
) -> Result<ParallelMap<C, I::IntoIter>>
where
    C: Computation,
    I: IntoIterator<Item = C::Input>,
{
    let config = PoolConfig::new(max_children).with_poll_timeout(poll_timeout);
    Ok(Parallelized::new(computation, config)?.map(inputs))
}
