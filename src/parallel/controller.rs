//! The controller loop behind [`ParallelMap`].
//!
//! One thread drives everything: it pulls inputs lazily, spawns a worker per
//! input while below `max_children`, multiplexes the live channels with
//! `poll(2)`, reaps each worker once its channel reaches end-of-stream, and
//! releases results through a [`ReorderBuffer`] in submission order.
//!
//! Task lifecycle: `Pending` (not yet pulled from the input iterator) →
//! `Spawned` (a [`WorkerHandle`] exists) → `Completed` (buffered) →
//! `Emitted` (returned from [`Iterator::next`]).

use super::reorder::ReorderBuffer;
use crate::codec::{self, Envelope};
use crate::computation::Computation;
use crate::config::WorkerCommand;
use crate::error::{Result, SmpError};
use crate::worker::frame::Frame;
use crate::worker::proc::Proc;
use crate::worker::signals::{TerminationReason, analyze_wait_status};
use crate::worker::spawn::spawn_worker;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::os::unix::io::AsFd;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Counters for one parallel map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParallelStats {
    /// Inputs pulled from the input sequence.
    pub submitted: usize,
    /// Worker processes started.
    pub spawned: usize,
    /// Worker processes reaped, including ones terminated on shutdown.
    pub reaped: usize,
    /// Tasks that produced a value.
    pub succeeded: usize,
    /// Tasks whose computation failed or whose input could not be encoded.
    pub failed: usize,
    /// Tasks whose worker did not deliver a valid frame.
    pub protocol_violations: usize,
    /// Highest number of simultaneously live workers observed.
    pub peak_live: usize,
}

/// A task that has reached `Completed`.
#[derive(Debug)]
struct Completed<T> {
    outcome: Result<T>,
    output: Vec<u8>,
}

impl<T> Completed<T> {
    fn failed(err: SmpError) -> Self {
        Self {
            outcome: Err(err),
            output: Vec::new(),
        }
    }
}

/// A task in the `Spawned` state.
struct WorkerHandle {
    index: usize,
    proc: Proc,
    /// Bytes read from the channel so far.
    received: Vec<u8>,
    read_error: Option<io::Error>,
}

impl WorkerHandle {
    fn new(index: usize, proc: Proc) -> Self {
        Self {
            index,
            proc,
            received: Vec::new(),
            read_error: None,
        }
    }

    /// Read what the ready channel has; `true` once it is closed.
    fn pump(&mut self) -> bool {
        match self.proc.channel_mut().read_chunk(&mut self.received) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => {
                self.read_error = Some(e);
                true
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    /// Block until at least one channel is ready.
    Block,
    /// Give up after the configured poll timeout.
    Timeout,
}

/// Convert a timeout to whole milliseconds, rounding up. `None` when it is
/// longer than `poll(2)` can wait.
fn to_poll_timeout(timeout: Duration) -> Option<PollTimeout> {
    PollTimeout::try_from(timeout.as_micros().div_ceil(1000)).ok()
}

/// Lazy, order-preserving results of a parallel map.
///
/// Yields one item per input, in input order. Task-scoped failures
/// ([`SmpError::is_task_scoped`]) appear at the failed task's position and
/// iteration continues; any other error is yielded once, after which the
/// remaining workers are terminated and the iterator ends.
///
/// Captured output of each task is written to the sink just before that
/// task's result is returned. Dropping the iterator early terminates and
/// reaps the workers still running.
pub struct ParallelMap<C: Computation, I, W = io::Stdout> {
    task_name: String,
    worker: WorkerCommand,
    max_children: usize,
    poll_timeout: PollTimeout,
    inputs: I,
    inputs_exhausted: bool,
    next_index: usize,
    live: Vec<WorkerHandle>,
    reorder: ReorderBuffer<Completed<C::Output>>,
    sink: W,
    stats: ParallelStats,
    finished: bool,
    _computation: PhantomData<fn() -> C>,
}

impl<C, I, W> ParallelMap<C, I, W>
where
    C: Computation,
    I: Iterator<Item = C::Input>,
    W: Write,
{
    pub(crate) fn new(
        task_name: String,
        worker: WorkerCommand,
        max_children: usize,
        poll_timeout: Duration,
        inputs: I,
        sink: W,
    ) -> Self {
        let poll_timeout = to_poll_timeout(poll_timeout).unwrap_or_else(|| {
            warn!(
                requested_ms = u64::try_from(poll_timeout.as_millis()).unwrap_or(u64::MAX),
                max_ms = i32::MAX,
                "Poll timeout too long, clamping"
            );
            PollTimeout::MAX
        });
        Self {
            task_name,
            worker,
            max_children,
            poll_timeout,
            inputs,
            inputs_exhausted: false,
            next_index: 0,
            live: Vec::with_capacity(max_children),
            reorder: ReorderBuffer::new(),
            sink,
            stats: ParallelStats::default(),
            finished: false,
            _computation: PhantomData,
        }
    }

    /// Number of worker processes currently running.
    pub fn live_workers(&self) -> usize {
        self.live.len()
    }

    /// Counters so far.
    pub fn stats(&self) -> ParallelStats {
        self.stats
    }

    /// Name of the computation the workers run.
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Stop, terminating any live workers, and return the output sink.
    pub fn into_sink(mut self) -> W {
        self.halt();
        self.sink
    }

    /// Advance the state machine by one step.
    fn step(&mut self) -> Result<()> {
        if self.inputs_exhausted {
            if self.live.is_empty() {
                self.finish_run();
                return Ok(());
            }
            // Nothing left to submit, so there is no reason to wake early.
            return self.poll(Wait::Block);
        }

        if self.live.len() >= self.max_children {
            trace!(live = self.live.len(), "At capacity, waiting for a worker");
            return self.poll(Wait::Block);
        }

        match self.inputs.next() {
            Some(input) => {
                self.submit(input)?;
                self.poll(Wait::Timeout)
            }
            None => {
                self.inputs_exhausted = true;
                Ok(())
            }
        }
    }

    /// `Pending` → `Spawned`.
    fn submit(&mut self, input: C::Input) -> Result<()> {
        let index = self.next_index;
        self.next_index += 1;
        self.stats.submitted += 1;

        let payload = match codec::encode(&input) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.failed += 1;
                let err = SmpError::InvalidInput {
                    index,
                    reason: e.to_string(),
                };
                return self.complete(index, Completed::failed(err));
            }
        };

        let proc = spawn_worker(&self.worker, &self.task_name, index, &payload)?;
        self.live.push(WorkerHandle::new(index, proc));
        self.stats.spawned += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.live.len());
        Ok(())
    }

    /// Multiplex the live channels and collect finished workers.
    fn poll(&mut self, wait: Wait) -> Result<()> {
        if self.live.is_empty() {
            return Ok(());
        }
        let timeout = match wait {
            Wait::Block => PollTimeout::NONE,
            Wait::Timeout => self.poll_timeout,
        };

        let ready: Vec<usize> = {
            let mut fds: Vec<PollFd<'_>> = self
                .live
                .iter()
                .map(|h| PollFd::new(h.proc.as_fd(), PollFlags::POLLIN))
                .collect();
            match poll(&mut fds, timeout) {
                Ok(0) => return Ok(()),
                Ok(_) => {}
                Err(Errno::EINTR) => return Ok(()),
                Err(e) => return Err(SmpError::Io(io::Error::from_raw_os_error(e as i32))),
            }
            // POLLHUP and POLLERR are reported even though only POLLIN was asked for.
            fds.iter()
                .enumerate()
                .filter(|(_, fd)| fd.revents().is_some_and(|r| !r.is_empty()))
                .map(|(pos, _)| pos)
                .collect()
        };
        trace!(
            ready = ready.len(),
            live = self.live.len(),
            ?wait,
            "Channels ready"
        );

        let closed: Vec<usize> = ready
            .into_iter()
            .filter(|&pos| self.live[pos].pump())
            .collect();

        // Highest position first so swap_remove never moves a closed handle.
        for pos in closed.into_iter().rev() {
            let handle = self.live.swap_remove(pos);
            self.reap(handle)?;
        }
        Ok(())
    }

    /// `Spawned` → `Completed`: reap the worker and buffer its result.
    fn reap(&mut self, handle: WorkerHandle) -> Result<()> {
        let WorkerHandle {
            index,
            mut proc,
            received,
            read_error,
        } = handle;
        let pid = proc.pid().as_raw();

        let termination = match proc.wait() {
            Ok(status) => analyze_wait_status(status),
            Err(e) => {
                warn!(index, pid, error = %e, "Failed to reap worker");
                TerminationReason::Unknown
            }
        };
        self.stats.reaped += 1;

        let completed = Self::decode_completion(index, &received, read_error, termination);
        match &completed.outcome {
            Ok(_) => self.stats.succeeded += 1,
            Err(SmpError::Protocol { reason, .. }) => {
                self.stats.protocol_violations += 1;
                warn!(index, pid, reason = %reason, "Worker protocol violation");
            }
            Err(_) => self.stats.failed += 1,
        }
        debug!(
            index,
            pid,
            bytes = received.len(),
            termination = %termination,
            "Worker reaped"
        );

        self.complete(index, completed)
    }

    fn decode_completion(
        index: usize,
        received: &[u8],
        read_error: Option<io::Error>,
        termination: TerminationReason,
    ) -> Completed<C::Output> {
        let protocol = |reason: String| {
            Completed::failed(SmpError::Protocol {
                index,
                reason: format!("{}; worker {}", reason, termination),
            })
        };

        if let Some(e) = read_error {
            return protocol(format!("channel read failed: {}", e));
        }
        let frame = match Frame::decode(received) {
            Ok(frame) => frame,
            Err(e) => return protocol(e.to_string()),
        };
        let outcome = match codec::decode::<Envelope<C::Output>>(frame.payload) {
            Ok(envelope) => envelope
                .into_result()
                .map_err(|message| SmpError::Computation { index, message }),
            Err(e) => return protocol(format!("undecodable payload: {}", e)),
        };
        if !termination.is_success() {
            warn!(index, termination = %termination, "Worker delivered a frame but exited abnormally");
        }

        Completed {
            outcome,
            output: frame.output.to_vec(),
        }
    }

    fn complete(&mut self, index: usize, completed: Completed<C::Output>) -> Result<()> {
        self.reorder
            .insert(index, completed)
            .map_err(|e| SmpError::Worker(format!("Result ordering broken: {}", e)))
    }

    /// `Completed` → `Emitted`: replay captured output, hand out the result.
    fn emit(&mut self, done: Completed<C::Output>) -> Result<C::Output> {
        if !done.output.is_empty() {
            let replay = self
                .sink
                .write_all(&done.output)
                .and_then(|()| self.sink.flush());
            if let Err(e) = replay {
                self.halt();
                return Err(SmpError::Io(e));
            }
        }
        done.outcome
    }

    fn finish_run(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let stats = self.stats;
        info!(
            task = %self.task_name,
            submitted = stats.submitted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            protocol_violations = stats.protocol_violations,
            peak_live = stats.peak_live,
            "Parallel map finished"
        );
    }

    /// Terminate and reap every live worker and stop iterating.
    fn halt(&mut self) {
        if !self.live.is_empty() {
            debug!(live = self.live.len(), "Terminating live workers");
        }
        // Proc::drop terminates and reaps.
        self.stats.reaped += self.live.len();
        self.live.clear();
        self.reorder = ReorderBuffer::new();
        self.finished = true;
    }
}

impl<C, I, W> Iterator for ParallelMap<C, I, W>
where
    C: Computation,
    I: Iterator<Item = C::Input>,
    W: Write,
{
    type Item = Result<C::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(done) = self.reorder.pop_ready() {
                return Some(self.emit(done));
            }
            if self.finished {
                return None;
            }
            if let Err(err) = self.step() {
                warn!(error = %err, "Parallel map aborted");
                self.halt();
                return Some(Err(err));
            }
        }
    }
}
