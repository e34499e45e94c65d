//! Worker subprocess main entry point.
//!
//! A host binary builds a [`WorkerRegistry`] of the computations it can run
//! and calls [`WorkerRegistry::serve_if_worker`] first thing in `main`. When
//! the controller launched the process as a worker, this reads the input from
//! stdin, runs the named computation with stdout captured, writes a single
//! frame to the original stdout and exits. Otherwise it returns immediately.

use super::WORKER_TASK_ENV;
use super::capture::StdoutCapture;
use super::frame;
use super::ipc::PipeFd;
use crate::codec::{self, Envelope};
use crate::computation::Computation;
use std::any::Any;
use std::io::{self, Read};
use std::os::unix::io::AsFd;
use std::panic::{self, AssertUnwindSafe};

/// Type-erased view of a registered computation.
trait ErasedComputation {
    fn task_name(&self) -> &str;

    /// Decode the input, run, and encode the resulting envelope.
    fn run_encoded(&self, input: &[u8]) -> Vec<u8>;
}

impl<C: Computation> ErasedComputation for C {
    fn task_name(&self) -> &str {
        self.name()
    }

    fn run_encoded(&self, input: &[u8]) -> Vec<u8> {
        let envelope = match codec::decode::<C::Input>(input) {
            Err(e) => Envelope::failed(format!("invalid input: {}", e)),
            Ok(input) => match panic::catch_unwind(AssertUnwindSafe(|| self.call(input))) {
                Ok(Ok(value)) => Envelope::ok(value),
                Ok(Err(e)) => Envelope::failed(e.to_string()),
                Err(payload) => Envelope::failed(format!(
                    "computation panicked: {}",
                    panic_message(payload.as_ref())
                )),
            },
        };

        codec::encode(&envelope).unwrap_or_else(|e| {
            let fallback = Envelope::<()>::failed(format!("result could not be serialized: {}", e));
            codec::encode(&fallback).unwrap_or_default()
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// The computations a binary can run when launched as a worker.
#[derive(Default)]
pub struct WorkerRegistry {
    tasks: Vec<Box<dyn ErasedComputation>>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a computation under its [`Computation::name`].
    ///
    /// A later registration with the same name shadows the earlier one.
    pub fn register<C: Computation + 'static>(mut self, computation: C) -> Self {
        self.tasks.push(Box::new(computation));
        self
    }

    /// Names of all registered computations, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.task_name())
    }

    fn find(&self, name: &str) -> Option<&dyn ErasedComputation> {
        self.tasks
            .iter()
            .rev()
            .find(|t| t.task_name() == name)
            .map(|t| t.as_ref())
    }

    /// Run a registered computation on an encoded input, returning the
    /// encoded envelope. `None` if no computation has that name.
    ///
    /// This is the in-process core of a worker, without any redirection.
    pub fn run_encoded(&self, name: &str, input: &[u8]) -> Option<Vec<u8>> {
        self.find(name).map(|task| task.run_encoded(input))
    }

    /// Serve one task and exit if this process was launched as a worker.
    ///
    /// Returns without doing anything when `SMPMAP_WORKER_TASK` is unset.
    /// Must be called before the program starts any threads.
    pub fn serve_if_worker(&self) {
        let Some(name) = std::env::var_os(WORKER_TASK_ENV) else {
            return;
        };
        // Safety: called at the top of main before any threads exist. The
        // variable is removed so processes started by the computation do not
        // mistake themselves for workers.
        unsafe {
            std::env::remove_var(WORKER_TASK_ENV);
        }
        let name = name.to_string_lossy().into_owned();

        let code = match self.serve(&name) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("smpmap worker '{}': {}", name, e);
                1
            }
        };
        std::process::exit(code);
    }

    fn serve(&self, name: &str) -> io::Result<()> {
        let task = self.find(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no computation named '{}' is registered", name),
            )
        })?;

        let mut input = Vec::new();
        io::stdin().lock().read_to_end(&mut input)?;

        // Keep the channel on a private descriptor before fd 1 is redirected.
        let mut channel = PipeFd::new(io::stdout().as_fd().try_clone_to_owned()?);
        let capture = StdoutCapture::begin()?;
        let payload = task.run_encoded(&input);
        let output = capture.finish()?;

        frame::write_frame(&mut channel, &payload, &output)
    }
}
