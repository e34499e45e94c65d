//! The contract between callers and worker processes.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// A pure, single-input computation that can run in a worker process.
///
/// The controller never calls [`Computation::call`] itself. It only uses
/// [`Computation::name`] to tell the worker which registered computation to
/// run, and the serde bounds to move inputs and results across the channel.
/// The worker binary must register an instance with the same name in its
/// [`WorkerRegistry`](crate::WorkerRegistry).
pub trait Computation {
    /// Argument handed to one invocation.
    type Input: Serialize + DeserializeOwned;
    /// Value returned by one invocation.
    type Output: Serialize + DeserializeOwned;
    /// Failure reported by one invocation; only its rendering crosses the
    /// process boundary.
    type Error: fmt::Display;

    /// Name the worker side registers this computation under.
    fn name(&self) -> &str;

    /// Run the computation on one input.
    fn call(&self, input: Self::Input) -> Result<Self::Output, Self::Error>;
}
