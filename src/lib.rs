//! smpmap - order-preserving parallel map over worker processes.
//!
//! Each input is handed to a fresh OS process that runs one registered
//! [`Computation`], sends back a single framed result and exits. At most
//! `max_children` workers run at once; results come back lazily and in input
//! order, with every worker's captured stdout replayed just before its result.
//!
//! ```no_run
//! use smpmap::tasks::{self, Sqrt};
//! use smpmap::{PoolConfig, Parallelized};
//!
//! fn main() -> smpmap::Result<()> {
//!     // Worker processes re-enter here and exit inside this call.
//!     tasks::registry().serve_if_worker();
//!
//!     let sqrt = Parallelized::new(Sqrt, PoolConfig::new(4))?;
//!     for root in sqrt.map([1.0, 4.0, 9.0]) {
//!         println!("{}", root?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod computation;
pub mod config;
pub mod error;
pub mod logging;
pub mod parallel;
pub mod platform;
pub mod tasks;
#[cfg(unix)]
pub mod worker;

pub use codec::Envelope;
pub use computation::Computation;
pub use config::{PoolConfig, WorkerCommand};
pub use error::{Result, SmpError};
pub use parallel::Parallelized;
#[cfg(unix)]
pub use parallel::{ParallelMap, ParallelStats, parallel_map};
pub use platform::ProcessSupport;
#[cfg(unix)]
pub use worker::signals::TerminationReason;
#[cfg(unix)]
pub use worker::{WORKER_TASK_ENV, WorkerRegistry};
