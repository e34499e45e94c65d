//! One-shot worker processes.
//!
//! Each task runs in its own subprocess that lives for exactly one input:
//!
//! ```text
//!   controller                              worker (one per task)
//!   ──────────                              ─────────────────────
//!   spawn  ── env SMPMAP_WORKER_TASK ────▶  WorkerRegistry::serve_if_worker
//!          ── stdin: CBOR input, EOF ────▶  decode, run with stdout captured
//!   poll   ◀─ stdout: one frame, EOF ─────  write frame, exit
//!   waitpid
//! ```
//!
//! The pieces used by the controller are crate-internal; host binaries only
//! need [`WorkerRegistry`].

pub(crate) mod capture;
pub mod frame;
pub(crate) mod ipc;
pub(crate) mod proc;
pub mod signals;
pub(crate) mod spawn;
mod worker_main;

pub use worker_main::WorkerRegistry;

/// Environment variable naming the computation a worker process should run.
pub const WORKER_TASK_ENV: &str = "SMPMAP_WORKER_TASK";
