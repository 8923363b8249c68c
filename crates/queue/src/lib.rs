//! `queue` crate — the background worker that drains `job_queue` and
//! drives each job's workflow to completion through the `engine` crate.

pub mod error;
pub mod worker;

pub use error::QueueError;
pub use worker::{Worker, WorkerConfig};
