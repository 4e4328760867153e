//! Background separation jobs: a bounded queue feeding a small worker
//! pool, with delivery of results decoupled behind a trait so the
//! transport layer stays out of this crate.

pub mod delivery;
pub mod queue;
pub mod worker;

use std::path::PathBuf;

use stemsplit_separation::StemChoice;

pub use delivery::{Delivery, FailureKind};
pub use queue::{EnqueueError, JobQueue};
pub use worker::{JobRunner, Separator};

/// One accepted unit of work: a staged input file plus the stem the
/// user picked. The runner owns the input file from here on and deletes
/// it whatever the outcome.
#[derive(Debug)]
pub struct JobRequest {
    pub chat_id: i64,
    pub input_path: PathBuf,
    pub choice: StemChoice,
}
