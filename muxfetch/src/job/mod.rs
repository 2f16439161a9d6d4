//! Download jobs: planning, background execution and status tracking

mod registry;
mod runner;
mod status;

pub use registry::{JobRegistry, DEFAULT_JOB_HISTORY};
pub use runner::{prepare, spawn};
pub use status::{JobHandle, JobStatus, JobSummary};
