//! Executor storage: jobs and their per-step records.

pub mod jobs;
pub mod models;
pub mod schema;

pub use jobs::JobStore;
pub use models::{Job, JobStep};
