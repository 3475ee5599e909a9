//! Wire contract between the governance and executor services.
//!
//! Control plane only - the executor talks to the target cluster directly;
//! nothing in here ever carries a plaintext cluster credential. All types
//! use serde with snake_case enum tagging, and the same spellings are what
//! both services persist, so a status string written by one side is always
//! parseable by the other.

pub mod correlation;
pub mod defaults;
pub mod types;

pub use correlation::{apply_correlation_id, dry_run_correlation_id};
pub use types::{
    ClusterConfigPayload, CreateJobRequest, HealthState, JobMode, JobState, JobStepView, JobView,
    OperationPayload, ProposalKind, ProposalStatus, StepState,
};
