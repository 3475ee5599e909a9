//! Correlation-id construction for job submissions.
//!
//! The executor deduplicates on the full string, so the random suffix makes
//! every operator action a distinct submission while retries of the *same*
//! action reuse the id they were given.

use uuid::Uuid;

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Correlation id for a dry-run of a proposal: `dryrun-{id}-{8hex}`.
pub fn dry_run_correlation_id(proposal_id: i64) -> String {
    format!("dryrun-{}-{}", proposal_id, short_suffix())
}

/// Correlation id for an apply of a proposal: `exec-{id}-{8hex}`.
pub fn apply_correlation_id(proposal_id: i64) -> String {
    format!("exec-{}-{}", proposal_id, short_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_shape() {
        let id = dry_run_correlation_id(42);
        assert!(id.starts_with("dryrun-42-"));
        assert_eq!(id.len(), "dryrun-42-".len() + 8);

        let id = apply_correlation_id(42);
        assert!(id.starts_with("exec-42-"));
    }

    #[test]
    fn test_correlation_ids_are_unique_per_call() {
        assert_ne!(apply_correlation_id(1), apply_correlation_id(1));
    }
}
