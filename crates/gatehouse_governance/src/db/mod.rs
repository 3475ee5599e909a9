//! Governance storage: clusters, proposals, snapshots, entity history.

pub mod clusters;
pub mod history;
pub mod models;
pub mod proposals;
pub mod schema;
pub mod snapshots;

pub use clusters::{ClusterStore, ClusterUpdate, NewCluster};
pub use history::HistoryStore;
pub use proposals::{NewOperation, NewProposal, ProposalStore};
pub use snapshots::SnapshotStore;
