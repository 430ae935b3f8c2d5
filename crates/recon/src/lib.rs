//! `docrecon-recon`: duplicate splitting, inverse pairs, set-membership
//! reconciliation, and the configurable two-sided job that drives them.

pub mod error;
pub mod job;
pub mod matcher;

pub use error::{ReconError, Result};
pub use job::{Job, JobMeta, JobResult, JobSummary, Partition, PartitionKind, PartitionSummary, SideSummary};
pub use matcher::{
    is_inverse_pair, reconcile, sort_by_amount, split_duplicates, split_inverse_pairs, DuplicateSplit,
    InversePairSplit, Reconciliation,
};
