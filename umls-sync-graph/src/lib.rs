//! Graph-side half of umls-sync: the Bolt client wrapper, the Snapshot-Diff
//! incremental delta strategy, and the offline bulk-import CSV writer.

pub mod bulk;
pub mod client;
pub mod delta;
mod error;

pub use bulk::{BulkCsvWriter, BulkFiles};
pub use client::{BatchOutcome, BatchSpec, CypherExecutor, GraphClient, RetryPolicy};
pub use delta::{resolve_merge_chains, DeltaOptions, DeltaStrategy};
pub use error::{GraphError, Result};
