//! Structured result of a sync run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wall time spent in one delta phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: String,
    pub secs: f64,
}

impl PhaseTiming {
    pub fn new(phase: impl Into<String>, elapsed: Duration) -> Self {
        PhaseTiming {
            phase: phase.into(),
            secs: elapsed.as_secs_f64(),
        }
    }
}

/// Counters accumulated across a full `incremental-sync` run.
///
/// Parse counters are filled by the pipeline before the delta phases run;
/// the delta strategy fills the rest as each phase completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub version: String,
    pub rows_parsed: u64,
    pub rows_skipped: u64,
    pub explicit_deletes: u64,
    pub explicit_merges: u64,
    pub concepts_upserted: u64,
    pub codes_upserted: u64,
    pub has_code_upserted: u64,
    pub edges_upserted: u64,
    pub edges_swept: u64,
    pub codes_swept: u64,
    /// Batches that failed permanently during the upsert phase. The phase
    /// continues past them; the errors are surfaced here.
    pub failed_batches: u64,
    pub batch_errors: Vec<String>,
    pub phases: Vec<PhaseTiming>,
}

impl SyncReport {
    pub fn new(version: impl Into<String>) -> Self {
        SyncReport {
            version: version.into(),
            ..SyncReport::default()
        }
    }

    pub fn record_phase(&mut self, phase: &str, elapsed: Duration) {
        self.phases.push(PhaseTiming::new(phase, elapsed));
    }
}
