//! Phase-ordering and precondition tests for the Snapshot-Diff strategy,
//! driven against a recording executor instead of a live database.

use async_trait::async_trait;
use neo4rs::BoltType;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use umls_sync_core::{
    CancelFlag, CodeRecord, ConceptEdge, ConceptRecord, HasCodeLink, MergePair, ReleaseVersion,
    Snapshot, SyncReport,
};
use umls_sync_graph::{
    BatchOutcome, BatchSpec, CypherExecutor, DeltaOptions, DeltaStrategy, GraphError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Call {
    kind: &'static str,
    context: String,
    rows: usize,
}

#[derive(Default)]
struct RecordingExecutor {
    meta_version: Option<String>,
    /// Scripted `fetch_count` results per context; empty queue yields 0.
    counts: Mutex<HashMap<&'static str, VecDeque<i64>>>,
    /// Batched contexts that should report a failed batch.
    failing_contexts: Vec<&'static str>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingExecutor {
    fn with_meta(version: &str) -> Self {
        RecordingExecutor {
            meta_version: Some(version.to_string()),
            ..RecordingExecutor::default()
        }
    }

    fn script_counts(&self, context: &'static str, values: &[i64]) {
        self.counts
            .lock()
            .unwrap()
            .insert(context, values.iter().copied().collect());
    }

    fn record(&self, kind: &'static str, context: &str, rows: usize) {
        self.calls.lock().unwrap().push(Call {
            kind,
            context: context.to_string(),
            rows,
        });
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn contexts_of(&self, kind: &'static str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.context)
            .collect()
    }
}

#[async_trait]
impl CypherExecutor for RecordingExecutor {
    async fn run(
        &self,
        context: &'static str,
        _statement: &str,
        _params: Vec<(String, BoltType)>,
    ) -> umls_sync_graph::Result<()> {
        self.record("run", context, 0);
        Ok(())
    }

    async fn fetch_optional_string(
        &self,
        context: &'static str,
        _statement: &str,
        _params: Vec<(String, BoltType)>,
    ) -> umls_sync_graph::Result<Option<String>> {
        self.record("fetch", context, 0);
        Ok(self.meta_version.clone())
    }

    async fn fetch_count(
        &self,
        context: &'static str,
        _statement: &str,
        _params: Vec<(String, BoltType)>,
    ) -> umls_sync_graph::Result<i64> {
        self.record("count", context, 0);
        Ok(self
            .counts
            .lock()
            .unwrap()
            .get_mut(context)
            .and_then(VecDeque::pop_front)
            .unwrap_or(0))
    }

    async fn run_batched(&self, spec: BatchSpec) -> umls_sync_graph::Result<BatchOutcome> {
        self.record("batched", spec.context, spec.rows.len());
        if self.failing_contexts.contains(&spec.context) {
            return Ok(BatchOutcome {
                committed: 0,
                failed: spec.rows.len() as u64,
                errors: vec![format!("{} batch 1/1: boom", spec.context)],
            });
        }
        Ok(BatchOutcome {
            committed: spec.rows.len() as u64,
            failed: 0,
            errors: vec![],
        })
    }
}

fn sample_snapshot() -> Snapshot {
    Snapshot {
        concepts: vec![
            ConceptRecord {
                cui: "C0000001".to_string(),
                preferred_name: "Drug A".to_string(),
                labels: vec!["Concept".to_string(), "biolink:Drug".to_string()],
            },
            ConceptRecord {
                cui: "C0000002".to_string(),
                preferred_name: "Disease B".to_string(),
                labels: vec!["Concept".to_string(), "biolink:Disease".to_string()],
            },
        ],
        codes: vec![CodeRecord {
            code_id: "RXNORM:100".to_string(),
            sab: "RXNORM".to_string(),
            name: "Drug A".to_string(),
        }],
        links: vec![HasCodeLink {
            cui: "C0000001".to_string(),
            code_id: "RXNORM:100".to_string(),
        }],
        edges: vec![ConceptEdge {
            source_cui: "C0000001".to_string(),
            target_cui: "C0000002".to_string(),
            source_rela: "treats".to_string(),
            predicate: "biolink:treats".to_string(),
            asserted_by_sabs: vec!["RXNORM".to_string()],
        }],
    }
}

fn strategy<'a>(
    executor: &'a RecordingExecutor,
    version: &str,
    reapply: bool,
) -> DeltaStrategy<'a, RecordingExecutor> {
    DeltaStrategy::new(
        executor,
        ReleaseVersion::parse(version).unwrap(),
        DeltaOptions {
            batch_size: 1000,
            reapply,
        },
        CancelFlag::new(),
    )
}

#[tokio::test]
async fn phases_run_in_order_and_fill_the_report() {
    let executor = RecordingExecutor::with_meta("2025AA");
    executor.script_counts("sweep stale edges", &[3, 0]);
    executor.script_counts("sweep stale codes", &[1, 0]);

    let mut report = SyncReport::new("2025AB");
    strategy(&executor, "2025AB", false)
        .run(
            &sample_snapshot(),
            &["C0000009".to_string()],
            &[MergePair {
                old_cui: "C0000007".to_string(),
                new_cui: "C0000008".to_string(),
            }],
            &mut report,
        )
        .await
        .unwrap();

    assert_eq!(
        executor.contexts_of("batched"),
        [
            "delete retired concepts",
            "merge retired concepts",
            "upsert concepts",
            "upsert codes",
            "upsert HAS_CODE links",
            "upsert inter-concept edges",
        ]
    );

    // Finalize is the last write.
    let calls = executor.calls();
    assert_eq!(calls.last().unwrap().context, "set meta version");

    assert_eq!(report.explicit_deletes, 1);
    assert_eq!(report.explicit_merges, 1);
    assert_eq!(report.concepts_upserted, 2);
    assert_eq!(report.codes_upserted, 1);
    assert_eq!(report.has_code_upserted, 1);
    assert_eq!(report.edges_upserted, 1);
    assert_eq!(report.edges_swept, 3);
    assert_eq!(report.codes_swept, 1);
    assert_eq!(report.failed_batches, 0);
    let phases: Vec<&str> = report.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(phases, ["deletions", "merges", "upsert", "sweep", "finalize"]);
}

#[tokio::test]
async fn merge_chains_collapse_before_execution() {
    let executor = RecordingExecutor::with_meta("2025AA");
    let mut report = SyncReport::new("2025AB");
    strategy(&executor, "2025AB", false)
        .run(
            &Snapshot::default(),
            &[],
            &[
                MergePair {
                    old_cui: "A0000001".to_string(),
                    new_cui: "B0000001".to_string(),
                },
                MergePair {
                    old_cui: "B0000001".to_string(),
                    new_cui: "D0000001".to_string(),
                },
            ],
            &mut report,
        )
        .await
        .unwrap();

    let merge_call = executor
        .calls()
        .into_iter()
        .find(|c| c.context == "merge retired concepts")
        .unwrap();
    // Both pairs survive, collapsed onto the terminal target.
    assert_eq!(merge_call.rows, 2);
    assert_eq!(report.explicit_merges, 2);
}

#[tokio::test]
async fn merge_cycle_aborts_before_any_write() {
    let executor = RecordingExecutor::with_meta("2025AA");
    let mut report = SyncReport::new("2025AB");
    let err = strategy(&executor, "2025AB", false)
        .run(
            &Snapshot::default(),
            &[],
            &[
                MergePair {
                    old_cui: "A0000001".to_string(),
                    new_cui: "B0000001".to_string(),
                },
                MergePair {
                    old_cui: "B0000001".to_string(),
                    new_cui: "A0000001".to_string(),
                },
            ],
            &mut report,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::MergeCycle(_)));
    // The merge batch itself never ran.
    assert!(!executor
        .contexts_of("batched")
        .contains(&"merge retired concepts".to_string()));
}

#[tokio::test]
async fn same_version_requires_reapply() {
    let executor = RecordingExecutor::with_meta("2025AB");
    let mut report = SyncReport::new("2025AB");
    let err = strategy(&executor, "2025AB", false)
        .run(&Snapshot::default(), &[], &[], &mut report)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::VersionUnchanged(_)));
    assert!(executor.contexts_of("batched").is_empty());

    let executor = RecordingExecutor::with_meta("2025AB");
    let mut report = SyncReport::new("2025AB");
    strategy(&executor, "2025AB", true)
        .run(&Snapshot::default(), &[], &[], &mut report)
        .await
        .unwrap();
}

#[tokio::test]
async fn version_regression_is_fatal() {
    let executor = RecordingExecutor::with_meta("2025AB");
    let mut report = SyncReport::new("2025AA");
    let err = strategy(&executor, "2025AA", false)
        .run(&Snapshot::default(), &[], &[], &mut report)
        .await
        .unwrap_err();
    match err {
        GraphError::VersionRegression {
            requested,
            installed,
        } => {
            assert_eq!(requested, "2025AA");
            assert_eq!(installed, "2025AB");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_meta_node_is_fatal() {
    let executor = RecordingExecutor::default();
    let mut report = SyncReport::new("2025AB");
    let err = strategy(&executor, "2025AB", false)
        .run(&Snapshot::default(), &[], &[], &mut report)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::MetaNodeMissing));
}

#[tokio::test]
async fn failed_batches_surface_without_aborting_the_sync() {
    let executor = RecordingExecutor {
        meta_version: Some("2025AA".to_string()),
        failing_contexts: vec!["upsert codes"],
        ..RecordingExecutor::default()
    };
    let mut report = SyncReport::new("2025AB");
    strategy(&executor, "2025AB", false)
        .run(&sample_snapshot(), &[], &[], &mut report)
        .await
        .unwrap();

    assert_eq!(report.codes_upserted, 0);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.batch_errors.len(), 1);
    // Later phases still ran; the sync still finalized.
    assert_eq!(
        executor.calls().last().unwrap().context,
        "set meta version"
    );
}

#[tokio::test]
async fn cancellation_stops_between_phases() {
    let executor = RecordingExecutor::with_meta("2025AA");
    let cancel = CancelFlag::new();
    cancel.cancel();
    let strategy = DeltaStrategy::new(
        &executor,
        ReleaseVersion::parse("2025AB").unwrap(),
        DeltaOptions::default(),
        cancel,
    );
    let mut report = SyncReport::new("2025AB");
    let err = strategy
        .run(&sample_snapshot(), &[], &[], &mut report)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Cancelled));
    assert!(executor.contexts_of("batched").is_empty());
}

#[tokio::test]
async fn reapplied_sync_reports_zero_sweeps() {
    // Scripted sweep counts are absent: every round returns 0, which is
    // exactly what a converged re-run looks like.
    let executor = RecordingExecutor::with_meta("2025AB");
    let mut report = SyncReport::new("2025AB");
    strategy(&executor, "2025AB", true)
        .run(&sample_snapshot(), &[], &[], &mut report)
        .await
        .unwrap();
    assert_eq!(report.edges_swept, 0);
    assert_eq!(report.codes_swept, 0);
}
