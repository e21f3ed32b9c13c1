//! The Snapshot-Diff incremental sync strategy.
//!
//! Five phases, strictly ordered, each idempotent under re-execution:
//!
//! 1. **D — explicit deletions**: detach-delete every concept named in
//!    `DELETEDCUI.RRF`.
//! 2. **M — explicit merges**: move codes and relationships from each
//!    retired CUI onto its successor, unioning provenance, then delete the
//!    retired node. Merge chains are collapsed transitively first; a cycle
//!    in the merge mapping is a data error.
//! 3. **U — snapshot upsert**: merge every concept, code, HAS_CODE link and
//!    inter-concept edge from the new snapshot, tagging each with the new
//!    version and replacing concept label sets.
//! 4. **S — stale sweep**: delete relationships and codes the upsert did not
//!    tag. Concepts are never swept; their lifecycle belongs to phases D/M.
//! 5. **F — finalize**: advance the `UmlsMeta` singleton. This is the single
//!    externally visible commit point.
//!
//! A crash anywhere leaves the graph consistent: the old version is still
//! advertised until phase F runs, and re-running the sync for the same target
//! version converges to the same final state.

use crate::client::{BatchSpec, CypherExecutor};
use crate::{GraphError, Result};
use neo4rs::BoltType;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};
use umls_sync_core::{CancelFlag, ConceptEdge, MergePair, ReleaseVersion, Snapshot, SyncReport};

const ENSURE_CONSTRAINTS: &[&str] = &[
    "CREATE CONSTRAINT concept_cui IF NOT EXISTS FOR (c:Concept) REQUIRE c.cui IS UNIQUE",
    "CREATE CONSTRAINT code_code_id IF NOT EXISTS FOR (c:Code) REQUIRE c.code_id IS UNIQUE",
    "CREATE CONSTRAINT umls_meta_id IF NOT EXISTS FOR (m:UmlsMeta) REQUIRE m.id IS UNIQUE",
];

const READ_META_VERSION: &str = "MATCH (m:UmlsMeta {id: 'singleton'}) RETURN m.version AS value";

const SET_META_VERSION: &str =
    "MERGE (m:UmlsMeta {id: 'singleton'}) SET m.version = $version";

const DELETE_CONCEPTS: &str = "MATCH (c:Concept {cui: row}) DETACH DELETE c";

/// Transfers one retired concept onto its merge successor.
///
/// HAS_CODE links are re-pointed with a plain MERGE; typed inter-concept
/// relationships need `apoc.merge.relationship` because the relationship
/// type is data (the Biolink predicate). On a pre-existing counterpart the
/// provenance sets union and the newer version tag wins.
const MERGE_CONCEPT: &str = r#"
MATCH (old:Concept {cui: row.old_cui})
MERGE (new:Concept {cui: row.new_cui})
  ON CREATE SET new.last_seen_version = old.last_seen_version
WITH old, new
CALL {
  WITH old, new
  MATCH (old)-[link:HAS_CODE]->(code:Code)
  MERGE (new)-[moved:HAS_CODE]->(code)
    ON CREATE SET moved.last_seen_version = link.last_seen_version
}
CALL {
  WITH old, new
  MATCH (old)-[r]->(target:Concept)
  WHERE type(r) <> 'HAS_CODE'
  CALL apoc.merge.relationship(
    new, type(r), {source_rela: r.source_rela},
    {asserted_by_sabs: r.asserted_by_sabs, last_seen_version: r.last_seen_version},
    target, {}
  ) YIELD rel
  SET rel.asserted_by_sabs =
        apoc.coll.sort(apoc.coll.union(coalesce(rel.asserted_by_sabs, []), coalesce(r.asserted_by_sabs, []))),
      rel.last_seen_version =
        CASE WHEN rel.last_seen_version >= r.last_seen_version
             THEN rel.last_seen_version ELSE r.last_seen_version END
}
CALL {
  WITH old, new
  MATCH (source:Concept)-[r]->(old)
  WHERE type(r) <> 'HAS_CODE'
  CALL apoc.merge.relationship(
    source, type(r), {source_rela: r.source_rela},
    {asserted_by_sabs: r.asserted_by_sabs, last_seen_version: r.last_seen_version},
    new, {}
  ) YIELD rel
  SET rel.asserted_by_sabs =
        apoc.coll.sort(apoc.coll.union(coalesce(rel.asserted_by_sabs, []), coalesce(r.asserted_by_sabs, []))),
      rel.last_seen_version =
        CASE WHEN rel.last_seen_version >= r.last_seen_version
             THEN rel.last_seen_version ELSE r.last_seen_version END
}
DETACH DELETE old"#;

/// Upserts one concept and replaces its whole label set, so a label dropped
/// by the new release is removed rather than accumulated.
const UPSERT_CONCEPTS: &str = r#"
MERGE (c:Concept {cui: row.cui})
SET c.preferred_name = row.preferred_name,
    c.last_seen_version = $version
WITH c, row
CALL apoc.create.setLabels(c, row.labels) YIELD node
RETURN count(node) AS value"#;

const UPSERT_CODES: &str = r#"
MERGE (c:Code {code_id: row.code_id})
SET c.sab = row.sab,
    c.name = row.name,
    c.last_seen_version = $version"#;

const UPSERT_HAS_CODE: &str = r#"
MATCH (start:Concept {cui: row.cui})
MATCH (end:Code {code_id: row.code_id})
MERGE (start)-[r:HAS_CODE]->(end)
SET r.last_seen_version = $version"#;

const UPSERT_EDGES: &str = r#"
MATCH (start:Concept {cui: row.source_cui})
MATCH (end:Concept {cui: row.target_cui})
CALL apoc.merge.relationship(
  start, row.predicate, {source_rela: row.source_rela}, {}, end, {}
) YIELD rel
SET rel.last_seen_version = $version,
    rel.asserted_by_sabs =
      apoc.coll.sort(apoc.coll.union(coalesce(rel.asserted_by_sabs, []), row.asserted_by_sabs))"#;

/// One sweep round: stale relationships, bounded by `$limit` per
/// transaction. Returns how many were deleted so the caller can loop to
/// exhaustion.
const SWEEP_STALE_RELS: &str = r#"
MATCH ()-[r]->()
WHERE r.last_seen_version IS NULL OR r.last_seen_version <> $version
WITH r LIMIT $limit
DELETE r
RETURN count(r) AS value"#;

const SWEEP_STALE_CODES: &str = r#"
MATCH (c:Code)
WHERE c.last_seen_version IS NULL OR c.last_seen_version <> $version
WITH c LIMIT $limit
DETACH DELETE c
RETURN count(c) AS value"#;

#[derive(Debug, Clone)]
pub struct DeltaOptions {
    pub batch_size: usize,
    /// Allow re-running a sync whose version the graph already advertises.
    pub reapply: bool,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        DeltaOptions {
            batch_size: umls_sync_core::config::DEFAULT_APOC_BATCH_SIZE,
            reapply: false,
        }
    }
}

/// Orchestrates one Snapshot-Diff sync against an executor.
pub struct DeltaStrategy<'a, E: CypherExecutor> {
    executor: &'a E,
    version: ReleaseVersion,
    opts: DeltaOptions,
    cancel: CancelFlag,
}

impl<'a, E: CypherExecutor> DeltaStrategy<'a, E> {
    pub fn new(
        executor: &'a E,
        version: ReleaseVersion,
        opts: DeltaOptions,
        cancel: CancelFlag,
    ) -> Self {
        DeltaStrategy {
            executor,
            version,
            opts,
            cancel,
        }
    }

    /// Run the full five-phase sync. The report accumulates per-phase counts
    /// and wall times as phases complete.
    pub async fn run(
        &self,
        snapshot: &Snapshot,
        deleted_cuis: &[String],
        merges: &[MergePair],
        report: &mut SyncReport,
    ) -> Result<()> {
        self.check_precondition().await?;
        self.ensure_constraints().await?;

        self.check_cancel()?;
        let started = Instant::now();
        self.phase_deletions(deleted_cuis, report).await?;
        report.record_phase("deletions", started.elapsed());

        self.check_cancel()?;
        let started = Instant::now();
        self.phase_merges(merges, report).await?;
        report.record_phase("merges", started.elapsed());

        self.check_cancel()?;
        let started = Instant::now();
        self.phase_upsert(snapshot, report).await?;
        report.record_phase("upsert", started.elapsed());

        self.check_cancel()?;
        let started = Instant::now();
        self.phase_sweep(report).await?;
        report.record_phase("sweep", started.elapsed());

        self.check_cancel()?;
        let started = Instant::now();
        self.phase_finalize().await?;
        report.record_phase("finalize", started.elapsed());

        info!(version = %self.version, "incremental sync complete");
        Ok(())
    }

    /// Post-bulk-import bootstrap: constraints plus the meta singleton.
    pub async fn initialize_meta(&self) -> Result<()> {
        self.ensure_constraints().await?;
        self.set_meta_version().await?;
        Ok(())
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        Ok(())
    }

    async fn check_precondition(&self) -> Result<()> {
        let stored = self
            .executor
            .fetch_optional_string("read meta version", READ_META_VERSION, Vec::new())
            .await?
            .ok_or(GraphError::MetaNodeMissing)?;
        let installed = ReleaseVersion::parse(&stored)
            .map_err(|_| GraphError::InvalidStoredVersion(stored.clone()))?;

        if self.version == installed && !self.opts.reapply {
            return Err(GraphError::VersionUnchanged(installed.to_string()));
        }
        if self.version < installed {
            return Err(GraphError::VersionRegression {
                requested: self.version.to_string(),
                installed: installed.to_string(),
            });
        }
        info!(installed = %installed, target = %self.version, "version precondition ok");
        Ok(())
    }

    pub async fn ensure_constraints(&self) -> Result<()> {
        for statement in ENSURE_CONSTRAINTS {
            self.executor
                .run("ensure constraints", statement, Vec::new())
                .await?;
        }
        Ok(())
    }

    async fn phase_deletions(&self, deleted_cuis: &[String], report: &mut SyncReport) -> Result<()> {
        if deleted_cuis.is_empty() {
            return Ok(());
        }
        let outcome = self
            .executor
            .run_batched(BatchSpec {
                context: "delete retired concepts",
                statement: DELETE_CONCEPTS.to_string(),
                rows: deleted_cuis
                    .iter()
                    .map(|cui| BoltType::from(cui.clone()))
                    .collect(),
                params: Vec::new(),
                batch_size: self.opts.batch_size,
            })
            .await?;
        report.explicit_deletes = outcome.committed;
        report.failed_batches += outcome.errors.len() as u64;
        report.batch_errors.extend(outcome.errors);
        Ok(())
    }

    async fn phase_merges(&self, merges: &[MergePair], report: &mut SyncReport) -> Result<()> {
        let resolved = resolve_merge_chains(merges)?;
        if resolved.is_empty() {
            return Ok(());
        }
        let rows = resolved
            .iter()
            .map(|pair| {
                let mut map: HashMap<String, BoltType> = HashMap::new();
                map.insert("old_cui".to_string(), pair.old_cui.clone().into());
                map.insert("new_cui".to_string(), pair.new_cui.clone().into());
                BoltType::from(map)
            })
            .collect();
        let outcome = self
            .executor
            .run_batched(BatchSpec {
                context: "merge retired concepts",
                statement: MERGE_CONCEPT.to_string(),
                rows,
                params: Vec::new(),
                batch_size: self.opts.batch_size,
            })
            .await?;
        report.explicit_merges = outcome.committed;
        report.failed_batches += outcome.errors.len() as u64;
        report.batch_errors.extend(outcome.errors);
        Ok(())
    }

    async fn phase_upsert(&self, snapshot: &Snapshot, report: &mut SyncReport) -> Result<()> {
        let version_param = || {
            vec![(
                "version".to_string(),
                BoltType::from(self.version.as_str().to_string()),
            )]
        };

        let concepts = self
            .executor
            .run_batched(BatchSpec {
                context: "upsert concepts",
                statement: UPSERT_CONCEPTS.to_string(),
                rows: concept_rows(snapshot),
                params: version_param(),
                batch_size: self.opts.batch_size,
            })
            .await?;
        report.concepts_upserted = concepts.committed;

        let codes = self
            .executor
            .run_batched(BatchSpec {
                context: "upsert codes",
                statement: UPSERT_CODES.to_string(),
                rows: code_rows(snapshot),
                params: version_param(),
                batch_size: self.opts.batch_size,
            })
            .await?;
        report.codes_upserted = codes.committed;

        let links = self
            .executor
            .run_batched(BatchSpec {
                context: "upsert HAS_CODE links",
                statement: UPSERT_HAS_CODE.to_string(),
                rows: link_rows(snapshot),
                params: version_param(),
                batch_size: self.opts.batch_size,
            })
            .await?;
        report.has_code_upserted = links.committed;

        let edges = self
            .executor
            .run_batched(BatchSpec {
                context: "upsert inter-concept edges",
                statement: UPSERT_EDGES.to_string(),
                rows: edge_rows(&snapshot.edges),
                params: version_param(),
                batch_size: self.opts.batch_size,
            })
            .await?;
        report.edges_upserted = edges.committed;

        for outcome in [concepts, codes, links, edges] {
            report.failed_batches += outcome.errors.len() as u64;
            report.batch_errors.extend(outcome.errors);
        }
        Ok(())
    }

    /// Delete everything the upsert did not tag with the target version.
    /// Runs in bounded rounds, one transaction each, until a round deletes
    /// nothing.
    async fn phase_sweep(&self, report: &mut SyncReport) -> Result<()> {
        report.edges_swept = self.sweep_to_exhaustion("sweep stale edges", SWEEP_STALE_RELS).await?;
        report.codes_swept = self
            .sweep_to_exhaustion("sweep stale codes", SWEEP_STALE_CODES)
            .await?;
        Ok(())
    }

    async fn sweep_to_exhaustion(&self, context: &'static str, statement: &str) -> Result<u64> {
        let params = vec![
            (
                "version".to_string(),
                BoltType::from(self.version.as_str().to_string()),
            ),
            ("limit".to_string(), BoltType::from(self.opts.batch_size as i64)),
        ];
        let mut total = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            let removed = self
                .executor
                .fetch_count(context, statement, params.clone())
                .await?;
            if removed <= 0 {
                break;
            }
            total += removed as u64;
        }
        Ok(total)
    }

    async fn phase_finalize(&self) -> Result<()> {
        self.set_meta_version().await
    }

    async fn set_meta_version(&self) -> Result<()> {
        self.executor
            .run(
                "set meta version",
                SET_META_VERSION,
                vec![(
                    "version".to_string(),
                    BoltType::from(self.version.as_str().to_string()),
                )],
            )
            .await
    }
}

/// Collapse merge chains transitively and reject cycles.
///
/// `A→B, B→C` becomes `A→C, B→C`, so the resulting pairs are independent:
/// no target is also a source, and batches may apply in any order. A cycle
/// (`A→B, B→A`) cannot be collapsed and aborts the sync, naming its members.
/// Self-merges are dropped with a warning; a CUI listed twice keeps its
/// first mapping.
pub fn resolve_merge_chains(pairs: &[MergePair]) -> Result<Vec<MergePair>> {
    let mut mapping: HashMap<&str, &str> = HashMap::new();
    for pair in pairs {
        if pair.old_cui == pair.new_cui {
            warn!(cui = %pair.old_cui, "self-merge in MERGEDCUI, ignoring");
            continue;
        }
        if let Some(existing) = mapping.get(pair.old_cui.as_str()) {
            if *existing != pair.new_cui {
                warn!(
                    old = %pair.old_cui,
                    kept = %existing,
                    ignored = %pair.new_cui,
                    "conflicting MERGEDCUI targets, keeping first"
                );
            }
            continue;
        }
        mapping.insert(&pair.old_cui, &pair.new_cui);
    }

    let mut resolved = Vec::with_capacity(mapping.len());
    for (&old, &first_target) in &mapping {
        let mut target = first_target;
        let mut path = vec![old];
        while let Some(&next) = mapping.get(target) {
            if path.contains(&target) {
                path.push(target);
                return Err(GraphError::MergeCycle(
                    path.into_iter().map(String::from).collect(),
                ));
            }
            path.push(target);
            target = next;
        }
        resolved.push(MergePair {
            old_cui: old.to_string(),
            new_cui: target.to_string(),
        });
    }
    resolved.sort();
    Ok(resolved)
}

fn concept_rows(snapshot: &Snapshot) -> Vec<BoltType> {
    snapshot
        .concepts
        .iter()
        .map(|concept| {
            let mut map: HashMap<String, BoltType> = HashMap::new();
            map.insert("cui".to_string(), concept.cui.clone().into());
            map.insert(
                "preferred_name".to_string(),
                concept.preferred_name.clone().into(),
            );
            map.insert("labels".to_string(), concept.labels.clone().into());
            BoltType::from(map)
        })
        .collect()
}

fn code_rows(snapshot: &Snapshot) -> Vec<BoltType> {
    snapshot
        .codes
        .iter()
        .map(|code| {
            let mut map: HashMap<String, BoltType> = HashMap::new();
            map.insert("code_id".to_string(), code.code_id.clone().into());
            map.insert("sab".to_string(), code.sab.clone().into());
            map.insert("name".to_string(), code.name.clone().into());
            BoltType::from(map)
        })
        .collect()
}

fn link_rows(snapshot: &Snapshot) -> Vec<BoltType> {
    snapshot
        .links
        .iter()
        .map(|link| {
            let mut map: HashMap<String, BoltType> = HashMap::new();
            map.insert("cui".to_string(), link.cui.clone().into());
            map.insert("code_id".to_string(), link.code_id.clone().into());
            BoltType::from(map)
        })
        .collect()
}

fn edge_rows(edges: &[ConceptEdge]) -> Vec<BoltType> {
    edges
        .iter()
        .map(|edge| {
            let mut map: HashMap<String, BoltType> = HashMap::new();
            map.insert("source_cui".to_string(), edge.source_cui.clone().into());
            map.insert("target_cui".to_string(), edge.target_cui.clone().into());
            map.insert("source_rela".to_string(), edge.source_rela.clone().into());
            map.insert("predicate".to_string(), edge.predicate.clone().into());
            map.insert(
                "asserted_by_sabs".to_string(),
                edge.asserted_by_sabs.clone().into(),
            );
            BoltType::from(map)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(old: &str, new: &str) -> MergePair {
        MergePair {
            old_cui: old.to_string(),
            new_cui: new.to_string(),
        }
    }

    #[test]
    fn chains_collapse_transitively() {
        let resolved = resolve_merge_chains(&[pair("A", "B"), pair("B", "C")]).unwrap();
        assert_eq!(resolved, vec![pair("A", "C"), pair("B", "C")]);
    }

    #[test]
    fn long_chains_collapse_to_the_terminal_target() {
        let resolved =
            resolve_merge_chains(&[pair("A", "B"), pair("B", "C"), pair("C", "D")]).unwrap();
        assert_eq!(resolved, vec![pair("A", "D"), pair("B", "D"), pair("C", "D")]);
    }

    #[test]
    fn independent_pairs_pass_through() {
        let resolved = resolve_merge_chains(&[pair("A", "B"), pair("C", "D")]).unwrap();
        assert_eq!(resolved, vec![pair("A", "B"), pair("C", "D")]);
    }

    #[test]
    fn two_cycle_is_fatal_and_named() {
        let err = resolve_merge_chains(&[pair("A", "B"), pair("B", "A")]).unwrap_err();
        match err {
            GraphError::MergeCycle(members) => {
                assert!(members.contains(&"A".to_string()));
                assert!(members.contains(&"B".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn three_cycle_is_fatal() {
        let err =
            resolve_merge_chains(&[pair("A", "B"), pair("B", "C"), pair("C", "A")]).unwrap_err();
        assert!(matches!(err, GraphError::MergeCycle(_)));
    }

    #[test]
    fn self_merges_are_dropped() {
        let resolved = resolve_merge_chains(&[pair("A", "A"), pair("B", "C")]).unwrap();
        assert_eq!(resolved, vec![pair("B", "C")]);
    }

    #[test]
    fn duplicate_olds_keep_first_mapping() {
        let resolved = resolve_merge_chains(&[pair("A", "B"), pair("A", "C")]).unwrap();
        assert_eq!(resolved, vec![pair("A", "B")]);
    }

    #[test]
    fn many_olds_may_share_one_target() {
        let resolved =
            resolve_merge_chains(&[pair("A", "C"), pair("B", "C")]).unwrap();
        assert_eq!(resolved, vec![pair("A", "C"), pair("B", "C")]);
    }
}
