//! Reduction of parsed rows into a graph-ready [`Snapshot`].

use crate::record::{RelRow, StyRow, TermRow};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::warn;
use umls_sync_core::biolink;
use umls_sync_core::{CodeRecord, ConceptEdge, ConceptRecord, HasCodeLink, Snapshot};

/// Aggregates term, relationship, and semantic-type rows into the snapshot
/// collections, applying the preferred-name rule and provenance union.
pub struct Transformer {
    /// SAB → rank for preferred-name selection; unlisted SABs rank last.
    sab_rank: HashMap<String, usize>,
}

impl Transformer {
    pub fn new(sab_priority: &[String]) -> Self {
        Transformer {
            sab_rank: sab_priority
                .iter()
                .enumerate()
                .map(|(rank, sab)| (sab.clone(), rank))
                .collect(),
        }
    }

    /// Reduce parsed rows to a [`Snapshot`].
    ///
    /// Input row order must be the parser's deterministic chunk-order merge:
    /// the preferred-name rule breaks ties by first appearance, and code
    /// names come from the first row that introduces each code.
    pub fn build_snapshot(
        &self,
        terms: Vec<TermRow>,
        rels: Vec<RelRow>,
        stys: Vec<StyRow>,
    ) -> Snapshot {
        let mut terms_by_cui: BTreeMap<String, Vec<TermRow>> = BTreeMap::new();
        let mut codes: BTreeMap<String, CodeRecord> = BTreeMap::new();
        let mut links: BTreeSet<HasCodeLink> = BTreeSet::new();

        for term in terms {
            let code_id = format!("{}:{}", term.sab, term.code);
            codes.entry(code_id.clone()).or_insert_with(|| CodeRecord {
                code_id: code_id.clone(),
                sab: term.sab.clone(),
                name: term.name.clone(),
            });
            links.insert(HasCodeLink {
                cui: term.cui.clone(),
                code_id,
            });
            terms_by_cui.entry(term.cui.clone()).or_default().push(term);
        }

        let labels_by_cui = self.collect_labels(stys);

        let mut concepts = Vec::with_capacity(terms_by_cui.len());
        for (cui, cui_terms) in &terms_by_cui {
            let preferred = self.preferred_term(cui_terms);
            let mut labels = vec!["Concept".to_string()];
            if let Some(biolink_labels) = labels_by_cui.get(cui) {
                labels.extend(biolink_labels.iter().cloned());
            }
            concepts.push(ConceptRecord {
                cui: cui.clone(),
                preferred_name: preferred.name.clone(),
                labels,
            });
        }

        let edges = self.aggregate_edges(rels, &terms_by_cui);

        Snapshot {
            concepts,
            codes: codes.into_values().collect(),
            links: links.into_iter().collect(),
            edges,
        }
    }

    /// The Preferred-Name Rule: order candidates by SAB priority, then term
    /// status `P`, then string type `PF`, then the `ISPREF` flag; first
    /// appearance breaks remaining ties.
    fn preferred_term<'a>(&self, terms: &'a [TermRow]) -> &'a TermRow {
        terms
            .iter()
            .enumerate()
            .min_by_key(|(position, t)| {
                (
                    self.sab_rank.get(&t.sab).copied().unwrap_or(usize::MAX),
                    t.ts != "P",
                    t.stt != "PF",
                    t.ispref != "Y",
                    *position,
                )
            })
            .map(|(_, t)| t)
            .expect("a CUI group is never empty")
    }

    /// (CUI, TUI) pairs → sorted Biolink label sets, warning once per
    /// unmapped TUI.
    fn collect_labels(&self, stys: Vec<StyRow>) -> BTreeMap<String, BTreeSet<String>> {
        let mut labels: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut unknown_tuis: HashSet<String> = HashSet::new();
        for sty in stys {
            let category = match biolink::category_lookup(&sty.tui) {
                Some(category) => category,
                None => {
                    if unknown_tuis.insert(sty.tui.clone()) {
                        warn!(tui = %sty.tui, "no Biolink category mapping, using {}", biolink::DEFAULT_CATEGORY);
                    }
                    biolink::DEFAULT_CATEGORY
                }
            };
            labels
                .entry(sty.cui)
                .or_default()
                .insert(category.to_string());
        }
        labels
    }

    /// Group relationship rows by `(cui1, cui2, source_rela)`, unioning the
    /// asserting SABs. Rows naming a CUI outside the concept set are dropped
    /// silently (their vocabulary was filtered out upstream).
    fn aggregate_edges(
        &self,
        rels: Vec<RelRow>,
        concepts: &BTreeMap<String, Vec<TermRow>>,
    ) -> Vec<ConceptEdge> {
        let mut grouped: BTreeMap<(String, String, String), BTreeSet<String>> = BTreeMap::new();
        for rel in rels {
            if !concepts.contains_key(&rel.cui1) || !concepts.contains_key(&rel.cui2) {
                continue;
            }
            grouped
                .entry((rel.cui1, rel.cui2, rel.source_rela))
                .or_default()
                .insert(rel.sab);
        }

        let mut unknown_relas: HashSet<String> = HashSet::new();
        grouped
            .into_iter()
            .map(|((source_cui, target_cui, source_rela), sabs)| {
                let predicate = match biolink::predicate_lookup(&source_rela) {
                    Some(predicate) => predicate,
                    None => {
                        if unknown_relas.insert(source_rela.clone()) {
                            warn!(rela = %source_rela, "no Biolink predicate mapping, using {}", biolink::DEFAULT_PREDICATE);
                        }
                        biolink::DEFAULT_PREDICATE
                    }
                };
                ConceptEdge {
                    source_cui,
                    target_cui,
                    source_rela,
                    predicate: predicate.to_string(),
                    asserted_by_sabs: sabs.into_iter().collect(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(cui: &str, sab: &str, code: &str, name: &str, ts: &str, stt: &str, ispref: &str) -> TermRow {
        TermRow {
            cui: cui.to_string(),
            sab: sab.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            ts: ts.to_string(),
            stt: stt.to_string(),
            ispref: ispref.to_string(),
        }
    }

    fn rel(cui1: &str, cui2: &str, rela: &str, sab: &str) -> RelRow {
        RelRow {
            cui1: cui1.to_string(),
            cui2: cui2.to_string(),
            source_rela: rela.to_string(),
            sab: sab.to_string(),
        }
    }

    fn sty(cui: &str, tui: &str) -> StyRow {
        StyRow {
            cui: cui.to_string(),
            tui: tui.to_string(),
        }
    }

    fn transformer() -> Transformer {
        Transformer::new(&[
            "RXNORM".to_string(),
            "SNOMEDCT_US".to_string(),
            "MSH".to_string(),
        ])
    }

    #[test]
    fn sab_priority_dominates_preferred_name() {
        let snapshot = transformer().build_snapshot(
            vec![
                term("C001", "MSH", "D1", "Mesh Name", "P", "PF", "Y"),
                term("C001", "RXNORM", "R1", "RxNorm Name", "S", "VO", "N"),
            ],
            vec![],
            vec![],
        );
        assert_eq!(snapshot.concepts[0].preferred_name, "RxNorm Name");
    }

    #[test]
    fn term_status_breaks_sab_ties() {
        let snapshot = transformer().build_snapshot(
            vec![
                term("C001", "RXNORM", "R1", "Synonym", "S", "PF", "Y"),
                term("C001", "RXNORM", "R1", "Preferred", "P", "VO", "N"),
            ],
            vec![],
            vec![],
        );
        assert_eq!(snapshot.concepts[0].preferred_name, "Preferred");
    }

    #[test]
    fn unlisted_sabs_rank_after_listed_ones() {
        let snapshot = transformer().build_snapshot(
            vec![
                term("C001", "ICD10CM", "I1", "Icd Name", "P", "PF", "Y"),
                term("C001", "MSH", "D1", "Mesh Name", "S", "VO", "N"),
            ],
            vec![],
            vec![],
        );
        assert_eq!(snapshot.concepts[0].preferred_name, "Mesh Name");
    }

    #[test]
    fn input_order_breaks_full_ties() {
        let snapshot = transformer().build_snapshot(
            vec![
                term("C001", "MSH", "D1", "First", "P", "PF", "Y"),
                term("C001", "MSH", "D2", "Second", "P", "PF", "Y"),
            ],
            vec![],
            vec![],
        );
        assert_eq!(snapshot.concepts[0].preferred_name, "First");
    }

    #[test]
    fn preferred_name_is_partition_invariant() {
        // The same rows in the same merged order must elect the same name
        // no matter how the parse was chunked; the transformer only sees the
        // merged order, so this is equivalent to idempotence over re-runs.
        let rows = vec![
            term("C001", "SNOMEDCT_US", "S1", "Snomed Name", "P", "PF", "Y"),
            term("C001", "RXNORM", "R1", "RxNorm A", "P", "PF", "N"),
            term("C001", "RXNORM", "R2", "RxNorm B", "P", "PF", "Y"),
            term("C002", "MSH", "D7", "Other", "P", "PF", "Y"),
        ];
        let first = transformer().build_snapshot(rows.clone(), vec![], vec![]);
        let second = transformer().build_snapshot(rows, vec![], vec![]);
        assert_eq!(first, second);
        assert_eq!(first.concepts[0].preferred_name, "RxNorm B");
    }

    #[test]
    fn codes_deduplicate_and_keep_first_name() {
        let snapshot = transformer().build_snapshot(
            vec![
                term("C001", "MSH", "D1", "First Name", "P", "PF", "Y"),
                term("C002", "MSH", "D1", "Second Name", "P", "PF", "Y"),
            ],
            vec![],
            vec![],
        );
        assert_eq!(snapshot.codes.len(), 1);
        assert_eq!(snapshot.codes[0].code_id, "MSH:D1");
        assert_eq!(snapshot.codes[0].name, "First Name");
        // Both concepts link to the shared code.
        assert_eq!(snapshot.links.len(), 2);
    }

    #[test]
    fn labels_include_concept_plus_sorted_biolink_set() {
        let snapshot = transformer().build_snapshot(
            vec![term("C001", "MSH", "D1", "Name", "P", "PF", "Y")],
            vec![],
            vec![sty("C001", "T121"), sty("C001", "T047"), sty("C001", "T121")],
        );
        assert_eq!(
            snapshot.concepts[0].labels,
            ["Concept", "biolink:Disease", "biolink:Drug"]
        );
    }

    #[test]
    fn unknown_tui_gets_default_category() {
        let snapshot = transformer().build_snapshot(
            vec![term("C001", "MSH", "D1", "Name", "P", "PF", "Y")],
            vec![],
            vec![sty("C001", "T999")],
        );
        assert_eq!(snapshot.concepts[0].labels, ["Concept", "biolink:NamedThing"]);
    }

    #[test]
    fn edges_union_provenance_per_key() {
        let terms = vec![
            term("C001", "MSH", "D1", "A", "P", "PF", "Y"),
            term("C002", "MSH", "D2", "B", "P", "PF", "Y"),
        ];
        let rels = vec![
            rel("C001", "C002", "treats", "SAB_B"),
            rel("C001", "C002", "treats", "SAB_A"),
            rel("C001", "C002", "treats", "SAB_A"),
        ];
        let snapshot = transformer().build_snapshot(terms, rels, vec![]);
        assert_eq!(snapshot.edges.len(), 1);
        let edge = &snapshot.edges[0];
        assert_eq!(edge.predicate, "biolink:treats");
        assert_eq!(edge.asserted_by_sabs, ["SAB_A", "SAB_B"]);
    }

    #[test]
    fn different_relas_stay_separate_edges() {
        let terms = vec![
            term("C001", "MSH", "D1", "A", "P", "PF", "Y"),
            term("C002", "MSH", "D2", "B", "P", "PF", "Y"),
        ];
        let rels = vec![
            rel("C001", "C002", "treats", "MSH"),
            rel("C001", "C002", "causes", "MSH"),
        ];
        let snapshot = transformer().build_snapshot(terms, rels, vec![]);
        assert_eq!(snapshot.edges.len(), 2);
    }

    #[test]
    fn edges_to_unknown_cuis_are_dropped() {
        let terms = vec![term("C001", "MSH", "D1", "A", "P", "PF", "Y")];
        let rels = vec![rel("C001", "C999", "treats", "MSH")];
        let snapshot = transformer().build_snapshot(terms, rels, vec![]);
        assert!(snapshot.edges.is_empty());
    }

    #[test]
    fn empty_mrrel_means_no_edges() {
        let terms = vec![term("C001", "MSH", "D1", "A", "P", "PF", "Y")];
        let snapshot = transformer().build_snapshot(terms, vec![], vec![]);
        assert!(snapshot.edges.is_empty());
        assert_eq!(snapshot.concepts.len(), 1);
    }

    #[test]
    fn unknown_rela_maps_to_default_predicate() {
        let terms = vec![
            term("C001", "MSH", "D1", "A", "P", "PF", "Y"),
            term("C002", "MSH", "D2", "B", "P", "PF", "Y"),
        ];
        let rels = vec![rel("C001", "C002", "RO", "MSH")];
        let snapshot = transformer().build_snapshot(terms, rels, vec![]);
        assert_eq!(snapshot.edges[0].predicate, "biolink:related_to");
        assert_eq!(snapshot.edges[0].source_rela, "RO");
    }
}
