//! Snapshot record types exchanged between the parser, transformer, bulk
//! writer, and delta strategy.

use serde::{Deserialize, Serialize};

/// One UMLS concept with its chosen preferred name and label set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptRecord {
    /// Concept Unique Identifier, e.g. `C0000139`.
    pub cui: String,
    pub preferred_name: String,
    /// Full node label set: `Concept` first, then the sorted Biolink
    /// category labels derived from the concept's semantic types.
    pub labels: Vec<String>,
}

/// One source-vocabulary code, keyed by `{SAB}:{code}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRecord {
    pub code_id: String,
    pub sab: String,
    /// Term string from the first row that introduced this code.
    pub name: String,
}

/// A `(Concept)-[:HAS_CODE]->(Code)` link.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HasCodeLink {
    pub cui: String,
    pub code_id: String,
}

/// One aggregated inter-concept relationship.
///
/// Uniquely identified by `(source_cui, target_cui, source_rela)`; every
/// MRREL row sharing that key contributes its SAB to `asserted_by_sabs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub source_cui: String,
    pub target_cui: String,
    /// The original RELA, or REL when RELA was empty.
    pub source_rela: String,
    /// Biolink predicate used as the edge type, e.g. `biolink:treats`.
    pub predicate: String,
    /// Sorted, deduplicated set of asserting source vocabularies.
    pub asserted_by_sabs: Vec<String>,
}

/// A resolved `MERGEDCUI` row: retire `old_cui`, move its data to `new_cui`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MergePair {
    pub old_cui: String,
    pub new_cui: String,
}

/// The fully transformed content of one UMLS release, ready for either the
/// bulk CSV writer or the incremental delta strategy.
///
/// All four collections are sorted by their identifying key, so a snapshot
/// built from the same input is byte-identical regardless of how the parse
/// was partitioned across workers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub concepts: Vec<ConceptRecord>,
    pub codes: Vec<CodeRecord>,
    pub links: Vec<HasCodeLink>,
    pub edges: Vec<ConceptEdge>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
            && self.codes.is_empty()
            && self.links.is_empty()
            && self.edges.is_empty()
    }
}
