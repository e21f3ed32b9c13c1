//! Static UMLS → Biolink Model mapping tables.
//!
//! Two read-only lookups: semantic type identifier (TUI) → Biolink category
//! label, and relationship attribute (RELA, falling back to REL) → Biolink
//! predicate. The tables cover the common clinical vocabularies; anything
//! unmapped falls back to [`DEFAULT_CATEGORY`] / [`DEFAULT_PREDICATE`].
//!
//! The Biolink Model itself is the source of truth for the label and
//! predicate vocabulary: <https://github.com/biolink/biolink-model>.

use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_CATEGORY: &str = "biolink:NamedThing";
pub const DEFAULT_PREDICATE: &str = "biolink:related_to";

/// TUI → Biolink category.
static TUI_CATEGORIES: &[(&str, &str)] = &[
    // Disorders
    ("T019", "biolink:Disease"), // Congenital Abnormality
    ("T020", "biolink:Disease"), // Acquired Abnormality
    ("T037", "biolink:Disease"), // Injury or Poisoning
    ("T047", "biolink:Disease"), // Disease or Syndrome
    ("T048", "biolink:Disease"), // Mental or Behavioral Dysfunction
    ("T049", "biolink:Disease"), // Cell or Molecular Dysfunction
    ("T190", "biolink:Disease"), // Anatomical Abnormality
    ("T191", "biolink:Disease"), // Neoplastic Process
    // Chemicals & drugs
    ("T109", "biolink:ChemicalEntity"), // Organic Chemical
    ("T116", "biolink:AminoAcidSequence"), // Amino Acid, Peptide, or Protein
    ("T121", "biolink:Drug"),           // Pharmacologic Substance
    ("T123", "biolink:ChemicalEntity"), // Biologically Active Substance
    ("T197", "biolink:ChemicalEntity"), // Inorganic Chemical
    ("T200", "biolink:Drug"),           // Clinical Drug
    // Genes & molecular sequences
    ("T028", "biolink:Gene"),                // Gene or Genome
    ("T114", "biolink:NucleicAcidSequence"), // Nucleotide Sequence
    // Anatomy
    ("T017", "biolink:AnatomicalEntity"), // Anatomical Structure
    ("T023", "biolink:AnatomicalEntity"), // Body Part, Organ, or Organ Component
    ("T024", "biolink:Tissue"),
    ("T025", "biolink:Cell"),
    ("T026", "biolink:CellularComponent"),
    // Phenotypes & findings
    ("T033", "biolink:PhenotypicFeature"), // Finding
    ("T034", "biolink:LaboratoryFinding"), // Laboratory or Test Result
    ("T184", "biolink:SignOrSymptom"),
    // Procedures
    ("T061", "biolink:Procedure"), // Therapeutic or Preventive Procedure
    // Biological processes
    ("T039", "biolink:PhysiologicalProcess"), // Physiologic Function
    ("T040", "biolink:OrganismalProcess"),    // Organism Function
    ("T041", "biolink:PathologicalProcess"),  // Pathologic Function
    ("T043", "biolink:BiologicalProcess"),    // Cell Function
];

/// RELA keyword → Biolink predicate.
///
/// RELA values are frequently composed phrases (`may_be_treated_by`,
/// `is_associated_with`), so [`predicate_lookup`] matches exact values first
/// and then falls back to substring containment in table order.
static RELA_PREDICATES: &[(&str, &str)] = &[
    ("treats", "biolink:treats"),
    ("treated_by", "biolink:treated_by"),
    ("isa", "biolink:subclass_of"),
    ("part_of", "biolink:part_of"),
    ("has_part", "biolink:has_part"),
    ("associated_with", "biolink:related_to"),
    ("causes", "biolink:causes"),
    ("caused_by", "biolink:caused_by"),
    ("location_of", "biolink:location_of"),
    ("has_location", "biolink:located_in"),
    ("diagnoses", "biolink:diagnoses"),
    ("diagnosed_by", "biolink:biomarker_for"),
    ("prevents", "biolink:prevents"),
    ("prevented_by", "biolink:prevented_by"),
    ("produces", "biolink:produces"),
    ("produced_by", "biolink:produced_by"),
    ("contraindicated_with", "biolink:contraindicated_in"),
];

fn tui_index() -> &'static HashMap<&'static str, &'static str> {
    static INDEX: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    INDEX.get_or_init(|| TUI_CATEGORIES.iter().copied().collect())
}

fn rela_index() -> &'static HashMap<&'static str, &'static str> {
    static INDEX: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    INDEX.get_or_init(|| RELA_PREDICATES.iter().copied().collect())
}

/// The Biolink category for a TUI, if the table maps it.
pub fn category_lookup(tui: &str) -> Option<&'static str> {
    tui_index().get(tui).copied()
}

/// The Biolink category for a TUI, defaulting to `biolink:NamedThing`.
pub fn category_for(tui: &str) -> &'static str {
    category_lookup(tui).unwrap_or(DEFAULT_CATEGORY)
}

/// The Biolink predicate for a RELA (or REL) value, if recognized.
///
/// Case-insensitive; exact matches win over keyword containment.
pub fn predicate_lookup(rela_or_rel: &str) -> Option<&'static str> {
    let lower = rela_or_rel.to_ascii_lowercase();
    if let Some(predicate) = rela_index().get(lower.as_str()) {
        return Some(predicate);
    }
    RELA_PREDICATES
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, predicate)| *predicate)
}

/// The Biolink predicate for a RELA (or REL) value, defaulting to
/// `biolink:related_to`.
pub fn predicate_for(rela_or_rel: &str) -> &'static str {
    predicate_lookup(rela_or_rel).unwrap_or(DEFAULT_PREDICATE)
}
