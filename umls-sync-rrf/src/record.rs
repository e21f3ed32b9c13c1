//! RRF row shapes and per-line parsing.
//!
//! RRF files are pipe-delimited with no quoting and a trailing pipe per row,
//! so `split('|')` yields the documented field count plus one empty tail.
//! Column positions follow the UMLS MRFILES layouts.

use umls_sync_core::MergePair;

/// MRCONSO.RRF column positions (18 fields).
pub mod mrconso {
    pub const CUI: usize = 0;
    pub const TS: usize = 2;
    pub const STT: usize = 4;
    pub const ISPREF: usize = 6;
    pub const SAB: usize = 11;
    pub const CODE: usize = 13;
    pub const STR: usize = 14;
    pub const SUPPRESS: usize = 16;
    pub const FIELD_COUNT: usize = 18;
}

/// MRREL.RRF column positions (16 fields).
pub mod mrrel {
    pub const CUI1: usize = 0;
    pub const REL: usize = 3;
    pub const CUI2: usize = 4;
    pub const RELA: usize = 7;
    pub const SAB: usize = 10;
    pub const FIELD_COUNT: usize = 16;
}

/// MRSTY.RRF column positions (6 fields).
pub mod mrsty {
    pub const CUI: usize = 0;
    pub const TUI: usize = 1;
    pub const FIELD_COUNT: usize = 6;
}

/// One filtered MRCONSO row: a term naming a concept in a source vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermRow {
    pub cui: String,
    pub sab: String,
    pub code: String,
    pub name: String,
    pub ts: String,
    pub stt: String,
    pub ispref: String,
}

/// One filtered MRREL row. `source_rela` already holds the RELA-or-REL
/// fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelRow {
    pub cui1: String,
    pub cui2: String,
    pub source_rela: String,
    pub sab: String,
}

/// One MRSTY row: a semantic type assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyRow {
    pub cui: String,
    pub tui: String,
}

/// Outcome of parsing a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome<T> {
    Kept(T),
    Filtered,
    Malformed,
}

/// Row-level filter options, derived from [`Settings`](umls_sync_core::Settings).
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    /// Empty set means "keep every SAB".
    pub sab_allowlist: std::collections::HashSet<String>,
    pub suppression: umls_sync_core::SuppressionHandling,
}

impl RowFilter {
    fn keeps_sab(&self, sab: &str) -> bool {
        self.sab_allowlist.is_empty() || self.sab_allowlist.contains(sab)
    }
}

pub fn parse_conso_line(line: &str, filter: &RowFilter) -> RowOutcome<TermRow> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < mrconso::FIELD_COUNT {
        return RowOutcome::Malformed;
    }
    if !filter.keeps_sab(fields[mrconso::SAB]) || filter.suppression.drops(fields[mrconso::SUPPRESS])
    {
        return RowOutcome::Filtered;
    }
    RowOutcome::Kept(TermRow {
        cui: fields[mrconso::CUI].to_string(),
        sab: fields[mrconso::SAB].to_string(),
        code: fields[mrconso::CODE].to_string(),
        name: fields[mrconso::STR].to_string(),
        ts: fields[mrconso::TS].to_string(),
        stt: fields[mrconso::STT].to_string(),
        ispref: fields[mrconso::ISPREF].to_string(),
    })
}

pub fn parse_rel_line(line: &str, filter: &RowFilter) -> RowOutcome<RelRow> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < mrrel::FIELD_COUNT {
        return RowOutcome::Malformed;
    }
    if !filter.keeps_sab(fields[mrrel::SAB]) {
        return RowOutcome::Filtered;
    }
    // Self-loops are not represented in the graph.
    if fields[mrrel::CUI1] == fields[mrrel::CUI2] {
        return RowOutcome::Filtered;
    }
    let rela = fields[mrrel::RELA];
    let source_rela = if rela.is_empty() {
        fields[mrrel::REL]
    } else {
        rela
    };
    RowOutcome::Kept(RelRow {
        cui1: fields[mrrel::CUI1].to_string(),
        cui2: fields[mrrel::CUI2].to_string(),
        source_rela: source_rela.to_string(),
        sab: fields[mrrel::SAB].to_string(),
    })
}

pub fn parse_sty_line(line: &str) -> RowOutcome<StyRow> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() < mrsty::FIELD_COUNT {
        return RowOutcome::Malformed;
    }
    RowOutcome::Kept(StyRow {
        cui: fields[mrsty::CUI].to_string(),
        tui: fields[mrsty::TUI].to_string(),
    })
}

/// DELETEDCUI.RRF: the retired CUI is the first field.
pub fn parse_deleted_cui_line(line: &str) -> Option<String> {
    let cui = line.split('|').next()?.trim();
    if cui.is_empty() {
        None
    } else {
        Some(cui.to_string())
    }
}

/// MERGEDCUI.RRF: `old_cui|new_cui`, with or without the trailing pipe.
pub fn parse_merged_cui_line(line: &str) -> Option<MergePair> {
    let mut fields = line.split('|').map(str::trim);
    let old_cui = fields.next()?.to_string();
    let new_cui = fields.next()?.to_string();
    if old_cui.is_empty() || new_cui.is_empty() {
        return None;
    }
    Some(MergePair { old_cui, new_cui })
}
