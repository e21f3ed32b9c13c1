//! Bulk-import CSV emission for a fresh database.
//!
//! Writes the four node/relationship CSVs in `neo4j-admin database import`
//! header convention (typed columns, per-kind ID spaces, `:LABEL`/`:TYPE`
//! columns) and produces the printable import invocation. The command is
//! never executed here: the target database must be stopped first, which is
//! the operator's call.

use crate::Result;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use umls_sync_core::{ReleaseVersion, Snapshot};

pub const CONCEPTS_CSV: &str = "nodes_concepts.csv";
pub const CODES_CSV: &str = "nodes_codes.csv";
pub const HAS_CODE_CSV: &str = "rels_has_code.csv";
pub const EDGES_CSV: &str = "rels_inter_concept.csv";

/// Paths and row counts of one written CSV set.
#[derive(Debug, Clone)]
pub struct BulkFiles {
    pub import_dir: PathBuf,
    pub concepts: u64,
    pub codes: u64,
    pub has_code: u64,
    pub edges: u64,
}

/// Writes snapshot CSVs into the configured Neo4j import directory.
pub struct BulkCsvWriter {
    import_dir: PathBuf,
}

impl BulkCsvWriter {
    pub fn new(import_dir: impl Into<PathBuf>) -> Self {
        BulkCsvWriter {
            import_dir: import_dir.into(),
        }
    }

    pub fn write_snapshot(&self, snapshot: &Snapshot, version: &ReleaseVersion) -> Result<BulkFiles> {
        std::fs::create_dir_all(&self.import_dir)?;
        let version = version.as_str();

        let concepts = self.write_csv(
            CONCEPTS_CSV,
            &[
                "cui:ID(Concept-ID)",
                "preferred_name:string",
                "last_seen_version:string",
                ":LABEL",
            ],
            snapshot.concepts.iter().map(|concept| {
                vec![
                    Cow::from(concept.cui.as_str()),
                    Cow::from(concept.preferred_name.as_str()),
                    Cow::from(version),
                    Cow::from(concept.labels.join(";")),
                ]
            }),
        )?;

        let codes = self.write_csv(
            CODES_CSV,
            &[
                "code_id:ID(Code-ID)",
                "sab:string",
                "name:string",
                "last_seen_version:string",
            ],
            snapshot.codes.iter().map(|code| {
                vec![
                    Cow::from(code.code_id.as_str()),
                    Cow::from(code.sab.as_str()),
                    Cow::from(code.name.as_str()),
                    Cow::from(version),
                ]
            }),
        )?;

        let has_code = self.write_csv(
            HAS_CODE_CSV,
            &[
                ":START_ID(Concept-ID)",
                ":END_ID(Code-ID)",
                "last_seen_version:string",
                ":TYPE",
            ],
            snapshot.links.iter().map(|link| {
                vec![
                    Cow::from(link.cui.as_str()),
                    Cow::from(link.code_id.as_str()),
                    Cow::from(version),
                    Cow::from("HAS_CODE"),
                ]
            }),
        )?;

        let edges = self.write_csv(
            EDGES_CSV,
            &[
                ":START_ID(Concept-ID)",
                ":END_ID(Concept-ID)",
                "source_rela:string",
                "asserted_by_sabs:string[]",
                "last_seen_version:string",
                ":TYPE",
            ],
            snapshot.edges.iter().map(|edge| {
                vec![
                    Cow::from(edge.source_cui.as_str()),
                    Cow::from(edge.target_cui.as_str()),
                    Cow::from(edge.source_rela.as_str()),
                    Cow::from(edge.asserted_by_sabs.join(";")),
                    Cow::from(version),
                    Cow::from(edge.predicate.as_str()),
                ]
            }),
        )?;

        Ok(BulkFiles {
            import_dir: self.import_dir.clone(),
            concepts,
            codes,
            has_code,
            edges,
        })
    }

    /// The `neo4j-admin` invocation for the written CSVs. Paths are bare
    /// filenames: the importer resolves them against its own import
    /// directory.
    pub fn admin_import_command(&self, database: &str) -> String {
        format!(
            "neo4j-admin database import full \\\n    \
             --nodes=\"{CONCEPTS_CSV}\" \\\n    \
             --nodes=\"{CODES_CSV}\" \\\n    \
             --relationships=\"{HAS_CODE_CSV}\" \\\n    \
             --relationships=\"{EDGES_CSV}\" \\\n    \
             --overwrite-destination=true \\\n    \
             {database}"
        )
    }

    fn write_csv<'a, I>(&self, name: &str, header: &[&str], rows: I) -> Result<u64>
    where
        I: Iterator<Item = Vec<Cow<'a, str>>>,
    {
        let path = self.import_dir.join(name);
        let mut writer = BufWriter::new(File::create(&path)?);
        write_record(&mut writer, header.iter().copied())?;
        let mut count = 0u64;
        for row in rows {
            write_record(&mut writer, row.iter().map(Cow::as_ref))?;
            count += 1;
        }
        writer.flush()?;
        info!(file = %path.display(), rows = count, "wrote bulk CSV");
        Ok(count)
    }
}

fn write_record<'a, W: Write>(
    writer: &mut W,
    fields: impl Iterator<Item = &'a str>,
) -> std::io::Result<()> {
    let mut first = true;
    for field in fields {
        if !first {
            writer.write_all(b",")?;
        }
        first = false;
        writer.write_all(csv_field(field).as_bytes())?;
    }
    writer.write_all(b"\n")
}

/// Minimal RFC-4180 quoting: fields containing a comma, quote, or newline
/// are wrapped in quotes with embedded quotes doubled.
fn csv_field(field: &str) -> Cow<'_, str> {
    if field.contains(['"', ',', '\n', '\r']) {
        Cow::from(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::from(field)
    }
}

/// Render a full bulk-import run as operator instructions.
pub fn import_instructions(command: &str, database: &str, version: &ReleaseVersion) -> String {
    format!(
        "Run the offline bulk import (the '{database}' database must be STOPPED first):\n\n\
         {command}\n\n\
         After the import completes, restart the database and initialize the\n\
         sync metadata:\n\n    \
         umls-sync init-meta --version {version}\n"
    )
}
