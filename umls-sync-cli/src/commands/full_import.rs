use crate::error::CliResult;
use crate::pipeline;
use colored::Colorize;
use std::path::PathBuf;
use umls_sync_core::{ReleaseVersion, Settings};
use umls_sync_graph::{bulk, BulkCsvWriter};

pub async fn run(
    version: &str,
    sab_filter: Option<&str>,
    output_dir: Option<PathBuf>,
    meta_dir: Option<PathBuf>,
    quiet: bool,
) -> CliResult<()> {
    let version = ReleaseVersion::parse(version)?;
    let mut settings = Settings::load()?;
    pipeline::apply_sab_override(&mut settings, sab_filter);
    if let Some(dir) = output_dir {
        settings.neo4j_import_dir = Some(dir);
    }
    let import_dir = settings.require_import_dir()?.to_path_buf();

    let meta_dir = pipeline::resolve_meta_dir(&settings, &version, meta_dir, !quiet).await?;
    let output = pipeline::build_snapshot(&settings, meta_dir, !quiet).await?;

    let writer = BulkCsvWriter::new(&import_dir);
    let files = writer.write_snapshot(&output.snapshot, &version)?;
    let command = writer.admin_import_command(&settings.graph.database);

    if !quiet {
        println!(
            "Wrote {} concepts, {} codes, {} HAS_CODE links, {} edges to {}",
            files.concepts,
            files.codes,
            files.has_code,
            files.edges,
            import_dir.display()
        );
        println!(
            "({} rows parsed, {} skipped)",
            output.stats.kept,
            output.stats.skipped()
        );
        println!();
    }
    println!(
        "{}",
        bulk::import_instructions(&command, &settings.graph.database, &version).yellow()
    );
    Ok(())
}
