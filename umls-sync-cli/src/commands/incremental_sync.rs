use crate::error::CliResult;
use crate::pipeline;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use umls_sync_core::{CancelFlag, ReleaseVersion, Settings, SyncReport};
use umls_sync_graph::{DeltaOptions, DeltaStrategy, GraphClient, RetryPolicy};

pub async fn run(
    version: &str,
    sab_filter: Option<&str>,
    batch_size: Option<usize>,
    reapply: bool,
    meta_dir: Option<PathBuf>,
    quiet: bool,
) -> CliResult<()> {
    let version = ReleaseVersion::parse(version)?;
    let mut settings = Settings::load()?;
    pipeline::apply_sab_override(&mut settings, sab_filter);
    if let Some(size) = batch_size {
        settings.apoc_batch_size = size;
    }

    let meta_dir = pipeline::resolve_meta_dir(&settings, &version, meta_dir, !quiet).await?;
    let output = pipeline::build_snapshot(&settings, meta_dir, !quiet).await?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("cancellation requested; stopping at the next batch boundary");
                cancel.cancel();
            }
        });
    }

    let client = GraphClient::connect(
        &settings.graph,
        RetryPolicy::from_settings(&settings),
        Duration::from_secs(settings.tx_timeout_secs),
        cancel.clone(),
    )
    .await?;
    client.ping().await?;

    let strategy = DeltaStrategy::new(
        &client,
        version.clone(),
        DeltaOptions {
            batch_size: settings.apoc_batch_size,
            reapply,
        },
        cancel,
    );

    let mut report = SyncReport::new(version.as_str());
    report.rows_parsed = output.stats.kept;
    report.rows_skipped = output.stats.skipped();
    strategy
        .run(
            &output.snapshot,
            &output.deleted_cuis,
            &output.merges,
            &mut report,
        )
        .await?;

    if !quiet {
        print_report(&report);
    }
    println!(
        "{}",
        format!("Incremental sync to version {version} completed successfully.").green()
    );
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!("Sync report for version {}", report.version);
    println!("  rows parsed:        {}", report.rows_parsed);
    println!("  rows skipped:       {}", report.rows_skipped);
    println!("  explicit deletes:   {}", report.explicit_deletes);
    println!("  explicit merges:    {}", report.explicit_merges);
    println!("  concepts upserted:  {}", report.concepts_upserted);
    println!("  codes upserted:     {}", report.codes_upserted);
    println!("  HAS_CODE upserted:  {}", report.has_code_upserted);
    println!("  edges upserted:     {}", report.edges_upserted);
    println!("  edges swept:        {}", report.edges_swept);
    println!("  codes swept:        {}", report.codes_swept);
    for timing in &report.phases {
        println!("  phase {:<10} {:>8.2}s", timing.phase, timing.secs);
    }
    if !report.batch_errors.is_empty() {
        println!(
            "{}",
            format!("  {} batch(es) failed:", report.failed_batches).red()
        );
        for error in &report.batch_errors {
            println!("    {error}");
        }
    }
}
