//! Shared download → parse → transform pipeline used by both import paths.

use crate::downloader::UtsDownloader;
use crate::error::CliResult;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use umls_sync_core::{MergePair, ReleaseVersion, Settings, Snapshot};
use umls_sync_rrf::{FileStats, ParseOptions, RrfParser, Transformer};

pub struct PipelineOutput {
    pub snapshot: Snapshot,
    pub deleted_cuis: Vec<String>,
    pub merges: Vec<MergePair>,
    pub stats: FileStats,
}

/// Resolve the META directory for `version`: an explicit `--meta-dir` wins,
/// otherwise the downloader fetches (or reuses) the release.
pub async fn resolve_meta_dir(
    settings: &Settings,
    version: &ReleaseVersion,
    meta_dir: Option<PathBuf>,
    show_progress: bool,
) -> CliResult<PathBuf> {
    if let Some(dir) = meta_dir {
        info!(dir = %dir.display(), "using local META directory");
        return Ok(dir);
    }
    let downloader = UtsDownloader::new(
        settings.umls_api_key.clone(),
        settings.download_dir.clone(),
        show_progress,
    );
    Ok(downloader.fetch_meta_dir(version).await?)
}

/// Parse the release files and reduce them to a snapshot. The parse runs on
/// a blocking thread: the worker pool inside is CPU-bound.
pub async fn build_snapshot(
    settings: &Settings,
    meta_dir: PathBuf,
    show_progress: bool,
) -> CliResult<PipelineOutput> {
    let spinner = if show_progress {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template("{spinner} {msg}").expect("static template"));
        spinner.set_message("parsing RRF files");
        spinner.enable_steady_tick(Duration::from_millis(120));
        Some(spinner)
    } else {
        None
    };

    let opts = ParseOptions::from_settings(settings);
    let sab_priority = settings.sab_priority.clone();
    let output = tokio::task::spawn_blocking(move || -> Result<PipelineOutput, umls_sync_rrf::RrfError> {
        let parser = RrfParser::new(meta_dir, opts)?;
        let release = parser.parse_release()?;
        let snapshot =
            Transformer::new(&sab_priority).build_snapshot(release.terms, release.rels, release.stys);
        Ok(PipelineOutput {
            snapshot,
            deleted_cuis: release.deleted_cuis,
            merges: release.merges,
            stats: release.stats,
        })
    })
    .await
    .expect("parse task panicked")?;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    info!(
        concepts = output.snapshot.concepts.len(),
        codes = output.snapshot.codes.len(),
        links = output.snapshot.links.len(),
        edges = output.snapshot.edges.len(),
        "snapshot built"
    );
    Ok(output)
}

/// Apply a `--sab-filter` override on top of the environment settings.
pub fn apply_sab_override(settings: &mut Settings, sab_filter: Option<&str>) {
    if let Some(raw) = sab_filter {
        settings.sab_filter = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
}
