//! Parallel RRF file parsing.

use crate::chunk::{line_aligned_chunks, ByteRange};
use crate::record::{
    parse_conso_line, parse_deleted_cui_line, parse_merged_cui_line, parse_rel_line,
    parse_sty_line, RelRow, RowFilter, RowOutcome, StyRow, TermRow,
};
use crate::{Result, RrfError};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use umls_sync_core::{MergePair, Settings};

const MRCONSO: &str = "MRCONSO.RRF";
const MRREL: &str = "MRREL.RRF";
const MRSTY: &str = "MRSTY.RRF";
const DELETEDCUI: &str = "DELETEDCUI.RRF";
const MERGEDCUI: &str = "MERGEDCUI.RRF";

/// How many chunks to cut per worker; more chunks than workers keeps the
/// pool busy when chunk runtimes are uneven.
const CHUNKS_PER_WORKER: usize = 4;

/// Parser tuning derived from [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub filter: RowFilter,
    pub workers: usize,
    pub max_malformed_rows: u64,
}

impl ParseOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        ParseOptions {
            filter: RowFilter {
                sab_allowlist: settings.sab_filter.iter().cloned().collect(),
                suppression: settings.suppression.clone(),
            },
            workers: settings.max_parallel_workers,
            max_malformed_rows: settings.max_malformed_rows,
        }
    }
}

/// Per-file row accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub kept: u64,
    pub filtered: u64,
    pub malformed: u64,
}

impl FileStats {
    pub fn absorb(&mut self, other: FileStats) {
        self.kept += other.kept;
        self.filtered += other.filtered;
        self.malformed += other.malformed;
    }

    pub fn skipped(&self) -> u64 {
        self.filtered + self.malformed
    }
}

/// Everything parsed out of one release's META directory.
#[derive(Debug, Default)]
pub struct ParsedRelease {
    pub terms: Vec<TermRow>,
    pub rels: Vec<RelRow>,
    pub stys: Vec<StyRow>,
    pub deleted_cuis: Vec<String>,
    pub merges: Vec<MergePair>,
    pub stats: FileStats,
}

/// Chunked, parallel parser over a UMLS META directory.
pub struct RrfParser {
    meta_dir: PathBuf,
    opts: ParseOptions,
    pool: rayon::ThreadPool,
}

impl RrfParser {
    pub fn new(meta_dir: impl Into<PathBuf>, opts: ParseOptions) -> Result<Self> {
        let workers = opts.workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("rrf-parse-{i}"))
            .build()
            .map_err(|e| RrfError::WorkerPool(e.to_string()))?;
        Ok(RrfParser {
            meta_dir: meta_dir.into(),
            opts: ParseOptions { workers, ..opts },
            pool,
        })
    }

    /// Parse the three snapshot files plus both change files.
    pub fn parse_release(&self) -> Result<ParsedRelease> {
        let (terms, conso_stats) = self.parse_mrconso()?;
        let (rels, rel_stats) = self.parse_mrrel()?;
        let (stys, sty_stats) = self.parse_mrsty()?;
        let deleted_cuis = self.parse_deleted_cuis()?;
        let merges = self.parse_merged_cuis()?;

        let mut stats = conso_stats;
        stats.absorb(rel_stats);
        stats.absorb(sty_stats);
        Ok(ParsedRelease {
            terms,
            rels,
            stys,
            deleted_cuis,
            merges,
            stats,
        })
    }

    pub fn parse_mrconso(&self) -> Result<(Vec<TermRow>, FileStats)> {
        let filter = self.opts.filter.clone();
        self.parse_file(MRCONSO, move |line| parse_conso_line(line, &filter))
    }

    pub fn parse_mrrel(&self) -> Result<(Vec<RelRow>, FileStats)> {
        let filter = self.opts.filter.clone();
        self.parse_file(MRREL, move |line| parse_rel_line(line, &filter))
    }

    pub fn parse_mrsty(&self) -> Result<(Vec<StyRow>, FileStats)> {
        self.parse_file(MRSTY, parse_sty_line)
    }

    /// CUIs retired in this release. A missing DELETEDCUI.RRF is an empty
    /// delta, not an error.
    pub fn parse_deleted_cuis(&self) -> Result<Vec<String>> {
        self.parse_change_file(DELETEDCUI, parse_deleted_cui_line)
    }

    /// CUI merges announced in this release; missing file means none.
    pub fn parse_merged_cuis(&self) -> Result<Vec<MergePair>> {
        self.parse_change_file(MERGEDCUI, parse_merged_cui_line)
    }

    /// Chunk `name`, parse the chunks on the worker pool, and concatenate
    /// results in chunk order so downstream tie-breaks are deterministic.
    fn parse_file<T, F>(&self, name: &str, parse: F) -> Result<(Vec<T>, FileStats)>
    where
        T: Send,
        F: Fn(&str) -> RowOutcome<T> + Sync,
    {
        let path = self.meta_dir.join(name);
        if !path.is_file() {
            return Err(RrfError::FileNotFound(path));
        }
        let ranges = line_aligned_chunks(&path, self.opts.workers * CHUNKS_PER_WORKER)
            .map_err(|e| RrfError::io(&path, e))?;
        debug!(file = name, chunks = ranges.len(), workers = self.opts.workers, "parsing");

        let chunk_results: std::io::Result<Vec<(Vec<T>, FileStats)>> = self.pool.install(|| {
            ranges
                .par_iter()
                .map(|range| parse_chunk(&path, *range, &parse))
                .collect()
        });
        let chunk_results = chunk_results.map_err(|e| RrfError::io(&path, e))?;

        let mut rows = Vec::new();
        let mut stats = FileStats::default();
        for (chunk_rows, chunk_stats) in chunk_results {
            rows.extend(chunk_rows);
            stats.absorb(chunk_stats);
        }
        if stats.malformed > self.opts.max_malformed_rows {
            return Err(RrfError::MalformedRows {
                path,
                count: stats.malformed,
                threshold: self.opts.max_malformed_rows,
            });
        }
        info!(
            file = name,
            kept = stats.kept,
            filtered = stats.filtered,
            malformed = stats.malformed,
            "parsed"
        );
        Ok((rows, stats))
    }

    fn parse_change_file<T, F>(&self, name: &str, parse: F) -> Result<Vec<T>>
    where
        F: Fn(&str) -> Option<T>,
    {
        let path = self.meta_dir.join(name);
        if !path.is_file() {
            warn!(file = name, "change file not found, treating as empty");
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&path).map_err(|e| RrfError::io(&path, e))?);
        let mut rows = Vec::new();
        for line in reader.split(b'\n') {
            let line = line.map_err(|e| RrfError::io(&path, e))?;
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if let Some(row) = parse(line) {
                rows.push(row);
            }
        }
        info!(file = name, rows = rows.len(), "parsed change file");
        Ok(rows)
    }
}

/// Parse one byte range of `path`. Each worker opens its own read-only
/// handle; ranges are line-aligned so every read line is a whole row.
fn parse_chunk<T, F>(
    path: &Path,
    range: ByteRange,
    parse: &F,
) -> std::io::Result<(Vec<T>, FileStats)>
where
    F: Fn(&str) -> RowOutcome<T>,
{
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(range.start))?;
    let mut reader = BufReader::new(file.take(range.len()));

    let mut rows = Vec::new();
    let mut stats = FileStats::default();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }
        match parse(line) {
            RowOutcome::Kept(row) => {
                rows.push(row);
                stats.kept += 1;
            }
            RowOutcome::Filtered => stats.filtered += 1,
            RowOutcome::Malformed => stats.malformed += 1,
        }
    }
    Ok((rows, stats))
}
