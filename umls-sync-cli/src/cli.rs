use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "umls-sync",
    about = "Build and maintain a UMLS labeled property graph in Neo4j",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate bulk-import CSVs and the neo4j-admin invocation for a
    /// one-time initial load
    ///
    /// The command is printed, never executed: stop the target database,
    /// run it manually, then run `init-meta`.
    FullImport {
        /// UMLS release to import (e.g. 2025AA)
        #[arg(long, short = 'V')]
        version: String,

        /// Comma-separated SAB allowlist, overriding the environment.
        /// An empty value keeps every vocabulary.
        #[arg(long)]
        sab_filter: Option<String>,

        /// CSV output directory, overriding PYNEOUMLSSYNCER_NEO4J_IMPORT_DIR
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Use an already-extracted META directory instead of downloading
        #[arg(long)]
        meta_dir: Option<PathBuf>,
    },

    /// Create constraints and the version metadata node after a completed
    /// bulk import
    InitMeta {
        /// UMLS release that was just imported (e.g. 2025AA)
        #[arg(long, short = 'V')]
        version: String,
    },

    /// Synchronize a running database to a new UMLS release (Snapshot-Diff)
    IncrementalSync {
        /// Target UMLS release (e.g. 2025AB)
        #[arg(long, short = 'V')]
        version: String,

        /// Comma-separated SAB allowlist, overriding the environment.
        /// An empty value keeps every vocabulary.
        #[arg(long)]
        sab_filter: Option<String>,

        /// Upsert/sweep batch size, overriding PYNEOUMLSSYNCER_APOC_BATCH_SIZE
        #[arg(long)]
        batch_size: Option<usize>,

        /// Re-run a sync for the version the graph already advertises
        #[arg(long)]
        reapply: bool,

        /// Use an already-extracted META directory instead of downloading
        #[arg(long)]
        meta_dir: Option<PathBuf>,
    },
}
