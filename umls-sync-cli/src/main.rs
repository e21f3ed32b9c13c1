mod cli;
mod commands;
mod downloader;
mod error;
mod pipeline;

use clap::Parser;
use cli::{Cli, Commands};
use error::exit_with_error;

fn init_tracing(cli: &Cli) {
    // Default to crate-level info so sync progress is visible; --quiet turns
    // it off and --verbose raises it. RUST_LOG overrides everything.
    let default_filter = if cli.quiet {
        "off"
    } else if cli.verbose {
        "umls_sync_cli=debug,umls_sync_rrf=debug,umls_sync_graph=debug,umls_sync_core=debug"
    } else {
        "umls_sync_cli=info,umls_sync_rrf=info,umls_sync_graph=info,umls_sync_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let ansi = !(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        exit_with_error(e);
    }
}

async fn run(cli: Cli) -> error::CliResult<()> {
    match cli.command {
        Commands::FullImport {
            version,
            sab_filter,
            output_dir,
            meta_dir,
        } => {
            commands::full_import::run(
                &version,
                sab_filter.as_deref(),
                output_dir,
                meta_dir,
                cli.quiet,
            )
            .await
        }

        Commands::InitMeta { version } => commands::init_meta::run(&version).await,

        Commands::IncrementalSync {
            version,
            sab_filter,
            batch_size,
            reapply,
            meta_dir,
        } => {
            commands::incremental_sync::run(
                &version,
                sab_filter.as_deref(),
                batch_size,
                reapply,
                meta_dir,
                cli.quiet,
            )
            .await
        }
    }
}
