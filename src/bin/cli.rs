//! Curator CLI
//!
//! Syncs one configured source per invocation. Meant to be run from cron.
//!
//! Exit codes: 0 success, 1 some items failed, 2 fatal error, 3 another run
//! holds the lock.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use curator::{
    error::Result,
    models::{Config, SourceConfig, expand_home},
    pipeline::{self, RetryPolicy, SyncEngine, SyncOptions},
    services::{DuplicateResolver, JiraClient, TicketService},
    sources::{SourceInputs, build_source},
    storage::{LocalArchive, RunLock, StateStore},
    utils::console,
};

/// Curator - article-to-ticket sync
#[derive(Parser, Debug)]
#[command(
    name = "curator",
    version,
    about = "Sync curated articles into review tickets without duplicates"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "curator.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a source and create tickets for new articles
    Sync {
        /// Source name from the configuration
        source: String,

        /// Report what would be created without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Re-check already-seen items against the tracker
        #[arg(long)]
        backfill: bool,

        /// Input file for email and scraped sources
        #[arg(long)]
        input: Option<PathBuf>,

        /// Directory with PDF captures for email digests
        #[arg(long)]
        attachments: Option<PathBuf>,

        /// Write the run report as JSON
        #[arg(long)]
        output_json: Option<PathBuf>,
    },

    /// Normalize the keys of an existing state file
    Migrate {
        source: String,

        /// Only report what would change
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Show state for a source
    Info { source: String },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => exit_code(code),
        Err(e) => {
            log::error!("{e}");
            exit_code(e.exit_code())
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::load_or_default(&cli.config);
    log::debug!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Sync {
            source,
            dry_run,
            backfill,
            input,
            attachments,
            output_json,
        } => {
            config.validate()?;
            let source_config = config.source(&source)?;
            let inputs = SourceInputs { input, attachments };
            sync(&config, source_config, inputs, dry_run, backfill, output_json.as_deref()).await
        }

        Command::Migrate { source, dry_run } => {
            let state_path = config.state_path(config.source(&source)?);
            let _lock = RunLock::acquire(&state_path)?;
            let store = StateStore::new(&state_path);
            let report = pipeline::run_migration(&store, dry_run).await?;
            report.print_summary(&state_path.display().to_string(), dry_run);
            Ok(0)
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            config.validate()?;
            log::info!(
                "✓ Config OK ({} source(s), project {})",
                config.sources.len(),
                config.jira.project
            );
            Ok(0)
        }

        Command::Info { source } => {
            let source_config = config.source(&source)?;
            let state_path = config.state_path(source_config);
            let state = StateStore::new(&state_path).load().await?;
            let last_sync = state
                .last_sync_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());

            console::summary(
                source_config.display_name(),
                &[
                    ("State file", state_path.display().to_string()),
                    ("Seen", state.seen_identities.len().to_string()),
                    ("Mapped", state.identity_to_ticket.len().to_string()),
                    ("Created", state.created_tickets.len().to_string()),
                    ("Last sync", last_sync),
                ],
            );
            Ok(0)
        }
    }
}

async fn sync(
    config: &Config,
    source_config: &SourceConfig,
    inputs: SourceInputs,
    dry_run: bool,
    backfill: bool,
    output_json: Option<&Path>,
) -> Result<i32> {
    let state_path = config.state_path(source_config);
    let _lock = RunLock::acquire(&state_path)?;

    let source = build_source(source_config, &config.http, inputs)?;
    let token = config.jira.token()?;
    let tickets: Arc<dyn TicketService> =
        Arc::new(JiraClient::new(&config.jira, &config.http, token)?);

    let policy = RetryPolicy::from_config(&config.retry);
    let resolver = DuplicateResolver::new(
        Arc::clone(&tickets),
        policy.clone(),
        config.jira.project.clone(),
        source_config.label.clone(),
        config.sync.search_window_days,
    );
    let options = SyncOptions {
        dry_run,
        backfill,
        ..SyncOptions::for_source(config, source_config)
    };

    let mut engine = SyncEngine::new(
        StateStore::new(&state_path),
        tickets,
        resolver,
        policy,
        options,
    );
    if let Some(root) = &config.archive.root {
        let mut archive = LocalArchive::new(expand_home(root));
        if let Some(base) = &config.archive.link_base {
            archive = archive.with_link_base(base.clone());
        }
        engine = engine.with_file_storage(Arc::new(archive));
    }

    let report = engine.run(source.as_ref()).await?;
    report.print_summary();

    if let Some(path) = output_json {
        if let Err(e) = report.write_json(path).await {
            log::warn!("Could not write run metadata: {e}");
        }
    }

    if report.failed() > 0 {
        log::warn!(
            "{} item(s) failed and will be retried next run",
            report.failed()
        );
    }
    Ok(report.exit_code())
}
