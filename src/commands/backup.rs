//! Backup command implementation
//!
//! Loads the configuration, wires the reporter, GitHub client and git
//! backend together, and runs one mirroring pass.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::core::{
    get_git_concurrency, Orchestrator, Reporter, RunSummary, Settings, SyncEngine, SyncOptions,
};
use crate::git::GitCli;
use crate::remote::GithubClient;

#[derive(Debug, Clone, Default, Args)]
pub struct BackupArgs {
    /// Configuration file (default: ./config.toml, then the user config directory)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of repositories to sync concurrently (0 = automatic)
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Sync one repository at a time
    #[arg(long, conflicts_with = "jobs")]
    pub sequential: bool,

    /// Re-clone local directories that are not a clone of the expected remote
    #[arg(long)]
    pub reclone_invalid: bool,

    /// Log git details
    #[arg(short, long)]
    pub verbose: bool,
}

/// Handles the backup command
///
/// Configuration and startup problems, and a run without a single
/// accessible organization, are returned as errors. Repository failures are
/// part of the returned summary.
pub async fn handle_backup_command(args: BackupArgs) -> Result<RunSummary> {
    let settings = Settings::load(args.config.as_deref())?;
    let reporter = Reporter::new(&settings.log_file, args.verbose)?;

    let concurrent_limit = get_git_concurrency(args.jobs, args.sequential, settings.jobs);
    let options = SyncOptions {
        reclone_invalid: settings.reclone_invalid || args.reclone_invalid,
        retries: settings.retries,
        ..SyncOptions::default()
    };

    let client = GithubClient::new(&settings.token, &settings.api_url)?;
    let engine =
        SyncEngine::new(GitCli::new(settings.git_timeout), reporter.clone()).with_options(options);
    let orchestrator =
        Orchestrator::new(client, engine, reporter.clone()).with_jobs(concurrent_limit);

    let organization_word = if settings.organizations.len() == 1 {
        "organization"
    } else {
        "organizations"
    };
    reporter.info(format!(
        "Backing up {} {organization_word} ({concurrent_limit} concurrent)",
        settings.organizations.len()
    ));

    let summary = orchestrator
        .run(&settings.organizations, &settings.destination_path)
        .await?;

    let detailed_summary = summary.generate_detailed_summary();
    for line in detailed_summary.lines().filter(|line| !line.is_empty()) {
        reporter.warn(line);
    }

    Ok(summary)
}
