//! org-backup: mirror every repository of a set of GitHub organizations
//! Clones repositories that are missing locally and fast-forwards the rest.

use anyhow::Result;
use clap::Parser;

use org_backup::commands::{handle_backup_command, BackupArgs};

#[derive(Parser)]
#[command(name = "org-backup", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    backup: BackupArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Per-repository failures are logged; only startup problems fail the process
    handle_backup_command(cli.backup).await?;

    Ok(())
}
