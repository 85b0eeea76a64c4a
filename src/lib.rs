//! # org-backup
//!
//! `org-backup` mirrors every repository of a set of GitHub organizations
//! into a local directory tree. It powers the `org-backup` CLI tool.
//!
//! ## Core Features
//!
//! - **Clone or update**: missing repositories are cloned, existing clones are fast-forwarded.
//! - **Failure isolation**: an organization or repository that fails is logged and skipped.
//! - **Bounded parallelism**: optional concurrent syncing within an organization.
//! - **Dual logging**: timestamped log lines on stdout and in a log file.
//!
//! ## Example
//!
//! ```rust,no_run
//! use org_backup::core::{Orchestrator, Reporter, SyncEngine};
//! use org_backup::git::GitCli;
//! use org_backup::remote::GithubClient;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reporter = Reporter::new(Path::new("backup.log"), false)?;
//!     let client = GithubClient::new("ghp_token", "https://api.github.com")?;
//!     let engine = SyncEngine::new(GitCli::default(), reporter.clone());
//!     let summary = Orchestrator::new(client, engine, reporter)
//!         .run(&["acme".to_string()], Path::new("backups"))
//!         .await?;
//!     println!("{}", summary.generate_summary());
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod core;
pub mod git;
pub mod remote;
pub mod utils;
