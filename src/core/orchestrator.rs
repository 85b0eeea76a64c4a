//! Drives one backup pass over every configured organization

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::core::engine::SyncEngine;
use crate::core::outcome::Outcome;
use crate::core::paths;
use crate::core::report::Reporter;
use crate::core::stats::{acquire_stats_lock, RepoReport, RunSummary};
use crate::git::VersionControl;
use crate::remote::{DirectoryClient, Organization, RepositoryDescriptor};

/// Conditions that end a run before any repository is processed
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no accessible organizations")]
    NoAccessibleOrganizations,
    #[error("cannot create backup directory {path}: {source}")]
    BackupRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct Orchestrator<C, V> {
    client: C,
    engine: SyncEngine<V>,
    reporter: Reporter,
    jobs: usize,
}

impl<C: DirectoryClient, V: VersionControl> Orchestrator<C, V> {
    pub fn new(client: C, engine: SyncEngine<V>, reporter: Reporter) -> Self {
        Self {
            client,
            engine,
            reporter,
            jobs: 1,
        }
    }

    /// Number of repositories of one organization synced at the same time
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Mirrors every repository of `organizations` under `backup_root`
    pub async fn run(
        &self,
        organizations: &[String],
        backup_root: &Path,
    ) -> Result<RunSummary, RunError> {
        let start_time = Instant::now();
        let mut summary = RunSummary::new();
        self.reporter.info(format!(
            "Backup run started at {}",
            summary.started_at.format("%Y-%m-%d %H:%M:%S")
        ));

        let resolved = self.resolve_organizations(organizations, &mut summary).await;
        if resolved.is_empty() {
            self.reporter
                .error("No valid organizations found. Exiting.");
            return Err(RunError::NoAccessibleOrganizations);
        }

        tokio::fs::create_dir_all(backup_root)
            .await
            .map_err(|source| RunError::BackupRoot {
                path: backup_root.to_path_buf(),
                source,
            })?;
        let display_root = tokio::fs::canonicalize(backup_root)
            .await
            .unwrap_or_else(|_| backup_root.to_path_buf());
        self.reporter.info(format!(
            "Backup directory set to: {}",
            display_root.display()
        ));

        for organization in &resolved {
            self.backup_organization(organization, backup_root, &mut summary)
                .await;
        }

        summary.duration = start_time.elapsed();
        self.reporter.info(summary.generate_summary());
        Ok(summary)
    }

    async fn resolve_organizations(
        &self,
        names: &[String],
        summary: &mut RunSummary,
    ) -> Vec<Organization> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        for name in names {
            if !seen.insert(name.to_lowercase()) {
                self.reporter
                    .warn(format!("Organization listed more than once: {name}"));
                continue;
            }

            match self.client.resolve_organization(name).await {
                Ok(organization) => {
                    self.reporter
                        .info(format!("Accessed organization: {name}"));
                    summary.record_organization(&organization.login);
                    resolved.push(organization);
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    self.reporter
                        .error(format!("Failed to access organization '{name}': {reason}"));
                    summary.record_organization_failure(name, reason);
                }
            }
        }

        resolved
    }

    async fn backup_organization(
        &self,
        organization: &Organization,
        backup_root: &Path,
        summary: &mut RunSummary,
    ) {
        let login = organization.login.as_str();

        let repositories = match self.client.list_organization_repositories(organization).await {
            Ok(repositories) => {
                self.reporter.info(format!(
                    "Retrieved {} repositories from organization '{login}'.",
                    repositories.len()
                ));
                repositories
            }
            Err(e) => {
                let reason = format!("{e:#}");
                self.reporter.error(format!(
                    "Failed to retrieve repositories for organization '{login}': {reason}"
                ));
                summary.record_organization_failure(login, reason);
                return;
            }
        };

        let org_dir = match paths::organization_dir(backup_root, login) {
            Ok(dir) => dir,
            Err(e) => {
                self.reporter
                    .error(format!("Skipping organization '{login}': {e}"));
                summary.record_organization_failure(login, e.to_string());
                return;
            }
        };
        if let Err(e) = tokio::fs::create_dir_all(&org_dir).await {
            let reason = format!("cannot create {}: {e}", org_dir.display());
            self.reporter
                .error(format!("Skipping organization '{login}': {reason}"));
            summary.record_organization_failure(login, reason);
            return;
        }

        let (runnable, rejected) = plan_repositories(backup_root, login, repositories);
        for report in rejected {
            self.reporter.error(format!(
                "Skipping repository '{login}/{}': {}",
                report.name,
                report.outcome.reason().unwrap_or_default()
            ));
            summary.record_repository(report);
        }

        let reports = if self.jobs == 1 {
            self.sync_sequential(login, runnable).await
        } else {
            self.sync_parallel(login, runnable).await
        };
        for report in reports {
            summary.record_repository(report);
        }
    }

    async fn sync_sequential(
        &self,
        login: &str,
        repositories: Vec<(RepositoryDescriptor, PathBuf)>,
    ) -> Vec<RepoReport> {
        let mut reports = Vec::with_capacity(repositories.len());
        for (repository, path) in repositories {
            let outcome = self
                .engine
                .sync_repository(&repository.clone_url, &path)
                .await;
            reports.push(repo_report(login, repository, path, outcome));
        }
        reports
    }

    /// Processes repositories concurrently, at most `jobs` at a time
    async fn sync_parallel(
        &self,
        login: &str,
        repositories: Vec<(RepositoryDescriptor, PathBuf)>,
    ) -> Vec<RepoReport> {
        let semaphore = Semaphore::new(self.jobs);
        let collected = Mutex::new(Vec::with_capacity(repositories.len()));

        let mut futures = FuturesUnordered::new();
        for (repository, path) in repositories {
            let semaphore = &semaphore;
            let collected = &collected;
            futures.push(async move {
                let outcome = match semaphore.acquire().await {
                    Ok(_permit) => {
                        self.engine
                            .sync_repository(&repository.clone_url, &path)
                            .await
                    }
                    Err(e) => Outcome::Failed(format!("semaphore error: {e}")),
                };
                let report = repo_report(login, repository, path, outcome);
                acquire_stats_lock(collected).push(report);
            });
        }

        // Wait for all repository operations to complete
        while futures.next().await.is_some() {}
        drop(futures);

        collected
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn repo_report(
    login: &str,
    repository: RepositoryDescriptor,
    path: PathBuf,
    outcome: Outcome,
) -> RepoReport {
    RepoReport {
        organization: login.to_string(),
        name: repository.name,
        clone_url: repository.clone_url,
        path,
        outcome,
    }
}

/// Resolves local paths, splitting off names that cannot be synced
///
/// A repository whose name is unsafe, or whose path collides with one that
/// came earlier in the listing, is returned as a failed report.
fn plan_repositories(
    backup_root: &Path,
    login: &str,
    repositories: Vec<RepositoryDescriptor>,
) -> (Vec<(RepositoryDescriptor, PathBuf)>, Vec<RepoReport>) {
    let mut runnable = Vec::with_capacity(repositories.len());
    let mut rejected = Vec::new();
    // Case-insensitive so that mirrors on macOS/Windows never share a directory
    let mut claimed = HashSet::new();

    for repository in repositories {
        match paths::resolve(backup_root, login, &repository.name) {
            Ok(path) if claimed.insert(repository.name.to_lowercase()) => {
                runnable.push((repository, path));
            }
            Ok(path) => {
                let outcome = Outcome::failed(format!(
                    "duplicate repository name; {} is already used in this run",
                    path.display()
                ));
                rejected.push(repo_report(login, repository, path, outcome));
            }
            Err(e) => {
                let path = backup_root.join(login);
                let outcome = Outcome::failed(e.to_string());
                rejected.push(repo_report(login, repository, path, outcome));
            }
        }
    }

    (runnable, rejected)
}
