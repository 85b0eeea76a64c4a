//! Run summary: what happened to every organization and repository

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::core::config::{
    ERROR_MESSAGE_MAX_LENGTH, ERROR_MESSAGE_TRUNCATE_LENGTH, PATH_DISPLAY_WIDTH,
};
use crate::core::outcome::Outcome;

/// Outcome of one repository in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoReport {
    pub organization: String,
    pub name: String,
    pub clone_url: String,
    pub path: PathBuf,
    pub outcome: Outcome,
}

/// An organization that could not be resolved, listed or prepared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgFailure {
    pub name: String,
    pub reason: String,
}

/// Aggregated result of a backup run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub duration: Duration,
    pub accessed_organizations: Vec<String>,
    pub failed_organizations: Vec<OrgFailure>,
    pub repositories: Vec<RepoReport>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            duration: Duration::ZERO,
            accessed_organizations: Vec::new(),
            failed_organizations: Vec::new(),
            repositories: Vec::new(),
        }
    }

    pub fn record_organization(&mut self, login: &str) {
        self.accessed_organizations.push(login.to_string());
    }

    pub fn record_organization_failure(&mut self, name: &str, reason: impl Into<String>) {
        self.failed_organizations.push(OrgFailure {
            name: name.to_string(),
            reason: reason.into(),
        });
    }

    pub fn record_repository(&mut self, report: RepoReport) {
        self.repositories.push(report);
    }

    pub fn cloned_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Cloned))
    }

    pub fn updated_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Updated))
    }

    pub fn failed_count(&self) -> usize {
        self.count(Outcome::is_failure)
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.repositories
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }

    /// Looks up the outcome of `organization/repository`
    pub fn outcome_for(&self, organization: &str, repository: &str) -> Option<&Outcome> {
        self.repositories
            .iter()
            .find(|report| report.organization == organization && report.name == repository)
            .map(|report| &report.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RepoReport> {
        self.repositories
            .iter()
            .filter(|report| report.outcome.is_failure())
    }

    /// Generates the one-line completion summary
    pub fn generate_summary(&self) -> String {
        let mut summary = format!(
            "Backup process completed in {:.1}s • {} cloned • {} updated • {} failed",
            self.duration.as_secs_f64(),
            self.cloned_count(),
            self.updated_count(),
            self.failed_count()
        );

        if !self.failed_organizations.is_empty() {
            summary.push_str(&format!(
                " • {} organizations unavailable",
                self.failed_organizations.len()
            ));
        }

        summary
    }

    /// Generates the listing of everything that failed, one entry per line
    pub fn generate_detailed_summary(&self) -> String {
        let mut lines = Vec::new();

        if !self.failed_organizations.is_empty() {
            lines.push(format!(
                "🟠 FAILED ORGANIZATIONS ({})",
                self.failed_organizations.len()
            ));
            for (i, failure) in self.failed_organizations.iter().enumerate() {
                let tree_char = if i == self.failed_organizations.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                lines.push(format!(
                    "   {} {:20} # {}",
                    tree_char,
                    failure.name,
                    clean_error_message(&failure.reason)
                ));
            }
            lines.push(String::new()); // Add blank line
        }

        let failed: Vec<&RepoReport> = self.failures().collect();
        if !failed.is_empty() {
            lines.push(format!("🔴 FAILED REPOS ({})", failed.len()));
            for (i, report) in failed.iter().enumerate() {
                let tree_char = if i == failed.len() - 1 { "└─" } else { "├─" };
                let short_path = crate::utils::shorten_path(
                    &report.path.to_string_lossy(),
                    PATH_DISPLAY_WIDTH,
                );
                lines.push(format!(
                    "   {} {:20} {:30} # {}",
                    tree_char,
                    format!("{}/{}", report.organization, report.name),
                    short_path,
                    clean_error_message(report.outcome.reason().unwrap_or_default())
                ));
            }
        }

        // Remove trailing blank line if it exists
        if lines.last() == Some(&String::new()) {
            lines.pop();
        }

        lines.join("\n")
    }
}

/// Locks a shared summary, recovering the data if another task panicked
pub(crate) fn acquire_stats_lock<T>(stats: &Mutex<T>) -> MutexGuard<'_, T> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cleans and formats error messages for display
pub fn clean_error_message(error: &str) -> String {
    // Replace newlines/tabs with spaces and collapse whitespace
    let cleaned = error.split_whitespace().collect::<Vec<_>>().join(" ");
    let lower = cleaned.to_lowercase();

    // Extract key error patterns
    if lower.contains("timed out") {
        "timeout".to_string()
    } else if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("permission denied (publickey)")
    {
        "authentication failed".to_string()
    } else if lower.contains("repository not found")
        || lower.contains("does not appear to be a git repository")
    {
        "repository not found".to_string()
    } else if lower.contains("not possible to fast-forward") || lower.contains("diverged") {
        "diverged history".to_string()
    } else if lower.contains("could not resolve host") || lower.contains("connection") {
        "network error".to_string()
    } else if lower.contains("rate limit") {
        "rate limited".to_string()
    } else if cleaned.chars().count() > ERROR_MESSAGE_MAX_LENGTH {
        // Truncate long messages
        let truncated: String = cleaned.chars().take(ERROR_MESSAGE_TRUNCATE_LENGTH).collect();
        format!("{truncated}...")
    } else {
        cleaned
    }
}
