//! Public API for the core module.
//!
//! This module provides the stable public API for core functionality including:
//! - The clone-or-update sync engine
//! - Run orchestration and its summary
//! - Mirror path resolution
//! - Configuration loading and the run reporter

// Sync engine
pub use super::engine::{is_transient_failure, SyncEngine, SyncOptions};
pub use super::outcome::Outcome;

// Orchestration
pub use super::orchestrator::{Orchestrator, RunError};
pub use super::stats::{clean_error_message, OrgFailure, RepoReport, RunSummary};

// Path resolution
pub use super::paths::{organization_dir, resolve, PathError};

// Configuration
pub use super::config::{get_git_concurrency, GIT_CONCURRENT_CAP};
pub use super::settings::{default_config_path, ConfigError, Settings};

// Logging
pub use super::report::Reporter;
