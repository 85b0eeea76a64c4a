//! Configuration constants and settings

// Concurrency Configuration
//
// Mirroring defaults to one repository at a time. A parallel run clones
// several repositories of the same organization at once, which is bound by
// network and by the host's patience with concurrent git requests.

// Default concurrency cap to prevent overwhelming GitHub's concurrent request limits
pub const GIT_CONCURRENT_CAP: usize = 12;

// Sequential unless the user asks otherwise
pub const DEFAULT_JOBS: usize = 1;

/// Determines the concurrency limit for clone/pull operations
///
/// Priority order:
/// 1. --sequential flag → 1
/// 2. --jobs N flag → N
/// 3. `backup.jobs` from the config file → N
/// 4. Default → 1
///
/// A value of 0 selects an automatic limit of min(CPU_CORES + 2, 12).
pub fn get_git_concurrency(
    jobs: Option<usize>,
    sequential: bool,
    configured: Option<usize>,
) -> usize {
    if sequential {
        return 1;
    }

    match jobs.or(configured).unwrap_or(DEFAULT_JOBS) {
        0 => (num_cpus::get() + 2).min(GIT_CONCURRENT_CAP),
        n => n,
    }
}

// Retry configuration
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

// Display formatting constants
pub const PATH_DISPLAY_WIDTH: usize = 30;
pub const ERROR_MESSAGE_MAX_LENGTH: usize = 60;
pub const ERROR_MESSAGE_TRUNCATE_LENGTH: usize = 57;

// File names
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const APP_DIR_NAME: &str = "org-backup";
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";
