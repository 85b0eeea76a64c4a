pub mod operations;
pub mod vcs;

// Re-export commonly used items
pub use operations::{run_git, same_remote_url};
pub use vcs::{
    GitCli, LocalClone, OpenError, PullChange, VersionControl, DEFAULT_GIT_TIMEOUT_SECS,
};
