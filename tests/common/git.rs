//! Git testing utilities

use anyhow::Result;
use std::path::Path;
use std::process::Command;

/// Sets up a git repository with user config
/// Returns an error if git is not available
pub fn setup_git_repo(path: &Path) -> Result<()> {
    // Initialize git repo
    let init_result = Command::new("git")
        .args(["init"])
        .current_dir(path)
        .output()?;

    if !init_result.status.success() {
        anyhow::bail!("Git not available - skipping test");
    }

    configure_git_user(path)
}

/// Configures a commit identity so tests do not depend on the global config
pub fn configure_git_user(path: &Path) -> Result<()> {
    Command::new("git")
        .args(["config", "user.name", "Test User"])
        .current_dir(path)
        .output()?;

    Command::new("git")
        .args(["config", "user.email", "test@example.com"])
        .current_dir(path)
        .output()?;

    // Disable commit signing for tests
    Command::new("git")
        .args(["config", "commit.gpgsign", "false"])
        .current_dir(path)
        .output()?;

    Ok(())
}

/// Creates a test commit in the repository
pub fn create_test_commit(
    path: &Path,
    file_name: &str,
    content: &str,
    message: &str,
) -> Result<()> {
    // Write file
    std::fs::write(path.join(file_name), content)?;

    // Stage file
    Command::new("git")
        .args(["add", file_name])
        .current_dir(path)
        .output()?;

    // Commit
    let commit_result = Command::new("git")
        .args(["commit", "-m", message])
        .current_dir(path)
        .output()?;

    if !commit_result.status.success() {
        anyhow::bail!(
            "Failed to create commit: {}",
            String::from_utf8_lossy(&commit_result.stderr)
        );
    }

    Ok(())
}

/// Returns the commit HEAD points at
pub fn head_commit(path: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(path)
        .output()?;

    if !output.status.success() {
        anyhow::bail!(
            "Failed to read HEAD: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Returns the URL of the `origin` remote
pub fn origin_url(path: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(path)
        .output()?;

    if !output.status.success() {
        anyhow::bail!("No origin remote in {}", path.display());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Checks out the current commit as a detached HEAD
pub fn detach_head(path: &Path) -> Result<()> {
    let output = Command::new("git")
        .args(["checkout", "--quiet", "--detach"])
        .current_dir(path)
        .output()?;

    if !output.status.success() {
        anyhow::bail!(
            "Failed to detach HEAD: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(())
}

/// Checks if git is available in the system
pub fn is_git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
