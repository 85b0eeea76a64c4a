//! Basic git operations and command execution

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

// Git command arguments
const GIT_SHOW_TOPLEVEL_ARGS: &[&str] = &["rev-parse", "--show-toplevel"];
const GIT_ORIGIN_URL_ARGS: &[&str] = &["remote", "get-url", "origin"];
const GIT_SYMBOLIC_HEAD_ARGS: &[&str] = &["symbolic-ref", "--quiet", "--short", "HEAD"];
const GIT_HEAD_COMMIT_ARGS: &[&str] = &["rev-parse", "--verify", "--quiet", "HEAD"];
const GIT_PULL_FF_ONLY_ARGS: &[&str] = &["pull", "--ff-only", "--quiet", "origin"];

/// Runs a git command in the specified directory with a timeout
/// Returns (success, stdout, stderr)
///
/// Credential prompts are disabled so an authentication failure surfaces as
/// an error instead of waiting on a terminal that nobody is watching. A git
/// process that overruns the timeout is killed and reaped before returning.
pub async fn run_git<S: AsRef<OsStr>>(
    path: &Path,
    args: &[S],
    timeout: Duration,
) -> Result<(bool, String, String)> {
    let mut child = Command::new("git")
        .args(args)
        .current_dir(path)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("failed to launch git")?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let result = tokio::time::timeout(timeout, async {
        tokio::try_join!(
            child.wait(),
            read_pipe(stdout_pipe.as_mut(), &mut stdout),
            read_pipe(stderr_pipe.as_mut(), &mut stderr)
        )
    })
    .await;

    match result {
        Ok(Ok((status, _, _))) => Ok((
            status.success(),
            String::from_utf8_lossy(&stdout).trim().to_string(),
            String::from_utf8_lossy(&stderr).trim().to_string(),
        )),
        Ok(Err(e)) => Err(e).context("failed to run git"),
        Err(_) => {
            // Already-exited children make kill fail; either way it is gone
            let _ = child.kill().await;
            Err(anyhow::anyhow!(
                "Git operation timed out after {} seconds",
                timeout.as_secs()
            ))
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(
    pipe: Option<&mut R>,
    buf: &mut Vec<u8>,
) -> io::Result<()> {
    if let Some(pipe) = pipe {
        pipe.read_to_end(buf).await?;
    }
    Ok(())
}

/// Turns a failed git invocation into an error carrying its stderr
fn command_failure(operation: &str, stderr: &str) -> anyhow::Error {
    if stderr.is_empty() {
        anyhow::anyhow!("git {operation} failed")
    } else {
        anyhow::anyhow!("git {operation} failed: {stderr}")
    }
}

/// Clones `url` into `target`, which must not exist yet
///
/// The clone runs from the parent directory of `target`; the parent has to
/// exist beforehand.
pub async fn clone_repository(url: &str, target: &Path, timeout: Duration) -> Result<()> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let args: [&OsStr; 5] = [
        OsStr::new("clone"),
        OsStr::new("--quiet"),
        OsStr::new("--"),
        OsStr::new(url),
        target.as_os_str(),
    ];

    match run_git(parent, &args, timeout).await? {
        (true, _, _) => Ok(()),
        (false, _, stderr) => Err(command_failure("clone", &stderr)),
    }
}

/// Returns the canonical top level of the work tree containing `path`
pub async fn show_toplevel(path: &Path, timeout: Duration) -> Result<Option<String>> {
    match run_git(path, GIT_SHOW_TOPLEVEL_ARGS, timeout).await? {
        (true, toplevel, _) if !toplevel.is_empty() => Ok(Some(toplevel)),
        _ => Ok(None),
    }
}

/// Reads the URL of the `origin` remote
/// Returns None when the repository has no such remote
pub async fn get_origin_url(path: &Path, timeout: Duration) -> Result<Option<String>> {
    match run_git(path, GIT_ORIGIN_URL_ARGS, timeout).await? {
        (true, url, _) if !url.is_empty() => Ok(Some(url)),
        _ => Ok(None),
    }
}

/// Returns the checked-out branch name, or None for a detached HEAD
pub async fn get_current_branch(path: &Path, timeout: Duration) -> Result<Option<String>> {
    match run_git(path, GIT_SYMBOLIC_HEAD_ARGS, timeout).await? {
        (true, branch, _) if !branch.is_empty() => Ok(Some(branch)),
        _ => Ok(None),
    }
}

/// Returns the commit HEAD points at, or None on an unborn branch
pub async fn get_head_commit(path: &Path, timeout: Duration) -> Result<Option<String>> {
    match run_git(path, GIT_HEAD_COMMIT_ARGS, timeout).await? {
        (true, sha, _) if !sha.is_empty() => Ok(Some(sha)),
        _ => Ok(None),
    }
}

/// Fast-forwards the current branch from `origin`
///
/// Refuses to create merge commits: a diverged branch is reported as a
/// failure and left untouched.
pub async fn pull_fast_forward(path: &Path, timeout: Duration) -> Result<()> {
    match run_git(path, GIT_PULL_FF_ONLY_ARGS, timeout).await? {
        (true, _, _) => Ok(()),
        (false, _, stderr) => Err(command_failure("pull", &stderr)),
    }
}

/// Compares two remote URLs, ignoring a trailing slash and `.git` suffix
pub fn same_remote_url(left: &str, right: &str) -> bool {
    fn normalize(url: &str) -> &str {
        let trimmed = url.trim().trim_end_matches('/');
        trimmed.strip_suffix(".git").unwrap_or(trimmed)
    }

    normalize(left) == normalize(right)
}
