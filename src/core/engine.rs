//! Clone-or-update decision for a single repository
//!
//! The engine looks at the filesystem only: an absent path is cloned, a
//! present one is opened and fast-forwarded. Every failure, including a
//! panic inside the version-control backend, ends up as
//! [`Outcome::Failed`] so the caller can move on to the next repository.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::io::ErrorKind;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::Duration;

use crate::core::config::DEFAULT_RETRY_DELAY_SECS;
use crate::core::outcome::Outcome;
use crate::core::report::Reporter;
use crate::git::{same_remote_url, LocalClone, PullChange, VersionControl};

// Abbreviated commit length in log lines
const SHORT_SHA_LEN: usize = 7;

/// Tunables for [`SyncEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Replace an existing path that is not a matching clone
    pub reclone_invalid: bool,
    /// Extra attempts for failures that look transient
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            reclone_invalid: false,
            retries: 0,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

pub struct SyncEngine<V> {
    vcs: V,
    reporter: Reporter,
    options: SyncOptions,
}

impl<V: VersionControl> SyncEngine<V> {
    pub fn new(vcs: V, reporter: Reporter) -> Self {
        Self {
            vcs,
            reporter,
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn version_control(&self) -> &V {
        &self.vcs
    }

    /// Clones `clone_url` into `local_path` if absent, otherwise pulls it
    pub async fn sync_repository(&self, clone_url: &str, local_path: &Path) -> Outcome {
        match AssertUnwindSafe(self.try_sync(clone_url, local_path))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = format!("unexpected error: {}", panic_message(panic.as_ref()));
                self.reporter
                    .error(format!("Unexpected error with {clone_url}: {reason}"));
                Outcome::Failed(reason)
            }
        }
    }

    async fn try_sync(&self, clone_url: &str, local_path: &Path) -> Outcome {
        match tokio::fs::symlink_metadata(local_path).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return self.clone(clone_url, local_path).await;
            }
            Err(e) => {
                let reason = format!("cannot inspect {}: {e}", local_path.display());
                self.reporter
                    .error(format!("Unexpected error with {clone_url}: {reason}"));
                return Outcome::Failed(reason);
            }
            Ok(_) => {}
        }

        let local = match self.vcs.open_local(local_path).await {
            Ok(local)
                if self.options.reclone_invalid
                    && !same_remote_url(&local.origin_url, clone_url) =>
            {
                let reason = format!("origin points at {}", local.origin_url);
                return self.reclone(clone_url, local_path, &reason).await;
            }
            Ok(local) => local,
            Err(e) if self.options.reclone_invalid && e.is_replaceable() => {
                return self.reclone(clone_url, local_path, &format!("{e:#}")).await;
            }
            Err(e) => {
                let reason = format!("{e:#}");
                self.reporter
                    .error(format!("Failed to pull updates for {clone_url}: {reason}"));
                return Outcome::Failed(reason);
            }
        };

        self.update(clone_url, &local).await
    }

    async fn clone(&self, clone_url: &str, local_path: &Path) -> Outcome {
        self.reporter.info(format!(
            "Cloning repository: {clone_url} into {}",
            local_path.display()
        ));

        // A failed attempt may leave a half-written work tree behind, which
        // has to go before the next attempt or the next run
        let result = self
            .with_retry("Clone of", clone_url, || async move {
                let error = match self.vcs.clone_to(clone_url, local_path).await {
                    Ok(()) => return Ok(()),
                    Err(error) => error,
                };
                match remove_path(local_path).await {
                    Ok(()) => Err(error),
                    Err(e) => {
                        self.reporter
                            .warn(format!("Clone of {clone_url} failed: {error:#}"));
                        Err(anyhow::anyhow!(
                            "cannot remove partial clone at {}: {e}",
                            local_path.display()
                        ))
                    }
                }
            })
            .await;

        match result {
            Ok(()) => {
                self.reporter
                    .info(format!("Successfully cloned: {clone_url}"));
                Outcome::Cloned
            }
            Err(e) => {
                let reason = format!("{e:#}");
                self.reporter
                    .error(format!("Failed to clone {clone_url}: {reason}"));
                Outcome::Failed(reason)
            }
        }
    }

    async fn reclone(&self, clone_url: &str, local_path: &Path, reason: &str) -> Outcome {
        self.reporter.warn(format!(
            "Replacing invalid clone at {}: {reason}",
            local_path.display()
        ));

        if let Err(e) = remove_path(local_path).await {
            let reason = format!("cannot remove {}: {e}", local_path.display());
            self.reporter
                .error(format!("Unexpected error with {clone_url}: {reason}"));
            return Outcome::Failed(reason);
        }

        self.clone(clone_url, local_path).await
    }

    async fn update(&self, clone_url: &str, local: &LocalClone) -> Outcome {
        self.reporter.info(format!(
            "Pulling latest changes for repository: {clone_url}"
        ));
        self.reporter.debug(format!(
            "{}: branch {} from {}",
            local.path.display(),
            local.branch,
            local.origin_url
        ));

        let result = self
            .with_retry("Pull of", clone_url, || self.vcs.pull(local))
            .await;

        match result {
            Ok(change) => {
                let detail = match change {
                    PullChange::UpToDate => "already up to date".to_string(),
                    PullChange::FastForwarded { from, to } => format!(
                        "{}..{}",
                        from.as_deref().map(short_sha).unwrap_or("(empty)"),
                        short_sha(&to)
                    ),
                };
                self.reporter.info(format!(
                    "Successfully pulled updates for: {clone_url} ({detail})"
                ));
                Outcome::Updated
            }
            Err(e) => {
                let reason = format!("{e:#}");
                self.reporter
                    .error(format!("Failed to pull updates for {clone_url}: {reason}"));
                Outcome::Failed(reason)
            }
        }
    }

    /// Runs `op`, repeating it while it fails transiently and attempts remain
    async fn with_retry<T, F, Fut>(
        &self,
        action: &str,
        clone_url: &str,
        mut op: F,
    ) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e)
                    if attempt < self.options.retries
                        && is_transient_failure(&format!("{e:#}")) =>
                {
                    attempt += 1;
                    self.reporter.warn(format!(
                        "{action} {clone_url} failed ({e:#}); retrying ({attempt}/{})",
                        self.options.retries
                    ));
                    tokio::time::sleep(self.options.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Detects failures that are worth another attempt
pub fn is_transient_failure(error_msg: &str) -> bool {
    const TRANSIENT_PATTERNS: &[&str] = &[
        "timed out",
        "could not resolve host",
        "connection reset",
        "connection refused",
        "failed to connect",
        "the remote end hung up unexpectedly",
        "early eof",
        "rate limit",
        "too many requests",
        "temporarily unavailable",
        "502",
        "503",
        "504",
    ];

    let error_lower = error_msg.to_lowercase();
    TRANSIENT_PATTERNS
        .iter()
        .any(|pattern| error_lower.contains(pattern))
}

/// Removes whatever sits at `path`; an absent path is not an error
async fn remove_path(path: &Path) -> std::io::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..SHORT_SHA_LEN).unwrap_or(sha)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::OpenError;
    use anyhow::{anyhow, bail, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Copy)]
    enum OpenFailure {
        NotARepository,
        DetachedHead,
        Launch,
    }

    /// Scripted backend: each call pops the next scripted error, if any
    #[derive(Default)]
    struct FakeVcs {
        clone_errors: Mutex<VecDeque<String>>,
        /// Failed clones leave a half-written directory, like a killed git
        partial_clones: bool,
        pull_errors: Mutex<VecDeque<String>>,
        open_error: Option<OpenFailure>,
        origin_url: Option<String>,
        panic_on_pull: bool,
        clone_calls: AtomicUsize,
        pull_calls: AtomicUsize,
    }

    impl FakeVcs {
        fn failing_clone(errors: &[&str]) -> Self {
            Self {
                clone_errors: Mutex::new(errors.iter().map(|e| e.to_string()).collect()),
                ..Default::default()
            }
        }

        fn clone_calls(&self) -> usize {
            self.clone_calls.load(Ordering::SeqCst)
        }

        fn pull_calls(&self) -> usize {
            self.pull_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VersionControl for FakeVcs {
        async fn clone_to(&self, _url: &str, path: &Path) -> Result<()> {
            self.clone_calls.fetch_add(1, Ordering::SeqCst);
            if path.exists() {
                bail!("destination path already exists and is not an empty directory");
            }
            if let Some(error) = self.clone_errors.lock().unwrap().pop_front() {
                if self.partial_clones {
                    std::fs::create_dir_all(path.join(".git"))?;
                    std::fs::write(path.join("half-written"), "x")?;
                }
                return Err(anyhow!(error));
            }
            std::fs::create_dir_all(path)?;
            Ok(())
        }

        async fn open_local(&self, path: &Path) -> Result<LocalClone, OpenError> {
            match self.open_error {
                Some(OpenFailure::NotARepository) => {
                    return Err(OpenError::NotARepository(path.to_path_buf()))
                }
                Some(OpenFailure::DetachedHead) => return Err(OpenError::DetachedHead),
                Some(OpenFailure::Launch) => {
                    return Err(OpenError::Git(anyhow!("failed to launch git")))
                }
                None => {}
            }
            Ok(LocalClone {
                path: path.to_path_buf(),
                origin_url: self
                    .origin_url
                    .clone()
                    .unwrap_or_else(|| URL.to_string()),
                branch: "main".to_string(),
            })
        }

        async fn pull(&self, _repo: &LocalClone) -> Result<PullChange> {
            self.pull_calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_pull {
                panic!("index corrupted");
            }
            if let Some(error) = self.pull_errors.lock().unwrap().pop_front() {
                return Err(anyhow!(error));
            }
            Ok(PullChange::UpToDate)
        }
    }

    const URL: &str = "https://github.com/acme/svc-a.git";

    fn engine(vcs: FakeVcs) -> SyncEngine<FakeVcs> {
        SyncEngine::new(vcs, Reporter::silent())
    }

    fn options(reclone_invalid: bool, retries: u32) -> SyncOptions {
        SyncOptions {
            reclone_invalid,
            retries,
            retry_delay: Duration::from_millis(0),
        }
    }

    #[tokio::test]
    async fn test_absent_path_is_cloned() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("svc-a");
        let engine = engine(FakeVcs::default());

        assert_eq!(engine.sync_repository(URL, &target).await, Outcome::Cloned);
        assert!(target.exists());
        assert_eq!(engine.version_control().clone_calls(), 1);
        assert_eq!(engine.version_control().pull_calls(), 0);
    }

    #[tokio::test]
    async fn test_existing_path_is_pulled() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(FakeVcs::default());

        assert_eq!(
            engine.sync_repository(URL, temp_dir.path()).await,
            Outcome::Updated
        );
        assert_eq!(engine.version_control().clone_calls(), 0);
        assert_eq!(engine.version_control().pull_calls(), 1);
    }

    #[tokio::test]
    async fn test_clone_failure_is_not_retried_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("svc-a");
        let engine = engine(FakeVcs::failing_clone(&["Could not resolve host: github.com"]));

        let outcome = engine.sync_repository(URL, &target).await;
        assert_eq!(
            outcome,
            Outcome::failed("Could not resolve host: github.com")
        );
        assert_eq!(engine.version_control().clone_calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_clone_failure_is_retried() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("svc-a");
        let engine = engine(FakeVcs::failing_clone(&["fatal: early EOF"]))
            .with_options(options(false, 2));

        assert_eq!(engine.sync_repository(URL, &target).await, Outcome::Cloned);
        assert_eq!(engine.version_control().clone_calls(), 2);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("svc-a");
        let engine = engine(FakeVcs::failing_clone(&[
            "Connection reset by peer",
            "Connection reset by peer",
            "Connection reset by peer",
            "Connection reset by peer",
        ]))
        .with_options(options(false, 2));

        assert!(engine.sync_repository(URL, &target).await.is_failure());
        assert_eq!(engine.version_control().clone_calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("svc-a");
        let engine = engine(FakeVcs::failing_clone(&["remote: Repository not found."]))
            .with_options(options(false, 3));

        assert!(engine.sync_repository(URL, &target).await.is_failure());
        assert_eq!(engine.version_control().clone_calls(), 1);
    }

    #[tokio::test]
    async fn test_pull_failure_reports_reason() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = FakeVcs {
            pull_errors: Mutex::new(VecDeque::from(vec![
                "fatal: Not possible to fast-forward, aborting.".to_string(),
            ])),
            ..Default::default()
        };
        let engine = engine(vcs);

        let outcome = engine.sync_repository(URL, temp_dir.path()).await;
        assert_eq!(
            outcome.reason(),
            Some("fatal: Not possible to fast-forward, aborting.")
        );
    }

    #[tokio::test]
    async fn test_invalid_clone_fails_without_hardening() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("svc-a");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("partial"), "half a clone").unwrap();

        let vcs = FakeVcs {
            open_error: Some(OpenFailure::NotARepository),
            ..Default::default()
        };
        let engine = engine(vcs);

        let outcome = engine.sync_repository(URL, &target).await;
        assert!(outcome.reason().unwrap().ends_with("is not a git repository"));
        assert_eq!(engine.version_control().clone_calls(), 0);
        assert!(target.join("partial").exists());
    }

    #[tokio::test]
    async fn test_invalid_clone_is_replaced_with_hardening() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("svc-a");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("partial"), "half a clone").unwrap();

        let vcs = FakeVcs {
            open_error: Some(OpenFailure::NotARepository),
            ..Default::default()
        };
        let engine = engine(vcs).with_options(options(true, 0));

        assert_eq!(engine.sync_repository(URL, &target).await, Outcome::Cloned);
        assert_eq!(engine.version_control().clone_calls(), 1);
        assert!(!target.join("partial").exists());
    }

    #[tokio::test]
    async fn test_usable_clone_is_kept_with_hardening() {
        for failure in [OpenFailure::DetachedHead, OpenFailure::Launch] {
            let temp_dir = TempDir::new().unwrap();
            let target = temp_dir.path().join("svc-a");
            std::fs::create_dir(&target).unwrap();
            std::fs::write(target.join("local-notes.txt"), "keep me").unwrap();

            let vcs = FakeVcs {
                open_error: Some(failure),
                ..Default::default()
            };
            let engine = engine(vcs).with_options(options(true, 0));

            assert!(engine.sync_repository(URL, &target).await.is_failure());
            assert_eq!(engine.version_control().clone_calls(), 0);
            assert!(target.join("local-notes.txt").exists());
        }
    }

    #[tokio::test]
    async fn test_partial_clone_is_removed_before_retry() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("svc-a");
        let vcs = FakeVcs {
            partial_clones: true,
            ..FakeVcs::failing_clone(&["Git operation timed out after 600 seconds"])
        };
        let engine = engine(vcs).with_options(options(false, 2));

        assert_eq!(engine.sync_repository(URL, &target).await, Outcome::Cloned);
        assert_eq!(engine.version_control().clone_calls(), 2);
        assert!(!target.join("half-written").exists());
    }

    #[tokio::test]
    async fn test_failed_clone_leaves_path_absent() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("svc-a");
        let vcs = FakeVcs {
            partial_clones: true,
            ..FakeVcs::failing_clone(&["fatal: early EOF"])
        };
        let engine = engine(vcs);

        assert!(engine.sync_repository(URL, &target).await.is_failure());
        assert!(!target.exists());

        // The next run starts from scratch instead of pulling a broken tree
        assert_eq!(engine.sync_repository(URL, &target).await, Outcome::Cloned);
    }

    #[tokio::test]
    async fn test_mismatched_origin_is_replaced_with_hardening() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("svc-a");
        std::fs::create_dir(&target).unwrap();

        let vcs = FakeVcs {
            origin_url: Some("https://github.com/other/svc-a.git".to_string()),
            ..Default::default()
        };
        let engine = engine(vcs).with_options(options(true, 0));

        assert_eq!(engine.sync_repository(URL, &target).await, Outcome::Cloned);
        assert_eq!(engine.version_control().pull_calls(), 0);
    }

    #[tokio::test]
    async fn test_matching_origin_is_pulled_with_hardening() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = FakeVcs {
            origin_url: Some("https://github.com/acme/svc-a".to_string()),
            ..Default::default()
        };
        let engine = engine(vcs).with_options(options(true, 0));

        assert_eq!(
            engine.sync_repository(URL, temp_dir.path()).await,
            Outcome::Updated
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = FakeVcs {
            panic_on_pull: true,
            ..Default::default()
        };
        let engine = engine(vcs);

        let outcome = engine.sync_repository(URL, temp_dir.path()).await;
        assert_eq!(outcome, Outcome::failed("unexpected error: index corrupted"));
    }

    #[test]
    fn test_is_transient_failure() {
        assert!(is_transient_failure("Git operation timed out after 600 seconds"));
        assert!(is_transient_failure(
            "fatal: unable to access: Could not resolve host: github.com"
        ));
        assert!(is_transient_failure("The requested URL returned error: 503"));
        assert!(!is_transient_failure("remote: Repository not found."));
        assert!(!is_transient_failure("fatal: Not possible to fast-forward, aborting."));
    }

    #[test]
    fn test_short_sha() {
        assert_eq!(short_sha("0123456789abcdef"), "0123456");
        assert_eq!(short_sha("abc"), "abc");
    }
}
