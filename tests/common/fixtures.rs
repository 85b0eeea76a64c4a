//! Test fixtures and builders

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use org_backup::remote::{DirectoryClient, Organization, RepositoryDescriptor};

use super::git::{create_test_commit, setup_git_repo};

/// A local repository standing in for a remote one
pub struct UpstreamRepo {
    pub name: String,
    pub path: PathBuf,
}

impl UpstreamRepo {
    /// Creates `<parent>/<name>` with a single commit
    pub fn create(parent: &Path, name: &str) -> Result<Self> {
        let path = parent.join(name);
        std::fs::create_dir_all(&path)?;
        setup_git_repo(&path)?;
        create_test_commit(&path, "README.md", &format!("# {name}"), "Initial commit")?;

        Ok(Self {
            name: name.to_string(),
            path,
        })
    }

    /// The URL to clone this repository from
    pub fn url(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    pub fn descriptor(&self) -> RepositoryDescriptor {
        RepositoryDescriptor::new(self.name.clone(), self.url())
    }

    /// Adds a commit on the checked-out branch
    pub fn commit(&self, file_name: &str, content: &str) -> Result<()> {
        create_test_commit(&self.path, file_name, content, &format!("Update {file_name}"))
    }
}

/// In-memory directory of organizations
#[derive(Default)]
pub struct FakeDirectory {
    organizations: HashMap<String, Vec<RepositoryDescriptor>>,
    unlistable: HashSet<String>,
    resolve_calls: Mutex<Vec<String>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_organization(
        mut self,
        name: &str,
        repositories: Vec<RepositoryDescriptor>,
    ) -> Self {
        self.organizations.insert(name.to_string(), repositories);
        self
    }

    /// An organization that resolves but whose repository listing fails
    pub fn with_unlistable_organization(mut self, name: &str) -> Self {
        self.organizations.insert(name.to_string(), Vec::new());
        self.unlistable.insert(name.to_string());
        self
    }

    pub fn resolve_calls(&self) -> Vec<String> {
        self.resolve_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectory {
    async fn resolve_organization(&self, name: &str) -> Result<Organization> {
        self.resolve_calls.lock().unwrap().push(name.to_string());
        if self.organizations.contains_key(name) {
            Ok(Organization::new(name))
        } else {
            Err(anyhow!("GitHub API returned 404 Not Found: Not Found"))
        }
    }

    async fn list_organization_repositories(
        &self,
        organization: &Organization,
    ) -> Result<Vec<RepositoryDescriptor>> {
        if self.unlistable.contains(&organization.login) {
            return Err(anyhow!("GitHub API returned 502 Bad Gateway"));
        }
        self.organizations
            .get(&organization.login)
            .cloned()
            .ok_or_else(|| anyhow!("unknown organization {}", organization.login))
    }
}
