//! Remote directory of organizations and their repositories

use anyhow::Result;
use async_trait::async_trait;

pub mod github;

pub use github::{GithubClient, DEFAULT_API_URL};

/// An organization on the hosting service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    /// Canonical login as reported by the remote; used as a path segment
    pub login: String,
}

impl Organization {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
        }
    }
}

/// A repository owned by an organization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    pub name: String,
    pub clone_url: String,
}

impl RepositoryDescriptor {
    pub fn new(name: impl Into<String>, clone_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clone_url: clone_url.into(),
        }
    }
}

/// Lists organizations and the repositories they own
///
/// Implementations return complete listings; pagination is their concern.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn resolve_organization(&self, name: &str) -> Result<Organization>;

    async fn list_organization_repositories(
        &self,
        organization: &Organization,
    ) -> Result<Vec<RepositoryDescriptor>>;
}
