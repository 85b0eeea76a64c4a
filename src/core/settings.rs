//! Backup configuration file
//!
//! ```toml
//! [github]
//! token = "ghp_..."
//! organizations = ["acme"]
//!
//! [backup]
//! destination_path = "/srv/backups/github"
//! log_file = "/var/log/org-backup.log"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::config::{APP_DIR_NAME, CONFIG_FILE_NAME, TOKEN_ENV_VAR};
use crate::git::DEFAULT_GIT_TIMEOUT_SECS;
use crate::remote::DEFAULT_API_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error parsing configuration file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("GitHub token not provided in configuration (set github.token or GITHUB_TOKEN)")]
    MissingToken,
    #[error("no organizations listed in github.organizations")]
    NoOrganizations,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    github: RawGithub,
    backup: RawBackup,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGithub {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    organizations: Vec<String>,
    #[serde(default)]
    api_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBackup {
    destination_path: PathBuf,
    log_file: PathBuf,
    #[serde(default)]
    jobs: Option<usize>,
    #[serde(default)]
    git_timeout_secs: Option<u64>,
    #[serde(default)]
    retries: Option<u32>,
    #[serde(default)]
    reclone_invalid: bool,
}

/// Validated configuration for a backup run
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub token: String,
    pub organizations: Vec<String>,
    pub api_url: String,
    pub destination_path: PathBuf,
    pub log_file: PathBuf,
    pub jobs: Option<usize>,
    pub git_timeout: Duration,
    pub retries: u32,
    pub reclone_invalid: bool,
}

// Keeps the token out of debug output
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("token", &"<redacted>")
            .field("organizations", &self.organizations)
            .field("api_url", &self.api_url)
            .field("destination_path", &self.destination_path)
            .field("log_file", &self.log_file)
            .field("jobs", &self.jobs)
            .field("git_timeout", &self.git_timeout)
            .field("retries", &self.retries)
            .field("reclone_invalid", &self.reclone_invalid)
            .finish()
    }
}

impl Settings {
    /// Loads settings from `path`, or from the default locations when None
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path(),
        };

        let content = std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.clone())
            } else {
                ConfigError::Read {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        let env_token = std::env::var(TOKEN_ENV_VAR).ok();
        Self::parse(&content, &path, env_token)
    }

    /// Parses and validates configuration text
    ///
    /// `env_token` is used when the file carries no token.
    pub fn parse(
        content: &str,
        path: &Path,
        env_token: Option<String>,
    ) -> Result<Self, ConfigError> {
        let raw: RawSettings = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let token = raw
            .github
            .token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .or_else(|| {
                env_token
                    .map(|token| token.trim().to_string())
                    .filter(|token| !token.is_empty())
            })
            .ok_or(ConfigError::MissingToken)?;

        let organizations: Vec<String> = raw
            .github
            .organizations
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if organizations.is_empty() {
            return Err(ConfigError::NoOrganizations);
        }

        if raw.backup.destination_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "backup.destination_path is empty".to_string(),
            ));
        }
        if raw.backup.log_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("backup.log_file is empty".to_string()));
        }

        let git_timeout_secs = raw
            .backup
            .git_timeout_secs
            .unwrap_or(DEFAULT_GIT_TIMEOUT_SECS);
        if git_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "backup.git_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            token,
            organizations,
            api_url: raw
                .github
                .api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            destination_path: raw.backup.destination_path,
            log_file: raw.backup.log_file,
            jobs: raw.backup.jobs,
            git_timeout: Duration::from_secs(git_timeout_secs),
            retries: raw.backup.retries.unwrap_or(0),
            reclone_invalid: raw.backup.reclone_invalid,
        })
    }
}

/// `./config.toml` if present, else `<config dir>/org-backup/config.toml`
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .unwrap_or(local)
}
