//! Mapping of (organization, repository) pairs onto the mirror tree

use std::path::{Path, PathBuf};
use thiserror::Error;

/// A name that cannot be used as a single path segment
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("{kind} name is empty")]
    Empty { kind: &'static str },
    #[error("{kind} name '{name}' is a relative path component")]
    Relative { kind: &'static str, name: String },
    #[error("{kind} name '{name}' contains a path separator or control character")]
    UnsafeCharacter { kind: &'static str, name: String },
}

/// Checks that `name` is usable as one opaque directory name
pub fn validate_segment(kind: &'static str, name: &str) -> Result<(), PathError> {
    if name.is_empty() {
        return Err(PathError::Empty { kind });
    }
    if name == "." || name == ".." {
        return Err(PathError::Relative {
            kind,
            name: name.to_string(),
        });
    }
    if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(PathError::UnsafeCharacter {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Returns `<backup_root>/<organization>`
pub fn organization_dir(backup_root: &Path, organization: &str) -> Result<PathBuf, PathError> {
    validate_segment("organization", organization)?;
    Ok(backup_root.join(organization))
}

/// Returns `<backup_root>/<organization>/<repository>`
pub fn resolve(
    backup_root: &Path,
    organization: &str,
    repository: &str,
) -> Result<PathBuf, PathError> {
    let org_dir = organization_dir(backup_root, organization)?;
    validate_segment("repository", repository)?;
    Ok(org_dir.join(repository))
}
