//! Per-repository sync outcome

/// Result of synchronizing one repository
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Repository was absent locally and has been cloned
    Cloned,
    /// Existing clone was fast-forwarded (possibly a no-op)
    Updated,
    /// Clone or update failed; carries the reason
    Failed(String),
}

impl Outcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Outcome::Failed(reason.into())
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Returns the failure reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}
