use std::fmt;

/// Failure classes of a daily run.
///
/// `Storage` failures are safe to retry by re-running the whole sequence for the same reference
/// date. `InvalidInput` and `Integrity` failures are not: the input or the ledger must be fixed
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Integrity,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Integrity => "integrity",
            Self::Storage => "storage",
        }
    }

    pub fn is_retryable(self) -> bool {
        self == Self::Storage
    }
}

#[derive(Debug, Clone)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl EngineError {
    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            detail: detail.into(),
        }
    }

    pub fn integrity(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Integrity,
            detail: detail.into(),
        }
    }

    pub fn storage(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Storage,
            detail: detail.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind.as_str(), self.detail)
    }
}

impl std::error::Error for EngineError {}

/// Recovers the failure class from an error chain, whether the `EngineError` is the root cause
/// or was attached as context.
pub fn kind_of(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<EngineError>().map(|e| e.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn kind_survives_as_root_cause() {
        let err = anyhow::Error::new(EngineError::integrity("first_seen after last_seen"))
            .context("build snapshot failed");
        assert_eq!(kind_of(&err), Some(ErrorKind::Integrity));
    }

    #[test]
    fn kind_survives_as_context() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Err::<(), _>(io)
            .context(EngineError::storage("write ledger failed"))
            .unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::Storage));
        assert!(err.downcast_ref::<EngineError>().unwrap().is_retryable());
    }

    #[test]
    fn plain_errors_have_no_kind() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(kind_of(&err), None);
    }
}
