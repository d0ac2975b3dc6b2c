use moneronet_apis::{ObjectKey, ValidationError, REASON_FAILED, REASON_PENDING};
use moneronet_tor::CredentialsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ObjectKey),
    #[error("{0} already exists")]
    AlreadyExists(ObjectKey),
    #[error("conflict on {key}: {reason}")]
    Conflict { key: ObjectKey, reason: String },
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error("failed to encode object: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyExists(_))
    }
}

#[derive(Debug, Error)]
pub enum AssembleError {
    /// An anonymized node set has no issued identity yet.
    #[error("hidden-service identity for {0} has not been issued yet")]
    PendingIdentity(ObjectKey),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("failed to encode desired object: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
}

#[derive(Debug, Error)]
pub enum ConvergeError {
    #[error("failed to converge {key}: {source}")]
    Store {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },
}

impl ConvergeError {
    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::Store { source, .. } => source,
        }
    }
}

/// Everything a control loop pass can fail with.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error(transparent)]
    Converge(#[from] ConvergeError),
    #[error("failed to issue credentials for {key}: {source}")]
    Issue {
        key: ObjectKey,
        #[source]
        source: CredentialsError,
    },
    #[error("failed to decode {key}: {source}")]
    Decode {
        key: ObjectKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("pass for {key} timed out after {after_ms}ms")]
    Timeout { key: ObjectKey, after_ms: u64 },
}

impl ReconcileError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Store(err) => err.is_not_found(),
            Self::Converge(err) => err.store_error().is_not_found(),
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Assemble(AssembleError::PendingIdentity(_)))
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Store(err) => err.is_conflict(),
            Self::Converge(err) => err.store_error().is_conflict(),
            _ => false,
        }
    }

    /// Condition reason reported on the parent for this failure.
    pub fn reason(&self) -> &'static str {
        if self.is_pending() {
            REASON_PENDING
        } else {
            REASON_FAILED
        }
    }
}
