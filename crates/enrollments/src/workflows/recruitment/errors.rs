use serde::Serialize;

use super::domain::{DomainName, ModelError, Round};
use super::identity::IdentityError;
use crate::store::StoreError;

/// Stable, machine-readable error class. Clients branch on this, never on the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    Store,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Store => "store",
        }
    }

    /// Only storage failures may be retried automatically.
    pub const fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Store)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Unauthorized(#[from] IdentityError),
    #[error("candidate {0} not found")]
    CandidateNotFound(String),
    #[error("domain {0} is not recognized")]
    UnknownDomain(String),
    #[error("deadline over: domain {0} is closed for submissions")]
    DomainClosed(DomainName),
    #[error("round {round} of {domain} is not unlocked yet")]
    RoundNotUnlocked { domain: DomainName, round: Round },
    #[error("round {round} of {domain} has already been submitted")]
    AlreadySubmitted { domain: DomainName, round: Round },
    #[error("{0} is not an admin")]
    NotAnAdmin(String),
    #[error("admin may not act on domain {0}")]
    DomainNotPermitted(DomainName),
    #[error(transparent)]
    InvalidStatusValue(ModelError),
    #[error("round 1 qualification is closed to manual changes")]
    RoundLocked,
    #[error("round {blocking} of {domain} is not qualified")]
    PrecedingRoundNotQualified { domain: DomainName, blocking: Round },
    #[error("no {domain} record for {email}")]
    RecordNotFound { domain: DomainName, email: String },
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Unauthorized(_) => ErrorKind::Unauthorized,
            WorkflowError::NotAnAdmin(_)
            | WorkflowError::DomainNotPermitted(_)
            | WorkflowError::DomainClosed(_) => ErrorKind::Forbidden,
            WorkflowError::CandidateNotFound(_)
            | WorkflowError::UnknownDomain(_)
            | WorkflowError::RecordNotFound { .. } => ErrorKind::NotFound,
            WorkflowError::InvalidStatusValue(_) | WorkflowError::Validation(_) => {
                ErrorKind::Validation
            }
            WorkflowError::RoundNotUnlocked { .. }
            | WorkflowError::AlreadySubmitted { .. }
            | WorkflowError::RoundLocked
            | WorkflowError::PrecedingRoundNotQualified { .. }
            | WorkflowError::Conflict(_) => ErrorKind::Conflict,
            WorkflowError::Store(_) => ErrorKind::Store,
        }
    }

    pub(crate) fn validation(detail: impl Into<String>) -> Self {
        WorkflowError::Validation(detail.into())
    }

    pub(crate) fn conflict(detail: impl Into<String>) -> Self {
        WorkflowError::Conflict(detail.into())
    }
}

impl From<ModelError> for WorkflowError {
    fn from(value: ModelError) -> Self {
        match value {
            ModelError::InvalidStatus(_) => WorkflowError::InvalidStatusValue(value),
            other => WorkflowError::Validation(other.to_string()),
        }
    }
}
