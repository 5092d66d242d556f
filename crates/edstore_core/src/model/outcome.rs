//! Tagged results returned by the document repository.
//!
//! # Responsibility
//! - Give every repository operation one enum whose variants carry exactly
//!   the payload of that outcome.
//! - Expose the stable wire tag of each outcome (`INSERT_SUCCESS`, ...).
//!
//! # Invariants
//! - Only `WriteConflict::RowLocked` and `WriteConflict::StoreBusy` are
//!   retryable; every other failure is terminal for its request.

use super::document::{BlockingDocument, MissingIdentity};
use super::identity::DocumentUuid;
use crate::db::row_locks::LockConflict;
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Why a mutation lost a race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteConflict {
    /// The stored document is as new as or newer than the request.
    StaleRequest {
        stored_last_modified_at: i64,
        request_timestamp: i64,
    },
    /// Another unit of work holds an incompatible row lock.
    RowLocked(LockConflict),
    /// SQLite could not grant the database write lock within the busy timeout.
    StoreBusy { message: String },
}

impl WriteConflict {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RowLocked(_) | Self::StoreBusy { .. })
    }
}

impl Display for WriteConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleRequest {
                stored_last_modified_at,
                request_timestamp,
            } => write!(
                f,
                "stored document modified at {stored_last_modified_at} is not older than request timestamp {request_timestamp}"
            ),
            Self::RowLocked(conflict) => write!(f, "{conflict}"),
            Self::StoreBusy { message } => write!(f, "store busy: {message}"),
        }
    }
}

/// Common view over every operation result.
pub trait RepositoryOutcome {
    /// Stable upper-snake-case tag of this outcome.
    fn response_tag(&self) -> &'static str;

    /// The write conflict carried by this outcome, if any.
    fn write_conflict(&self) -> Option<&WriteConflict> {
        None
    }

    fn is_retryable(&self) -> bool {
        self.write_conflict()
            .is_some_and(|conflict| conflict.is_retryable())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertResult {
    InsertSuccess {
        document_uuid: DocumentUuid,
    },
    UpdateSuccess {
        document_uuid: DocumentUuid,
    },
    InsertFailureReference {
        failures: Vec<MissingIdentity>,
    },
    UpdateFailureReference {
        failures: Vec<MissingIdentity>,
    },
    /// The declared superclass identity belongs to another document.
    InsertFailureConflict {
        blocking_documents: Vec<BlockingDocument>,
    },
    UpdateFailureConflict {
        blocking_documents: Vec<BlockingDocument>,
    },
    InsertFailureWriteConflict(WriteConflict),
    UpdateFailureWriteConflict(WriteConflict),
    UnknownFailure {
        message: String,
    },
}

impl RepositoryOutcome for UpsertResult {
    fn response_tag(&self) -> &'static str {
        match self {
            Self::InsertSuccess { .. } => "INSERT_SUCCESS",
            Self::UpdateSuccess { .. } => "UPDATE_SUCCESS",
            Self::InsertFailureReference { .. } => "INSERT_FAILURE_REFERENCE",
            Self::UpdateFailureReference { .. } => "UPDATE_FAILURE_REFERENCE",
            Self::InsertFailureConflict { .. } => "INSERT_FAILURE_CONFLICT",
            Self::UpdateFailureConflict { .. } => "UPDATE_FAILURE_CONFLICT",
            Self::InsertFailureWriteConflict(_) => "INSERT_FAILURE_WRITE_CONFLICT",
            Self::UpdateFailureWriteConflict(_) => "UPDATE_FAILURE_WRITE_CONFLICT",
            Self::UnknownFailure { .. } => "UNKNOWN_FAILURE",
        }
    }

    fn write_conflict(&self) -> Option<&WriteConflict> {
        match self {
            Self::InsertFailureWriteConflict(conflict)
            | Self::UpdateFailureWriteConflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

impl UpsertResult {
    /// Public id of the written document on success.
    pub fn document_uuid(&self) -> Option<DocumentUuid> {
        match self {
            Self::InsertSuccess { document_uuid } | Self::UpdateSuccess { document_uuid } => {
                Some(*document_uuid)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateResult {
    UpdateSuccess {
        document_uuid: DocumentUuid,
    },
    UpdateFailureNotExists,
    UpdateFailureImmutableIdentity,
    UpdateFailureReference {
        failures: Vec<MissingIdentity>,
    },
    /// The new identity or its superclass alias belongs to another document.
    UpdateFailureConflict {
        blocking_documents: Vec<BlockingDocument>,
    },
    UpdateFailureWriteConflict(WriteConflict),
    UnknownFailure {
        message: String,
    },
}

impl RepositoryOutcome for UpdateResult {
    fn response_tag(&self) -> &'static str {
        match self {
            Self::UpdateSuccess { .. } => "UPDATE_SUCCESS",
            Self::UpdateFailureNotExists => "UPDATE_FAILURE_NOT_EXISTS",
            Self::UpdateFailureImmutableIdentity => "UPDATE_FAILURE_IMMUTABLE_IDENTITY",
            Self::UpdateFailureReference { .. } => "UPDATE_FAILURE_REFERENCE",
            Self::UpdateFailureConflict { .. } => "UPDATE_FAILURE_CONFLICT",
            Self::UpdateFailureWriteConflict(_) => "UPDATE_FAILURE_WRITE_CONFLICT",
            Self::UnknownFailure { .. } => "UNKNOWN_FAILURE",
        }
    }

    fn write_conflict(&self) -> Option<&WriteConflict> {
        match self {
            Self::UpdateFailureWriteConflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteResult {
    DeleteSuccess,
    DeleteFailureNotExists,
    /// Up to five documents that still reference the target.
    DeleteFailureReference {
        blocking_documents: Vec<BlockingDocument>,
    },
    DeleteFailureWriteConflict(WriteConflict),
    UnknownFailure {
        message: String,
    },
}

impl RepositoryOutcome for DeleteResult {
    fn response_tag(&self) -> &'static str {
        match self {
            Self::DeleteSuccess => "DELETE_SUCCESS",
            Self::DeleteFailureNotExists => "DELETE_FAILURE_NOT_EXISTS",
            Self::DeleteFailureReference { .. } => "DELETE_FAILURE_REFERENCE",
            Self::DeleteFailureWriteConflict(_) => "DELETE_FAILURE_WRITE_CONFLICT",
            Self::UnknownFailure { .. } => "UNKNOWN_FAILURE",
        }
    }

    fn write_conflict(&self) -> Option<&WriteConflict> {
        match self {
            Self::DeleteFailureWriteConflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GetResult {
    /// `edfi_doc` is the stored body with `id` set to `document_uuid`.
    GetSuccess {
        document_uuid: DocumentUuid,
        edfi_doc: Value,
        last_modified_at: i64,
    },
    GetFailureNotExists,
    UnknownFailure {
        message: String,
    },
}

impl RepositoryOutcome for GetResult {
    fn response_tag(&self) -> &'static str {
        match self {
            Self::GetSuccess { .. } => "GET_SUCCESS",
            Self::GetFailureNotExists => "GET_FAILURE_NOT_EXISTS",
            Self::UnknownFailure { .. } => "UNKNOWN_FAILURE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipResult {
    NotApplicable,
    AccessApproved,
    AccessDenied,
    UnknownFailure { message: String },
}

impl RepositoryOutcome for OwnershipResult {
    fn response_tag(&self) -> &'static str {
        match self {
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::AccessApproved => "ACCESS_APPROVED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::UnknownFailure { .. } => "UNKNOWN_FAILURE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeleteResult, RepositoryOutcome, UpsertResult, WriteConflict};
    use crate::db::row_locks::{LockConflict, LockMode, RowKey};
    use crate::model::identity::MeadowlarkId;

    fn row_locked() -> WriteConflict {
        let id = MeadowlarkId::new("school");
        WriteConflict::RowLocked(LockConflict {
            row: RowKey::new(id.clone(), id),
            requested: LockMode::Update,
        })
    }

    #[test]
    fn lock_and_busy_conflicts_are_retryable_but_stale_requests_are_not() {
        assert!(row_locked().is_retryable());
        assert!(WriteConflict::StoreBusy {
            message: "database is locked".to_string()
        }
        .is_retryable());
        assert!(!WriteConflict::StaleRequest {
            stored_last_modified_at: 5,
            request_timestamp: 5,
        }
        .is_retryable());
    }

    #[test]
    fn outcome_retryability_follows_carried_conflict() {
        let locked = DeleteResult::DeleteFailureWriteConflict(row_locked());
        assert_eq!(locked.response_tag(), "DELETE_FAILURE_WRITE_CONFLICT");
        assert!(locked.is_retryable());

        let stale = UpsertResult::UpdateFailureWriteConflict(WriteConflict::StaleRequest {
            stored_last_modified_at: 9,
            request_timestamp: 3,
        });
        assert_eq!(stale.response_tag(), "UPDATE_FAILURE_WRITE_CONFLICT");
        assert!(!stale.is_retryable());

        assert!(!DeleteResult::DeleteFailureNotExists.is_retryable());
    }
}
