//! Document identity keys and the hashing collaborator that produces them.
//!
//! # Responsibility
//! - Name the two identifiers a stored document carries: the hash-derived
//!   `MeadowlarkId` and the caller-visible `DocumentUuid`.
//! - Define the `IdentityHasher` seam; hashing itself is supplied by callers.
//!
//! # Invariants
//! - A `MeadowlarkId` is an opaque string; this crate never parses it.
//! - Equal `(project, resource, identity)` inputs hash to equal ids.

use super::document::{DocumentReference, SuperclassInfo};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Caller-visible document id, assigned once at insert.
pub type DocumentUuid = uuid::Uuid;

/// Identity fields extracted from a document body, e.g. `{"schoolId": 123}`.
pub type DocumentIdentity = serde_json::Map<String, serde_json::Value>;

/// Deterministic identity key of a document or of a reference target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeadowlarkId(String);

impl MeadowlarkId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MeadowlarkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MeadowlarkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Pure function from a resource and its identity fields to a `MeadowlarkId`.
///
/// Implementations must be deterministic and must not depend on field order
/// in `identity` beyond what the caller guarantees.
pub trait IdentityHasher: Send + Sync {
    fn meadowlark_id(
        &self,
        project_name: &str,
        resource_name: &str,
        identity: &DocumentIdentity,
    ) -> MeadowlarkId;

    /// Id of the document a reference points at.
    fn reference_id(&self, reference: &DocumentReference) -> MeadowlarkId {
        self.meadowlark_id(
            &reference.project_name,
            &reference.resource_name,
            &reference.document_identity,
        )
    }

    /// Id under which a subclass document is also reachable as its superclass.
    fn superclass_id(&self, superclass: &SuperclassInfo) -> MeadowlarkId {
        self.meadowlark_id(
            &superclass.project_name,
            &superclass.resource_name,
            &superclass.document_identity,
        )
    }
}
