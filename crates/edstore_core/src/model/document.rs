//! Document metadata carried by requests and stored rows.
//!
//! # Responsibility
//! - Describe a resource, its identity, its outbound references and its
//!   optional superclass identity.
//! - Describe the requesting client for ownership decisions.
//! - Hold the persisted document row shape.
//!
//! # Invariants
//! - Bodies (`edfi_doc`) are opaque JSON; only `document_identity` is ever
//!   interpreted, and only by the `IdentityHasher`.
//! - `last_modified_at` is a caller-supplied logical timestamp.

use super::identity::{DocumentIdentity, DocumentUuid, MeadowlarkId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Static facts about the resource type a request targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub project_name: String,
    pub resource_name: String,
    pub resource_version: String,
    pub is_descriptor: bool,
    /// Whether an update may change the identity fields (and so the
    /// `MeadowlarkId`) of an existing document.
    pub allow_identity_updates: bool,
}

/// An outbound reference named by a document body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReference {
    pub project_name: String,
    pub resource_name: String,
    pub is_descriptor: bool,
    pub document_identity: DocumentIdentity,
}

/// Superclass identity declared by a subclass document, e.g. a School
/// reachable as an EducationOrganization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperclassInfo {
    pub project_name: String,
    pub resource_name: String,
    pub document_identity: DocumentIdentity,
}

/// Everything extracted from a validated request body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document_identity: DocumentIdentity,
    pub document_references: Vec<DocumentReference>,
    pub descriptor_references: Vec<DocumentReference>,
    pub superclass_info: Option<SuperclassInfo>,
    /// Logical write timestamp; must be strictly newer than the stored one.
    pub request_timestamp: i64,
}

impl DocumentInfo {
    /// Document references followed by descriptor references.
    pub fn all_references(&self) -> impl Iterator<Item = &DocumentReference> {
        self.document_references
            .iter()
            .chain(self.descriptor_references.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStrategy {
    FullAccess,
    OwnershipBased,
}

/// Requesting client, as established by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    pub client_id: String,
    pub authorization_strategy: AuthorizationStrategy,
}

impl Security {
    pub fn full_access(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authorization_strategy: AuthorizationStrategy::FullAccess,
        }
    }

    pub fn ownership_based(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            authorization_strategy: AuthorizationStrategy::OwnershipBased,
        }
    }
}

/// A reference target that does not exist in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingIdentity {
    pub resource_name: String,
    pub identity: DocumentIdentity,
}

impl Display for MissingIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resource {} is missing identity {}",
            self.resource_name,
            Value::Object(self.identity.clone())
        )
    }
}

/// Summary of a document whose references block a delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingDocument {
    pub document_uuid: DocumentUuid,
    pub resource_name: String,
    pub project_name: String,
    pub resource_version: String,
    pub identity: DocumentIdentity,
}

/// A `documents` row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub meadowlark_id: MeadowlarkId,
    pub document_uuid: DocumentUuid,
    pub document_identity: DocumentIdentity,
    pub project_name: String,
    pub resource_name: String,
    pub resource_version: String,
    pub is_descriptor: bool,
    pub validated: bool,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub last_modified_at: i64,
    pub edfi_doc: Value,
}

#[cfg(test)]
mod tests {
    use super::{DocumentInfo, DocumentReference, MissingIdentity};
    use serde_json::json;

    fn reference(resource_name: &str, is_descriptor: bool) -> DocumentReference {
        DocumentReference {
            project_name: "Ed-Fi".to_string(),
            resource_name: resource_name.to_string(),
            is_descriptor,
            document_identity: json!({ "id": 1 }).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn missing_identity_renders_resource_and_identity_json() {
        let missing = MissingIdentity {
            resource_name: "School".to_string(),
            identity: json!({ "schoolId": 123 }).as_object().cloned().unwrap(),
        };
        assert_eq!(
            missing.to_string(),
            r#"Resource School is missing identity {"schoolId":123}"#
        );
    }

    #[test]
    fn all_references_lists_descriptors_last() {
        let info = DocumentInfo {
            document_references: vec![reference("School", false)],
            descriptor_references: vec![reference("GradeLevelDescriptor", true)],
            ..DocumentInfo::default()
        };
        let names: Vec<_> = info
            .all_references()
            .map(|reference| reference.resource_name.as_str())
            .collect();
        assert_eq!(names, ["School", "GradeLevelDescriptor"]);
    }
}
