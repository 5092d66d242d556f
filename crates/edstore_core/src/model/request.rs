//! Request records accepted by the document repository.

use super::document::{DocumentInfo, ResourceInfo, Security};
use super::identity::{DocumentUuid, MeadowlarkId};
use serde_json::Value;

/// Insert-or-update keyed by the document's identity.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRequest {
    pub meadowlark_id: MeadowlarkId,
    pub resource_info: ResourceInfo,
    pub document_info: DocumentInfo,
    pub edfi_doc: Value,
    pub validate_document_references_exist: bool,
    pub security: Security,
    pub trace_id: String,
}

/// Replace of an existing document addressed by its public id.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Id computed from the identity in the new body; differs from the
    /// stored id when the update changes identity fields.
    pub meadowlark_id: MeadowlarkId,
    pub document_uuid: DocumentUuid,
    pub resource_info: ResourceInfo,
    pub document_info: DocumentInfo,
    pub edfi_doc: Value,
    pub validate_document_references_exist: bool,
    pub security: Security,
    pub trace_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub document_uuid: DocumentUuid,
    pub resource_info: ResourceInfo,
    pub validate_no_references_to_document: bool,
    pub security: Security,
    pub trace_id: String,
}

/// How a read addresses its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLookup {
    ByDocumentUuid(DocumentUuid),
    ByMeadowlarkId(MeadowlarkId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetRequest {
    pub lookup: DocumentLookup,
    pub resource_info: ResourceInfo,
    pub security: Security,
    pub trace_id: String,
}

/// Handler action an ownership check gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Upsert,
    GetById,
    Query,
    UpdateById,
    DeleteById,
}

impl RequestAction {
    pub fn is_read(self) -> bool {
        matches!(self, Self::GetById | Self::Query)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::GetById => "getById",
            Self::Query => "query",
            Self::UpdateById => "updateById",
            Self::DeleteById => "deleteById",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipRequest {
    pub action: RequestAction,
    pub resource_info: ResourceInfo,
    /// Target public id; absent for upserts and queries.
    pub document_uuid: Option<DocumentUuid>,
    /// Identity of the body being upserted, used when no public id is given.
    pub document_info: Option<DocumentInfo>,
    pub security: Security,
    pub trace_id: String,
}
