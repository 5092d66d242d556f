//! Read of one document by `DocumentUuid` or `MeadowlarkId`.

use super::document_repo::{RepoError, RepoResult};
use super::statements::{find_document_by_document_uuid, find_document_by_meadowlark_id};
use crate::model::outcome::GetResult;
use crate::model::request::{DocumentLookup, GetRequest};
use rusqlite::Connection;
use serde_json::Value;

/// Runs outside any transaction.
pub(crate) fn get_document(conn: &Connection, request: &GetRequest) -> RepoResult<GetResult> {
    let stored = match &request.lookup {
        DocumentLookup::ByDocumentUuid(document_uuid) => {
            find_document_by_document_uuid(conn, *document_uuid)?
        }
        DocumentLookup::ByMeadowlarkId(meadowlark_id) => {
            find_document_by_meadowlark_id(conn, meadowlark_id)?
        }
    };
    let Some(stored) = stored else {
        return Ok(GetResult::GetFailureNotExists);
    };

    let mut edfi_doc = match stored.edfi_doc {
        Value::Object(body) => body,
        other => {
            return Err(RepoError::InvalidData(format!(
                "stored body of `{}` is a json {} instead of an object",
                stored.document_uuid,
                json_kind(&other)
            )))
        }
    };
    edfi_doc.insert(
        "id".to_string(),
        Value::String(stored.document_uuid.to_string()),
    );

    Ok(GetResult::GetSuccess {
        document_uuid: stored.document_uuid,
        edfi_doc: Value::Object(edfi_doc),
        last_modified_at: stored.last_modified_at,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
