#![allow(dead_code)]

use edstore_core::{
    ConnectionPool, DatabaseConfig, DeleteRequest, DocumentIdentity, DocumentInfo,
    DocumentLookup, DocumentReference, DocumentRepository, DocumentUuid, GetRequest, GetResult,
    IdentityHasher, MeadowlarkId, ResourceInfo, Security, SqliteDocumentRepository,
    SuperclassInfo, UpsertRequest,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;

pub const CLIENT: &str = "client-a";

/// Hex SHA-256 of `project#resource#<identity json>`.
pub struct Sha256Hasher;

impl IdentityHasher for Sha256Hasher {
    fn meadowlark_id(
        &self,
        project_name: &str,
        resource_name: &str,
        identity: &DocumentIdentity,
    ) -> MeadowlarkId {
        let mut digest = Sha256::new();
        digest.update(project_name.as_bytes());
        digest.update(b"#");
        digest.update(resource_name.as_bytes());
        digest.update(b"#");
        digest.update(Value::Object(identity.clone()).to_string().as_bytes());
        let hex: String = digest
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();
        MeadowlarkId::new(hex)
    }
}

pub fn hasher() -> Arc<dyn IdentityHasher> {
    Arc::new(Sha256Hasher)
}

pub fn memory_repo() -> SqliteDocumentRepository {
    let pool = ConnectionPool::open_in_memory().unwrap();
    pool.bootstrap_schema().unwrap();
    SqliteDocumentRepository::try_new(Arc::new(pool), hasher()).unwrap()
}

pub fn file_repo(dir: &Path, pool_size: usize) -> SqliteDocumentRepository {
    let pool = ConnectionPool::open(&DatabaseConfig {
        path: dir.join("edstore.sqlite3"),
        pool_size,
        ..DatabaseConfig::default()
    })
    .unwrap();
    pool.bootstrap_schema().unwrap();
    SqliteDocumentRepository::try_new(Arc::new(pool), hasher()).unwrap()
}

pub fn identity(value: Value) -> DocumentIdentity {
    match value {
        Value::Object(map) => map,
        other => panic!("identity must be a json object, got {other}"),
    }
}

pub fn resource(resource_name: &str) -> ResourceInfo {
    ResourceInfo {
        project_name: "Ed-Fi".to_string(),
        resource_name: resource_name.to_string(),
        resource_version: "3.3.1-b".to_string(),
        is_descriptor: false,
        allow_identity_updates: false,
    }
}

pub fn descriptor(resource_name: &str) -> ResourceInfo {
    ResourceInfo {
        is_descriptor: true,
        ..resource(resource_name)
    }
}

pub fn reference(resource_name: &str, identity_value: Value) -> DocumentReference {
    DocumentReference {
        project_name: "Ed-Fi".to_string(),
        resource_name: resource_name.to_string(),
        is_descriptor: false,
        document_identity: identity(identity_value),
    }
}

pub fn superclass(resource_name: &str, identity_value: Value) -> SuperclassInfo {
    SuperclassInfo {
        project_name: "Ed-Fi".to_string(),
        resource_name: resource_name.to_string(),
        document_identity: identity(identity_value),
    }
}

pub fn meadowlark_id(resource_info: &ResourceInfo, identity_value: &Value) -> MeadowlarkId {
    Sha256Hasher.meadowlark_id(
        &resource_info.project_name,
        &resource_info.resource_name,
        &identity(identity_value.clone()),
    )
}

/// Upsert of a document without references, stamped at `timestamp`.
pub fn upsert_request(
    resource_info: ResourceInfo,
    identity_value: Value,
    body: Value,
    timestamp: i64,
) -> UpsertRequest {
    UpsertRequest {
        meadowlark_id: meadowlark_id(&resource_info, &identity_value),
        resource_info,
        document_info: DocumentInfo {
            document_identity: identity(identity_value),
            request_timestamp: timestamp,
            ..DocumentInfo::default()
        },
        edfi_doc: body,
        validate_document_references_exist: false,
        security: Security::full_access(CLIENT),
        trace_id: format!("trace-{timestamp}"),
    }
}

pub fn get_by_uuid(repo: &SqliteDocumentRepository, document_uuid: DocumentUuid) -> GetResult {
    repo.get_document_by_id(&GetRequest {
        lookup: DocumentLookup::ByDocumentUuid(document_uuid),
        resource_info: resource("School"),
        security: Security::full_access(CLIENT),
        trace_id: "get".to_string(),
    })
}

pub fn delete_request(document_uuid: DocumentUuid, check_references: bool) -> DeleteRequest {
    DeleteRequest {
        document_uuid,
        resource_info: resource("School"),
        validate_no_references_to_document: check_references,
        security: Security::full_access(CLIENT),
        trace_id: "delete".to_string(),
    }
}

pub fn count_rows(repo: &SqliteDocumentRepository, table: &str) -> i64 {
    repo.pool()
        .with_connection(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
                .map_err(edstore_core::DbError::from)
        })
        .unwrap()
}
