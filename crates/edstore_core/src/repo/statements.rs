//! Parameterized SQL over the `documents`, `document_references` and
//! `aliases` tables.
//!
//! # Responsibility
//! - Keep every statement the repository protocols run in one place.
//! - Convert rows into model types, rejecting malformed persisted data.
//!
//! # Invariants
//! - Functions take `&Connection` so they run equally inside a transaction
//!   (which derefs to `Connection`) or outside one.
//! - No statement here commits, rolls back, or touches row locks.

use super::document_repo::{RepoError, RepoResult};
use crate::model::alias::{AliasRow, AliasSet};
use crate::model::document::{BlockingDocument, StoredDocument};
use crate::model::identity::{DocumentIdentity, DocumentUuid, MeadowlarkId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

const DOCUMENT_SELECT_SQL: &str = "SELECT
    meadowlark_id,
    document_uuid,
    document_identity,
    project_name,
    resource_name,
    resource_version,
    is_descriptor,
    validated,
    created_by,
    created_at,
    last_modified_at,
    edfi_doc
FROM documents";

/// Upper bound on documents reported as blocking a delete or a superclass claim.
pub const MAX_BLOCKING_DOCUMENTS: usize = 5;

pub fn find_document_by_meadowlark_id(
    conn: &Connection,
    meadowlark_id: &MeadowlarkId,
) -> RepoResult<Option<StoredDocument>> {
    let sql = format!("{DOCUMENT_SELECT_SQL} WHERE meadowlark_id = ?1;");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![meadowlark_id.as_str()])?;
    let document = match rows.next()? {
        Some(row) => Some(parse_document_row(row)?),
        None => None,
    };
    Ok(document)
}

pub fn find_document_by_document_uuid(
    conn: &Connection,
    document_uuid: DocumentUuid,
) -> RepoResult<Option<StoredDocument>> {
    let sql = format!("{DOCUMENT_SELECT_SQL} WHERE document_uuid = ?1;");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![document_uuid.to_string()])?;
    let document = match rows.next()? {
        Some(row) => Some(parse_document_row(row)?),
        None => None,
    };
    Ok(document)
}

/// Returns `None` when no document matches; `Some(None)` when it exists
/// without a recorded creator.
pub fn find_created_by_meadowlark_id(
    conn: &Connection,
    meadowlark_id: &MeadowlarkId,
) -> RepoResult<Option<Option<String>>> {
    let created_by = conn
        .query_row(
            "SELECT created_by FROM documents WHERE meadowlark_id = ?1;",
            params![meadowlark_id.as_str()],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(created_by)
}

pub fn find_created_by_document_uuid(
    conn: &Connection,
    document_uuid: DocumentUuid,
) -> RepoResult<Option<Option<String>>> {
    let created_by = conn
        .query_row(
            "SELECT created_by FROM documents WHERE document_uuid = ?1;",
            params![document_uuid.to_string()],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(created_by)
}

pub fn insert_document(conn: &Connection, document: &StoredDocument) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO documents (
            meadowlark_id,
            document_uuid,
            document_identity,
            project_name,
            resource_name,
            resource_version,
            is_descriptor,
            validated,
            created_by,
            created_at,
            last_modified_at,
            edfi_doc
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
        params![
            document.meadowlark_id.as_str(),
            document.document_uuid.to_string(),
            identity_to_db(&document.document_identity)?,
            document.project_name.as_str(),
            document.resource_name.as_str(),
            document.resource_version.as_str(),
            bool_to_int(document.is_descriptor),
            bool_to_int(document.validated),
            document.created_by.as_deref(),
            document.created_at,
            document.last_modified_at,
            serde_json::to_string(&document.edfi_doc)?,
        ],
    )?;
    Ok(())
}

/// Rewrites every mutable column of the row with `document.document_uuid`.
///
/// `created_by` and `created_at` are never touched.
pub fn update_document(conn: &Connection, document: &StoredDocument) -> RepoResult<usize> {
    let changed = conn.execute(
        "UPDATE documents
        SET
            meadowlark_id = ?2,
            document_identity = ?3,
            project_name = ?4,
            resource_name = ?5,
            resource_version = ?6,
            is_descriptor = ?7,
            validated = ?8,
            last_modified_at = ?9,
            edfi_doc = ?10
        WHERE document_uuid = ?1;",
        params![
            document.document_uuid.to_string(),
            document.meadowlark_id.as_str(),
            identity_to_db(&document.document_identity)?,
            document.project_name.as_str(),
            document.resource_name.as_str(),
            document.resource_version.as_str(),
            bool_to_int(document.is_descriptor),
            bool_to_int(document.validated),
            document.last_modified_at,
            serde_json::to_string(&document.edfi_doc)?,
        ],
    )?;
    Ok(changed)
}

pub fn delete_document_by_document_uuid(
    conn: &Connection,
    document_uuid: DocumentUuid,
) -> RepoResult<usize> {
    let deleted = conn.execute(
        "DELETE FROM documents WHERE document_uuid = ?1;",
        params![document_uuid.to_string()],
    )?;
    Ok(deleted)
}

/// Alias rows whose alias id is one of `alias_ids`.
pub fn find_aliases_by_alias_ids(
    conn: &Connection,
    alias_ids: &[MeadowlarkId],
) -> RepoResult<Vec<AliasRow>> {
    if alias_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT document_uuid, meadowlark_id, alias_meadowlark_id
        FROM aliases
        WHERE alias_meadowlark_id IN ({})
        ORDER BY id ASC;",
        placeholders(1, alias_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(id_values(alias_ids)))?;
    let mut aliases = Vec::new();
    while let Some(row) = rows.next()? {
        aliases.push(parse_alias_row(row)?);
    }
    Ok(aliases)
}

pub fn find_aliases_by_document_uuid(
    conn: &Connection,
    document_uuid: DocumentUuid,
) -> RepoResult<Vec<AliasRow>> {
    let mut stmt = conn.prepare(
        "SELECT document_uuid, meadowlark_id, alias_meadowlark_id
        FROM aliases
        WHERE document_uuid = ?1
        ORDER BY id ASC;",
    )?;
    let mut rows = stmt.query(params![document_uuid.to_string()])?;
    let mut aliases = Vec::new();
    while let Some(row) = rows.next()? {
        aliases.push(parse_alias_row(row)?);
    }
    Ok(aliases)
}

pub fn insert_aliases(conn: &Connection, aliases: &AliasSet) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO aliases (document_uuid, meadowlark_id, alias_meadowlark_id)
        VALUES (?1, ?2, ?3);",
    )?;
    for row in aliases.rows() {
        stmt.execute(params![
            row.document_uuid.to_string(),
            row.meadowlark_id.as_str(),
            row.alias_meadowlark_id.as_str(),
        ])?;
    }
    Ok(())
}

pub fn delete_aliases_by_meadowlark_id(
    conn: &Connection,
    meadowlark_id: &MeadowlarkId,
) -> RepoResult<usize> {
    let deleted = conn.execute(
        "DELETE FROM aliases WHERE meadowlark_id = ?1;",
        params![meadowlark_id.as_str()],
    )?;
    Ok(deleted)
}

/// Inserts one reference row per distinct target in `referenced_ids`.
pub fn insert_outbound_references(
    conn: &Connection,
    parent: &MeadowlarkId,
    referenced_ids: &[MeadowlarkId],
) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO document_references (parent_meadowlark_id, referenced_meadowlark_id)
        VALUES (?1, ?2);",
    )?;
    let mut written: Vec<&MeadowlarkId> = Vec::with_capacity(referenced_ids.len());
    for referenced in referenced_ids {
        if written.contains(&referenced) {
            continue;
        }
        stmt.execute(params![parent.as_str(), referenced.as_str()])?;
        written.push(referenced);
    }
    Ok(())
}

pub fn delete_outbound_references(conn: &Connection, parent: &MeadowlarkId) -> RepoResult<usize> {
    let deleted = conn.execute(
        "DELETE FROM document_references WHERE parent_meadowlark_id = ?1;",
        params![parent.as_str()],
    )?;
    Ok(deleted)
}

/// Removes reference rows of any parent that point at one of `referenced_ids`.
pub fn delete_references_to(conn: &Connection, referenced_ids: &[MeadowlarkId]) -> RepoResult<usize> {
    if referenced_ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM document_references WHERE referenced_meadowlark_id IN ({});",
        placeholders(1, referenced_ids.len())
    );
    let deleted = conn.execute(&sql, params_from_iter(id_values(referenced_ids)))?;
    Ok(deleted)
}

pub fn find_outbound_references(
    conn: &Connection,
    parent: &MeadowlarkId,
) -> RepoResult<Vec<MeadowlarkId>> {
    let mut stmt = conn.prepare(
        "SELECT referenced_meadowlark_id
        FROM document_references
        WHERE parent_meadowlark_id = ?1
        ORDER BY id ASC;",
    )?;
    let ids = stmt
        .query_map(params![parent.as_str()], |row| row.get::<_, String>(0))?
        .map(|id| id.map(MeadowlarkId::from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Distinct parents, other than `excluded_parent`, that reference any of
/// `referenced_ids`.
pub fn find_referring_parents(
    conn: &Connection,
    referenced_ids: &[MeadowlarkId],
    excluded_parent: &MeadowlarkId,
) -> RepoResult<Vec<MeadowlarkId>> {
    if referenced_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT DISTINCT parent_meadowlark_id
        FROM document_references
        WHERE referenced_meadowlark_id IN ({})
            AND parent_meadowlark_id <> ?1
        ORDER BY parent_meadowlark_id ASC;",
        placeholders(2, referenced_ids.len())
    );
    let mut bind_values = vec![Value::Text(excluded_parent.as_str().to_string())];
    bind_values.extend(id_values(referenced_ids));

    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params_from_iter(bind_values), |row| row.get::<_, String>(0))?
        .map(|id| id.map(MeadowlarkId::from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Summaries of at most `MAX_BLOCKING_DOCUMENTS` documents among `meadowlark_ids`.
pub fn find_blocking_documents(
    conn: &Connection,
    meadowlark_ids: &[MeadowlarkId],
) -> RepoResult<Vec<BlockingDocument>> {
    if meadowlark_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT document_uuid, resource_name, project_name, resource_version, document_identity
        FROM documents
        WHERE meadowlark_id IN ({})
        ORDER BY id ASC
        LIMIT {MAX_BLOCKING_DOCUMENTS};",
        placeholders(1, meadowlark_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(id_values(meadowlark_ids)))?;
    let mut documents = Vec::new();
    while let Some(row) = rows.next()? {
        documents.push(BlockingDocument {
            document_uuid: parse_uuid(row.get("document_uuid")?)?,
            resource_name: row.get("resource_name")?,
            project_name: row.get("project_name")?,
            resource_version: row.get("resource_version")?,
            identity: parse_identity(row.get("document_identity")?)?,
        });
    }
    Ok(documents)
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<StoredDocument> {
    let edfi_doc_text: String = row.get("edfi_doc")?;
    let edfi_doc = serde_json::from_str(&edfi_doc_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid json in documents.edfi_doc: {err}"))
    })?;

    Ok(StoredDocument {
        meadowlark_id: MeadowlarkId::from(row.get::<_, String>("meadowlark_id")?),
        document_uuid: parse_uuid(row.get("document_uuid")?)?,
        document_identity: parse_identity(row.get("document_identity")?)?,
        project_name: row.get("project_name")?,
        resource_name: row.get("resource_name")?,
        resource_version: row.get("resource_version")?,
        is_descriptor: int_to_bool(row.get("is_descriptor")?, "is_descriptor")?,
        validated: int_to_bool(row.get("validated")?, "validated")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        last_modified_at: row.get("last_modified_at")?,
        edfi_doc,
    })
}

fn parse_alias_row(row: &Row<'_>) -> RepoResult<AliasRow> {
    Ok(AliasRow {
        document_uuid: parse_uuid(row.get("document_uuid")?)?,
        meadowlark_id: MeadowlarkId::from(row.get::<_, String>("meadowlark_id")?),
        alias_meadowlark_id: MeadowlarkId::from(row.get::<_, String>("alias_meadowlark_id")?),
    })
}

fn parse_uuid(text: String) -> RepoResult<DocumentUuid> {
    Uuid::parse_str(&text)
        .map_err(|_| RepoError::InvalidData(format!("invalid document_uuid value `{text}`")))
}

fn parse_identity(text: String) -> RepoResult<DocumentIdentity> {
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(serde_json::Value::Object(identity)) => Ok(identity),
        Ok(_) => Err(RepoError::InvalidData(
            "document_identity is not a json object".to_string(),
        )),
        Err(err) => Err(RepoError::InvalidData(format!(
            "invalid json in document_identity: {err}"
        ))),
    }
}

fn identity_to_db(identity: &DocumentIdentity) -> RepoResult<String> {
    Ok(serde_json::to_string(identity)?)
}

fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn id_values(ids: &[MeadowlarkId]) -> impl Iterator<Item = Value> + '_ {
    ids.iter().map(|id| Value::Text(id.as_str().to_string()))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid {column} value `{other}` in documents.{column}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        delete_references_to, find_outbound_references, find_referring_parents,
        insert_outbound_references, placeholders,
    };
    use crate::db::{migrations::apply_migrations, open_connection_in_memory};
    use crate::model::identity::MeadowlarkId;

    #[test]
    fn placeholders_are_numbered_from_offset() {
        assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
        assert_eq!(placeholders(2, 1), "?2");
    }

    #[test]
    fn duplicate_targets_are_written_once_and_self_parent_is_excluded() {
        let mut conn = open_connection_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();

        let school = MeadowlarkId::new("school");
        let week = MeadowlarkId::new("week");
        insert_outbound_references(&conn, &week, &[school.clone(), school.clone()]).unwrap();
        insert_outbound_references(&conn, &school, &[school.clone()]).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM document_references WHERE parent_meadowlark_id = 'week';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        let parents = find_referring_parents(&conn, &[school.clone()], &school).unwrap();
        assert_eq!(parents, vec![week]);
    }

    #[test]
    fn inbound_references_are_removed_for_every_parent() {
        let mut conn = open_connection_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();

        let school = MeadowlarkId::new("school");
        let edorg = MeadowlarkId::new("edorg");
        let calendar = MeadowlarkId::new("calendar");
        insert_outbound_references(&conn, &MeadowlarkId::new("week"), &[school.clone()]).unwrap();
        insert_outbound_references(
            &conn,
            &MeadowlarkId::new("staff"),
            &[edorg.clone(), calendar.clone()],
        )
        .unwrap();

        assert_eq!(delete_references_to(&conn, &[school, edorg]).unwrap(), 2);
        assert_eq!(delete_references_to(&conn, &[]).unwrap(), 0);
        assert_eq!(
            find_outbound_references(&conn, &MeadowlarkId::new("staff")).unwrap(),
            vec![calendar]
        );
    }
}
