//! Document repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Expose the upsert, update, delete, get and ownership operations as
//!   tagged results.
//! - Own the pool, the identity hasher and the existence cache those
//!   operations share.
//!
//! # Invariants
//! - Operations never return `Err`: every failure is folded into the
//!   operation's result enum after its unit of work rolled back.
//! - A repository is only constructed over a fully migrated schema.
//! - The repository never retries; see `DocumentService`.

use super::existence_cache::ExistenceCache;
use super::unit_of_work::ProtocolContext;
use super::{delete, get, ownership, statements, update, upsert};
use crate::db::migrations::{latest_version, REQUIRED_TABLES};
use crate::db::row_locks::LockConflict;
use crate::db::{ConnectionPool, DbError};
use crate::logging::sanitize_message;
use crate::model::alias::AliasRow;
use crate::model::identity::{DocumentUuid, IdentityHasher, MeadowlarkId};
use crate::model::outcome::{
    DeleteResult, GetResult, OwnershipResult, RepositoryOutcome, UpdateResult, UpsertResult,
    WriteConflict,
};
use crate::model::request::{
    DeleteRequest, GetRequest, OwnershipRequest, UpdateRequest, UpsertRequest,
};
use log::{error, info, warn};
use rusqlite::params;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

const MAX_LOGGED_ERROR_CHARS: usize = 240;

pub type RepoResult<T> = Result<T, RepoError>;

/// Failure inside a repository protocol, before it is folded into a result.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// A non-blocking row lock could not be taken.
    RowLocked(LockConflict),
    Json(serde_json::Error),
    InvalidData(String),
    /// The pool's database is not migrated to the version this crate needs.
    UninitializedSchema { found: u32, required: u32 },
    MissingTable(String),
}

impl RepoError {
    /// The retryable conflict this error stands for, if any.
    pub fn write_conflict(&self) -> Option<WriteConflict> {
        match self {
            Self::RowLocked(conflict) => Some(WriteConflict::RowLocked(conflict.clone())),
            Self::Db(err) if err.is_busy() => Some(WriteConflict::StoreBusy {
                message: err.to_string(),
            }),
            Self::Db(err @ DbError::PoolTimeout { .. }) => Some(WriteConflict::StoreBusy {
                message: err.to_string(),
            }),
            _ => None,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::RowLocked(conflict) => write!(f, "{conflict}"),
            Self::Json(err) => write!(f, "json encoding failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted document data: {message}"),
            Self::UninitializedSchema { found, required } => write!(
                f,
                "database schema version {found} does not match required version {required}; run schema bootstrap first"
            ),
            Self::MissingTable(table) => write!(f, "required table `{table}` is missing"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::RowLocked(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::InvalidData(_) => None,
            Self::UninitializedSchema { .. } => None,
            Self::MissingTable(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Repository interface consumed by the handler layer.
pub trait DocumentRepository {
    fn upsert_document(&self, request: &UpsertRequest) -> UpsertResult;
    fn update_document_by_id(&self, request: &UpdateRequest) -> UpdateResult;
    fn delete_document_by_id(&self, request: &DeleteRequest) -> DeleteResult;
    fn get_document_by_id(&self, request: &GetRequest) -> GetResult;
    fn reject_by_ownership_security(&self, request: &OwnershipRequest) -> OwnershipResult;
}

/// SQLite-backed document repository.
///
/// Clones share the pool, the hasher and the existence cache.
#[derive(Clone)]
pub struct SqliteDocumentRepository {
    pool: Arc<ConnectionPool>,
    hasher: Arc<dyn IdentityHasher>,
    cache: Arc<ExistenceCache>,
}

impl SqliteDocumentRepository {
    /// Builds a repository over a migrated pool with a fresh existence cache.
    ///
    /// # Errors
    /// - `UninitializedSchema` when `ConnectionPool::bootstrap_schema` has not
    ///   brought the database to the latest version.
    /// - `MissingTable` when a required table is absent.
    pub fn try_new(pool: Arc<ConnectionPool>, hasher: Arc<dyn IdentityHasher>) -> RepoResult<Self> {
        let found = pool.schema_version()?;
        let required = latest_version();
        if found != required {
            return Err(RepoError::UninitializedSchema { found, required });
        }

        pool.with_connection(|conn| -> RepoResult<()> {
            for table in REQUIRED_TABLES {
                let present: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1;",
                    params![table],
                    |row| row.get(0),
                )?;
                if present == 0 {
                    return Err(RepoError::MissingTable((*table).to_string()));
                }
            }
            Ok(())
        })?;

        Ok(Self {
            pool,
            hasher,
            cache: Arc::new(ExistenceCache::new()),
        })
    }

    /// Replaces the existence cache, e.g. to share one across repositories.
    pub fn with_cache(mut self, cache: Arc<ExistenceCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<ExistenceCache> {
        &self.cache
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Alias rows currently stored for a document.
    pub fn alias_rows(&self, document_uuid: DocumentUuid) -> RepoResult<Vec<AliasRow>> {
        self.pool
            .with_connection(|conn| statements::find_aliases_by_document_uuid(conn, document_uuid))
    }

    /// Outbound reference targets currently stored for a document.
    pub fn outbound_references(&self, parent: &MeadowlarkId) -> RepoResult<Vec<MeadowlarkId>> {
        self.pool
            .with_connection(|conn| statements::find_outbound_references(conn, parent))
    }

    fn context(&self) -> ProtocolContext<'_> {
        ProtocolContext {
            hasher: self.hasher.as_ref(),
            cache: self.cache.as_ref(),
            row_locks: self.pool.row_locks(),
        }
    }
}

impl DocumentRepository for SqliteDocumentRepository {
    fn upsert_document(&self, request: &UpsertRequest) -> UpsertResult {
        let started_at = Instant::now();
        let ctx = self.context();
        let outcome = self
            .pool
            .with_connection(|conn| upsert::upsert_document(conn, &ctx, request));
        settle(
            "document_upsert",
            &request.trace_id,
            started_at,
            outcome,
            UpsertResult::InsertFailureWriteConflict,
            |message| UpsertResult::UnknownFailure { message },
        )
    }

    fn update_document_by_id(&self, request: &UpdateRequest) -> UpdateResult {
        let started_at = Instant::now();
        let ctx = self.context();
        let outcome = self
            .pool
            .with_connection(|conn| update::update_document_by_id(conn, &ctx, request));
        settle(
            "document_update",
            &request.trace_id,
            started_at,
            outcome,
            UpdateResult::UpdateFailureWriteConflict,
            |message| UpdateResult::UnknownFailure { message },
        )
    }

    fn delete_document_by_id(&self, request: &DeleteRequest) -> DeleteResult {
        let started_at = Instant::now();
        let ctx = self.context();
        let outcome = self
            .pool
            .with_connection(|conn| delete::delete_document_by_id(conn, &ctx, request));
        settle(
            "document_delete",
            &request.trace_id,
            started_at,
            outcome,
            DeleteResult::DeleteFailureWriteConflict,
            |message| DeleteResult::UnknownFailure { message },
        )
    }

    fn get_document_by_id(&self, request: &GetRequest) -> GetResult {
        let started_at = Instant::now();
        let outcome = self
            .pool
            .with_connection(|conn| get::get_document(conn, request));
        settle(
            "document_get",
            &request.trace_id,
            started_at,
            outcome,
            |conflict| GetResult::UnknownFailure {
                message: conflict.to_string(),
            },
            |message| GetResult::UnknownFailure { message },
        )
    }

    fn reject_by_ownership_security(&self, request: &OwnershipRequest) -> OwnershipResult {
        if let Some(result) = ownership::exemption(request) {
            return result;
        }
        let started_at = Instant::now();
        let ctx = self.context();
        let outcome = self
            .pool
            .with_connection(|conn| ownership::reject_by_ownership_security(conn, &ctx, request));
        settle(
            "ownership_check",
            &request.trace_id,
            started_at,
            outcome,
            |conflict| OwnershipResult::UnknownFailure {
                message: conflict.to_string(),
            },
            |message| OwnershipResult::UnknownFailure { message },
        )
    }
}

/// Folds a protocol outcome into its tagged result and logs it.
fn settle<R, C, U>(
    event: &str,
    trace_id: &str,
    started_at: Instant,
    outcome: RepoResult<R>,
    on_conflict: C,
    on_unknown: U,
) -> R
where
    R: RepositoryOutcome,
    C: FnOnce(WriteConflict) -> R,
    U: FnOnce(String) -> R,
{
    let result = match outcome {
        Ok(result) => result,
        Err(err) => match err.write_conflict() {
            Some(conflict) => on_conflict(conflict),
            None => {
                error!(
                    "event={} module=repo status=error trace_id={} duration_ms={} error={}",
                    event,
                    trace_id,
                    started_at.elapsed().as_millis(),
                    sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
                );
                return on_unknown(err.to_string());
            }
        },
    };

    let tag = result.response_tag();
    if result.write_conflict().is_some() {
        warn!(
            "event={} module=repo status=rejected trace_id={} response={} retryable={} duration_ms={}",
            event,
            trace_id,
            tag,
            result.is_retryable(),
            started_at.elapsed().as_millis()
        );
    } else {
        info!(
            "event={} module=repo status=ok trace_id={} response={} duration_ms={}",
            event,
            trace_id,
            tag,
            started_at.elapsed().as_millis()
        );
    }
    result
}
