//! Persistence core of an Ed-Fi document API.
//!
//! Stores JSON documents in SQLite while enforcing cross-document reference
//! integrity, superclass aliasing, per-document ownership and optimistic
//! concurrency under concurrent writers.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, DatabaseConfig, LoggingConfig, RetryConfig, StoreConfig};
pub use db::{ConnectionPool, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::document::{
    AuthorizationStrategy, BlockingDocument, DocumentInfo, DocumentReference, MissingIdentity,
    ResourceInfo, Security, SuperclassInfo,
};
pub use model::identity::{DocumentIdentity, DocumentUuid, IdentityHasher, MeadowlarkId};
pub use model::outcome::{
    DeleteResult, GetResult, OwnershipResult, RepositoryOutcome, UpdateResult, UpsertResult,
    WriteConflict,
};
pub use model::request::{
    DeleteRequest, DocumentLookup, GetRequest, OwnershipRequest, RequestAction, UpdateRequest,
    UpsertRequest,
};
pub use repo::document_repo::{DocumentRepository, RepoError, RepoResult, SqliteDocumentRepository};
pub use repo::existence_cache::ExistenceCache;
pub use service::document_service::DocumentService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
